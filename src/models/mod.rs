//! 数据模型
//!
//! - `service_model`: 翻译后端配置
//! - `request_model`: 术语表与翻译请求

mod request_model;
mod service_model;

pub use request_model::{Glossary, GlossaryEntry, TranslationRequest};
pub use service_model::BackendService;
