//! 后端调用层
//!
//! 负责对单个翻译后端的一次完整调用。
//!
//! # 架构设计
//!
//! ```text
//! backends/
//! ├── traits.rs          # BackendRunner trait、UpdateSink 进度通道
//! ├── error.rs           # TranslateError 错误分类
//! ├── prompt.rs          # URL、系统提示词、请求体
//! └── client.rs          # BackendClient：缓存、流式请求、非流式后备
//! ```
//!
//! # 职责说明
//!
//! - **配置校验**: base_url / api_key / model 缺失时不发请求
//! - **缓存**: 命中时直接返回，成功后写回
//! - **超时与取消**: 每个后端独立的硬截止时间，不影响其他后端
//! - **后备**: 流式尝试零增量失败时改用一次非流式请求

mod client;
mod error;
mod prompt;
mod traits;


pub use client::{AttemptFailure, AttemptKind, BackendClient, ClientOptions};
pub use error::TranslateError;
pub use prompt::{
    build_request_body, messages_url, system_prompt, ANTHROPIC_VERSION, DEFAULT_TARGET_LANGUAGE,
    DEFAULT_TEMPERATURE,
};
pub use traits::{
    BackendMessage, BackendMessageKind, BackendOutput, BackendResult, BackendRunner, UpdateSink,
};
