//! transcast
//!
//! 把一段原文同时发给多个 LLM 翻译后端，流式汇总各后端的译文。
//!
//! - `cache`: 译文 LRU 缓存
//! - `stream`: SSE 协议解析
//! - `backends`: 单个后端的 HTTP 客户端
//! - `router`: 后端路由评分
//! - `orchestrator`: 并发编排与事件输出

pub mod backends;
pub mod cache;
pub mod config;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod proxy;
pub mod resilience;
pub mod router;
pub mod stream;

#[cfg(test)]
mod testing;

pub use backends::{BackendClient, BackendRunner, TranslateError};
pub use cache::ResponseCache;
pub use config::{ConfigError, TranscastConfig};
pub use models::{BackendService, Glossary, GlossaryEntry, TranslationRequest};
pub use orchestrator::{Orchestrator, TranslationEvent, TranslationOutcome};
pub use router::RoutingScorer;
