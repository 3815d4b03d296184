//! 流式数据解析器
//!
//! - `sse`: `text/event-stream` 行解析与累积状态
//! - `extract`: 针对不同后端 JSON schema 的提取策略

mod extract;
mod sse;

pub use extract::extract;
pub use sse::{ParserState, SseParser};
