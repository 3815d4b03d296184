//! 流式处理层
//!
//! 把后端的增量响应转换为统一的文本变化：
//!
//! ```text
//! 后端字节流 ──> [行切分] ──> [SseParser] ──> [extract 策略] ──> StreamChange
//! ```
//!
//! 同时支持 Anthropic `content_block_delta` 和 OpenAI `choices[].delta` 两族 schema，
//! 以及每次重发完整文本的后端。

pub mod events;
pub mod parsers;

pub use events::{is_length_stop, Extracted, StreamChange, TextUpdate};
pub use parsers::{extract, ParserState, SseParser};
