//! 出站 HTTP
//!
//! 构建所有后端共享的 `reqwest::Client`。

mod client_factory;

pub use client_factory::{ClientBuildError, HttpClientFactory};
