//! 容错机制模块
//!
//! 提供单后端截止时间、请求级取消和故障分类

mod failure;
mod timeout;

pub use failure::FailureKind;
pub use timeout::{TimeoutController, TimeoutError};
pub use tokio_util::sync::CancellationToken;
