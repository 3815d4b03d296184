//! 流解析事件类型
//!
//! 解析器从 SSE 帧中得到的结构化结果，与具体后端 schema 解耦。

use serde::{Deserialize, Serialize};

/// 文本变更
///
/// 有的后端发送增量，有的每次重发完整文本。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum TextUpdate {
    /// 追加到已累积文本之后
    Delta(String),
    /// 整体替换已累积文本
    Full(String),
}

impl TextUpdate {
    pub fn as_str(&self) -> &str {
        match self {
            TextUpdate::Delta(s) | TextUpdate::Full(s) => s,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

/// 单个 JSON 负载的提取结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub text: Option<TextUpdate>,
    pub thinking: Option<TextUpdate>,
    pub stop_reason: Option<String>,
}

impl Extracted {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.thinking.is_none() && self.stop_reason.is_none()
    }
}

/// 解析器实际应用到累积状态上的变化
///
/// 只有当累积文本或 thinking 真正改变时对应字段才为 `Some`。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChange {
    pub text: Option<TextUpdate>,
    pub thinking: Option<TextUpdate>,
    pub stop_reason: Option<String>,
}

impl StreamChange {
    /// 文本或 thinking 是否变化
    pub fn has_content(&self) -> bool {
        self.text.is_some() || self.thinking.is_some()
    }
}

/// 表示"输出长度耗尽"的停止原因
pub const LENGTH_STOP_REASONS: &[&str] = &["max_tokens", "length"];

/// 停止原因是否为长度耗尽
pub fn is_length_stop(reason: &str) -> bool {
    LENGTH_STOP_REASONS.contains(&reason)
}
