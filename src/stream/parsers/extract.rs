//! JSON 负载提取策略
//!
//! 不同后端的流式 schema 不一致（Anthropic `content_block_delta`、OpenAI `choices[].delta`，
//! 以及重发完整文本的非增量格式）。这里把每种形状写成一个具名策略，按固定优先级依次
//! 尝试，返回第一个非空结果。

use crate::stream::events::{Extracted, TextUpdate};
use serde_json::Value;
use tracing::trace;

type Strategy = fn(&Value) -> Option<TextUpdate>;

/// 文本提取策略，按优先级排列
const TEXT_STRATEGIES: &[(&str, Strategy)] = &[
    ("anthropic_delta", anthropic_delta_text),
    ("anthropic_block_start", anthropic_block_start_text),
    ("openai_delta", openai_delta_content),
    ("openai_completion_text", openai_completion_text),
    ("content_blocks", full_content_text),
    ("message_content", full_message_text),
    ("openai_message", openai_message_content),
];

/// thinking 提取策略，按优先级排列
const THINKING_STRATEGIES: &[(&str, Strategy)] = &[
    ("anthropic_delta", anthropic_delta_thinking),
    ("anthropic_block_start", anthropic_block_start_thinking),
    ("openai_delta", openai_delta_reasoning),
    ("content_blocks", full_content_thinking),
    ("message_content", full_message_thinking),
    ("openai_message", openai_message_reasoning),
];

/// 从 JSON 负载中提取文本、thinking 和停止原因
pub fn extract(value: &Value, capture_thinking: bool) -> Extracted {
    let text = run_strategies(TEXT_STRATEGIES, value, "text");
    let thinking = if capture_thinking {
        run_strategies(THINKING_STRATEGIES, value, "thinking")
    } else {
        None
    };

    Extracted {
        text,
        thinking,
        stop_reason: stop_reason(value),
    }
}

fn run_strategies(
    strategies: &[(&str, Strategy)],
    value: &Value,
    field: &str,
) -> Option<TextUpdate> {
    strategies.iter().find_map(|(name, strategy)| {
        let update = strategy(value).filter(|u| !u.is_empty())?;
        trace!("[SSE] {} 命中策略 {}", field, name);
        Some(update)
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn first_choice(value: &Value) -> Option<&Value> {
    value.get("choices")?.as_array()?.first()
}

/// 拼接 content block 数组中指定类型的字段
fn join_blocks(content: &Value, block_type: &str, field: &str) -> Option<String> {
    let blocks = content.as_array()?;
    let joined: String = blocks
        .iter()
        .filter(|block| {
            let ty = block.get("type").and_then(Value::as_str);
            ty == Some(block_type) || (ty.is_none() && block.get(field).is_some())
        })
        .filter_map(|block| block.get(field).and_then(Value::as_str))
        .collect();
    (!joined.is_empty()).then_some(joined)
}

// ========== 文本策略 ==========

fn anthropic_delta_text(value: &Value) -> Option<TextUpdate> {
    non_empty_str(value.get("delta")?.get("text")).map(|s| TextUpdate::Delta(s.to_string()))
}

fn anthropic_block_start_text(value: &Value) -> Option<TextUpdate> {
    non_empty_str(value.get("content_block")?.get("text"))
        .map(|s| TextUpdate::Delta(s.to_string()))
}

fn openai_delta_content(value: &Value) -> Option<TextUpdate> {
    let delta = first_choice(value)?.get("delta")?;
    non_empty_str(delta.get("content")).map(|s| TextUpdate::Delta(s.to_string()))
}

fn openai_completion_text(value: &Value) -> Option<TextUpdate> {
    non_empty_str(first_choice(value)?.get("text")).map(|s| TextUpdate::Delta(s.to_string()))
}

fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(_) => join_blocks(content, "text", "text"),
        _ => None,
    }
}

fn full_content_text(value: &Value) -> Option<TextUpdate> {
    content_text(value.get("content")?).map(TextUpdate::Full)
}

fn full_message_text(value: &Value) -> Option<TextUpdate> {
    content_text(value.get("message")?.get("content")?).map(TextUpdate::Full)
}

fn openai_message_content(value: &Value) -> Option<TextUpdate> {
    let message = first_choice(value)?.get("message")?;
    content_text(message.get("content")?).map(TextUpdate::Full)
}

// ========== thinking 策略 ==========

fn anthropic_delta_thinking(value: &Value) -> Option<TextUpdate> {
    non_empty_str(value.get("delta")?.get("thinking")).map(|s| TextUpdate::Delta(s.to_string()))
}

fn anthropic_block_start_thinking(value: &Value) -> Option<TextUpdate> {
    non_empty_str(value.get("content_block")?.get("thinking"))
        .map(|s| TextUpdate::Delta(s.to_string()))
}

fn openai_delta_reasoning(value: &Value) -> Option<TextUpdate> {
    let delta = first_choice(value)?.get("delta")?;
    non_empty_str(delta.get("reasoning_content"))
        .or_else(|| non_empty_str(delta.get("reasoning")))
        .map(|s| TextUpdate::Delta(s.to_string()))
}

fn full_content_thinking(value: &Value) -> Option<TextUpdate> {
    join_blocks(value.get("content")?, "thinking", "thinking").map(TextUpdate::Full)
}

fn full_message_thinking(value: &Value) -> Option<TextUpdate> {
    join_blocks(value.get("message")?.get("content")?, "thinking", "thinking")
        .map(TextUpdate::Full)
}

fn openai_message_reasoning(value: &Value) -> Option<TextUpdate> {
    let message = first_choice(value)?.get("message")?;
    non_empty_str(message.get("reasoning_content"))
        .map(|s| TextUpdate::Full(s.to_string()))
}

// ========== 停止原因 ==========

fn stop_reason(value: &Value) -> Option<String> {
    let candidates = [
        value.get("delta").and_then(|d| d.get("stop_reason")),
        value.get("stop_reason"),
        value.get("message").and_then(|m| m.get("stop_reason")),
        first_choice(value).and_then(|c| c.get("finish_reason")),
    ];
    candidates
        .into_iter()
        .find_map(non_empty_str)
        .map(str::to_string)
}
