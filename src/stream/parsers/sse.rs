//! SSE 流解析器
//!
//! 逐行接收 `text/event-stream` 响应，把 `data:` 负载交给提取策略，维护累积文本、
//! thinking 和停止原因。格式错误的帧会被丢弃，不影响后续行。

use super::extract::extract;
use crate::stream::events::{is_length_stop, Extracted, StreamChange, TextUpdate};
use serde_json::Value;
use tracing::debug;

const DONE_MARKER: &str = "[DONE]";

/// 解析器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// 尚未收到任何字节
    Idle,
    /// 正在接收
    Receiving,
    /// 已收到 `[DONE]` 或已调用 `finish`
    Finished,
}

/// SSE 流解析器
#[derive(Debug)]
pub struct SseParser {
    capture_thinking: bool,
    state: ParserState,
    /// 当前事件类型（`event:` 行）
    event_type: Option<String>,
    /// 当前事件缓冲的 `data:` 行
    data_lines: Vec<String>,
    text: String,
    thinking: String,
    stop_reason: Option<String>,
    /// 原始响应体（按行重组）
    raw: String,
    saw_data_line: bool,
    delta_count: usize,
    dropped_frames: usize,
}

impl SseParser {
    pub fn new(capture_thinking: bool) -> Self {
        Self {
            capture_thinking,
            state: ParserState::Idle,
            event_type: None,
            data_lines: Vec::new(),
            text: String::new(),
            thinking: String::new(),
            stop_reason: None,
            raw: String::new(),
            saw_data_line: false,
            delta_count: 0,
            dropped_frames: 0,
        }
    }

    /// 处理一行（不含换行符，允许末尾 `\r`）
    pub fn feed_line(&mut self, line: &str) -> Option<StreamChange> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        self.raw.push_str(line);
        self.raw.push('\n');
        if self.state == ParserState::Idle {
            self.state = ParserState::Receiving;
        }

        if line.trim().is_empty() {
            return self.flush();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(event) = line.strip_prefix("event:") {
            let change = self.flush();
            self.event_type = Some(event.trim().to_string());
            return change;
        }
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.strip_prefix(' ').unwrap_or(data);
            self.saw_data_line = true;
            self.data_lines.push(data.to_string());
        }
        // id:/retry: 以及非 SSE 行只保留在原始响应体中
        None
    }

    /// 流结束：冲刷缓冲区，必要时对原始响应体做一次整体提取
    pub fn finish(&mut self) -> Option<StreamChange> {
        let mut change = self.flush();

        if !self.saw_data_line && !self.raw.trim().is_empty() {
            debug!("[SSE] 未收到 data 行，尝试按完整 JSON 解析响应体");
            let fallback = match serde_json::from_str::<Value>(self.raw.trim()) {
                Ok(value) => self.apply(extract(&value, self.capture_thinking)),
                Err(e) => {
                    debug!("[SSE] 响应体不是 JSON: {}", e);
                    None
                }
            };
            change = merge_changes(change, fallback);
        }

        self.state = ParserState::Finished;
        change
    }

    fn flush(&mut self) -> Option<StreamChange> {
        let event_type = self.event_type.take();
        if self.data_lines.is_empty() {
            return None;
        }
        let payload = std::mem::take(&mut self.data_lines).join("\n");
        let payload = payload.trim();

        if payload.is_empty() {
            return None;
        }
        if payload == DONE_MARKER {
            self.state = ParserState::Finished;
            return None;
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(value) => self.apply(extract(&value, self.capture_thinking)),
            Err(e) => {
                self.dropped_frames += 1;
                debug!(
                    "[SSE] 丢弃无法解析的帧: event={:?} error={} payload_len={}",
                    event_type,
                    e,
                    payload.len()
                );
                None
            }
        }
    }

    fn apply(&mut self, extracted: Extracted) -> Option<StreamChange> {
        let mut change = StreamChange::default();

        if let Some(update) = extracted.text {
            change.text = apply_update(&mut self.text, update);
        }
        if let Some(update) = extracted.thinking {
            change.thinking = apply_update(&mut self.thinking, update);
        }
        if change.has_content() {
            self.delta_count += 1;
        }
        if let Some(reason) = extracted.stop_reason {
            self.stop_reason = Some(reason.clone());
            change.stop_reason = Some(reason);
        }

        (change.has_content() || change.stop_reason.is_some()).then_some(change)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn thinking(&self) -> &str {
        &self.thinking
    }

    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// 是否收到过任意字节
    pub fn received_bytes(&self) -> bool {
        !self.raw.is_empty()
    }

    pub fn saw_data_line(&self) -> bool {
        self.saw_data_line
    }

    /// 改变过累积文本或 thinking 的事件数
    pub fn delta_count(&self) -> usize {
        self.delta_count
    }

    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }

    /// 没有文本且停止原因为长度耗尽
    pub fn stopped_before_answer(&self) -> bool {
        self.text.is_empty() && self.stop_reason.as_deref().is_some_and(is_length_stop)
    }

    pub fn raw_body(&self) -> &str {
        &self.raw
    }
}

/// 应用一次更新，返回实际生效的变化
fn apply_update(current: &mut String, update: TextUpdate) -> Option<TextUpdate> {
    match update {
        TextUpdate::Delta(delta) if !delta.is_empty() => {
            current.push_str(&delta);
            Some(TextUpdate::Delta(delta))
        }
        TextUpdate::Full(full) if !full.is_empty() && full != *current => {
            *current = full.clone();
            Some(TextUpdate::Full(full))
        }
        _ => None,
    }
}

fn merge_changes(a: Option<StreamChange>, b: Option<StreamChange>) -> Option<StreamChange> {
    match (a, b) {
        (None, b) => b,
        (a, None) => a,
        (Some(a), Some(b)) => Some(StreamChange {
            text: b.text.or(a.text),
            thinking: b.thinking.or(a.thinking),
            stop_reason: b.stop_reason.or(a.stop_reason),
        }),
    }
}
