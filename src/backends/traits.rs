//! 后端调用层 Trait 定义
//!
//! 编排器只通过 `BackendRunner` 调用后端；后端任务通过 `UpdateSink` 把带类型的
//! 进度消息送回编排器，不直接触碰任何共享状态。

use super::error::TranslateError;
use crate::models::{BackendService, TranslationRequest};
use crate::stream::{StreamChange, TextUpdate};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// 后端调用结果
pub type BackendResult<T> = Result<T, TranslateError>;

/// 一次成功调用的输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOutput {
    pub text: String,
    pub thinking: String,
    /// 命中缓存，未发出网络请求
    pub from_cache: bool,
}

impl BackendOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            thinking: String::new(),
            from_cache: false,
        }
    }

    pub fn cached(text: impl Into<String>) -> Self {
        Self {
            from_cache: true,
            ..Self::new(text)
        }
    }
}

/// 后端任务发往编排器的消息内容
#[derive(Debug, Clone, PartialEq)]
pub enum BackendMessageKind {
    /// 任务开始执行
    Started,
    /// 累积文本或 thinking 发生变化
    Progress {
        text: Option<TextUpdate>,
        thinking: Option<TextUpdate>,
    },
    /// 任务结束
    Finished {
        result: BackendResult<BackendOutput>,
        elapsed: Duration,
    },
}

/// 后端任务消息
#[derive(Debug, Clone, PartialEq)]
pub struct BackendMessage {
    pub service_id: String,
    pub kind: BackendMessageKind,
}

/// 进度回传通道
///
/// 同一后端的消息按发送顺序到达。接收端关闭后发送静默失败。
#[derive(Debug, Clone)]
pub struct UpdateSink {
    service_id: String,
    tx: Option<mpsc::UnboundedSender<BackendMessage>>,
}

impl UpdateSink {
    pub fn new(service_id: impl Into<String>, tx: mpsc::UnboundedSender<BackendMessage>) -> Self {
        Self {
            service_id: service_id.into(),
            tx: Some(tx),
        }
    }

    /// 创建一个通道，返回发送端和接收端
    pub fn channel(
        service_id: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<BackendMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(service_id, tx), rx)
    }

    /// 丢弃所有进度的 sink
    pub fn noop(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            tx: None,
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn started(&self) {
        self.send(BackendMessageKind::Started);
    }

    /// 转发解析器产生的变化，没有文本或 thinking 变化时忽略
    pub fn emit(&self, change: &StreamChange) {
        if !change.has_content() {
            return;
        }
        self.send(BackendMessageKind::Progress {
            text: change.text.clone(),
            thinking: change.thinking.clone(),
        });
    }

    pub fn finished(&self, result: BackendResult<BackendOutput>, elapsed: Duration) {
        self.send(BackendMessageKind::Finished { result, elapsed });
    }

    fn send(&self, kind: BackendMessageKind) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(BackendMessage {
                service_id: self.service_id.clone(),
                kind,
            });
        }
    }
}

/// 后端执行 Trait
///
/// 实现者负责一次完整的后端调用（缓存、请求、解析、回退），
/// 进度通过 `sink` 回传，结束时返回最终结果或终止性错误。
#[async_trait]
pub trait BackendRunner: Send + Sync {
    async fn run(
        &self,
        service: &BackendService,
        request: &TranslationRequest,
        sink: &UpdateSink,
        cancel: &CancellationToken,
    ) -> BackendResult<BackendOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_forwards_in_order() {
        let (sink, mut rx) = UpdateSink::channel("s1");
        sink.started();
        sink.emit(&StreamChange {
            text: Some(TextUpdate::Delta("你".to_string())),
            ..Default::default()
        });
        sink.emit(&StreamChange {
            stop_reason: Some("end_turn".to_string()),
            ..Default::default()
        });
        sink.finished(Ok(BackendOutput::new("你")), Duration::from_millis(5));
        drop(sink);

        let mut kinds = Vec::new();
        while let Some(msg) = rx.recv().await {
            assert_eq!(msg.service_id, "s1");
            kinds.push(msg.kind);
        }
        assert_eq!(kinds.len(), 3);
        assert_eq!(kinds[0], BackendMessageKind::Started);
        assert!(matches!(
            &kinds[1],
            BackendMessageKind::Progress { text: Some(TextUpdate::Delta(t)), thinking: None } if t == "你"
        ));
        assert!(matches!(&kinds[2], BackendMessageKind::Finished { result: Ok(_), .. }));
    }

    #[test]
    fn test_noop_sink_and_closed_receiver() {
        let sink = UpdateSink::noop("s1");
        sink.started();
        assert_eq!(sink.service_id(), "s1");

        let (sink, rx) = UpdateSink::channel("s2");
        drop(rx);
        sink.finished(Err(TranslateError::Cancelled), Duration::ZERO);
    }

    #[test]
    fn test_cached_output() {
        let output = BackendOutput::cached("你好");
        assert!(output.from_cache);
        assert!(output.thinking.is_empty());
        assert!(!BackendOutput::new("x").from_cache);
    }
}
