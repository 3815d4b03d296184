//! 翻译后端客户端
//!
//! 对单个后端发起一次 Messages API 调用：校验配置、查缓存、流式请求、逐行解析、
//! 必要时退回非流式请求，成功后写回缓存。

use super::error::TranslateError;
use super::prompt::{build_request_body, messages_url, ANTHROPIC_VERSION};
use super::traits::{BackendOutput, BackendResult, BackendRunner, UpdateSink};
use crate::cache::{CacheKey, ResponseCache};
use crate::logger::body_preview;
use crate::models::{BackendService, TranslationRequest};
use crate::proxy::{ClientBuildError, HttpClientFactory};
use crate::resilience::{TimeoutController, TimeoutError};
use crate::stream::{SseParser, StreamChange, TextUpdate};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

fn default_preview_limit() -> usize {
    8000
}

fn default_fallback() -> bool {
    true
}

/// 客户端行为选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientOptions {
    /// 错误中原始响应预览的最大字符数
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
    /// 流式尝试没有产生任何增量时是否改用非流式请求
    #[serde(default = "default_fallback")]
    pub non_streaming_fallback: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            preview_limit: default_preview_limit(),
            non_streaming_fallback: default_fallback(),
        }
    }
}

/// 尝试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptKind {
    /// `stream: true`
    Streaming,
    /// `stream: false`，只作为流式尝试的后备
    NonStreaming,
}

impl AttemptKind {
    pub fn stream_flag(self) -> bool {
        matches!(self, AttemptKind::Streaming)
    }

    pub fn label(self) -> &'static str {
        match self {
            AttemptKind::Streaming => "streaming",
            AttemptKind::NonStreaming => "non_streaming",
        }
    }

    /// 本次尝试失败后的下一步
    ///
    /// 只有流式尝试在零增量且失败可回退时才会进入非流式尝试。
    pub fn next_after(self, failure: &AttemptFailure, fallback_enabled: bool) -> Option<AttemptKind> {
        match self {
            AttemptKind::Streaming
                if fallback_enabled && failure.deltas == 0 && failure.fallback_eligible =>
            {
                Some(AttemptKind::NonStreaming)
            }
            _ => None,
        }
    }
}

/// 单次尝试的失败
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFailure {
    pub error: TranslateError,
    /// 失败前已观测到的增量数
    pub deltas: usize,
    /// 是否属于可以换成非流式重试的失败
    pub fallback_eligible: bool,
}

impl AttemptFailure {
    fn terminal(error: TranslateError, deltas: usize) -> Self {
        Self {
            error,
            deltas,
            fallback_eligible: false,
        }
    }

    fn recoverable(error: TranslateError, deltas: usize) -> Self {
        Self {
            error,
            deltas,
            fallback_eligible: true,
        }
    }
}

/// 翻译后端客户端
///
/// `reqwest::Client` 与缓存在所有后端、所有请求间共享。
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    cache: Arc<ResponseCache>,
    options: ClientOptions,
}

impl BackendClient {
    pub fn new(http: Client, cache: Arc<ResponseCache>, options: ClientOptions) -> Self {
        Self {
            http,
            cache,
            options,
        }
    }

    /// 使用工厂构建的 HTTP 客户端
    pub fn from_factory(
        factory: &HttpClientFactory,
        cache: Arc<ResponseCache>,
        options: ClientOptions,
    ) -> Result<Self, ClientBuildError> {
        Ok(Self::new(factory.create_client()?, cache, options))
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    async fn run_attempts(
        &self,
        service: &BackendService,
        url: &Url,
        request: &TranslationRequest,
        sink: &UpdateSink,
    ) -> BackendResult<BackendOutput> {
        let mut attempt = AttemptKind::Streaming;
        loop {
            match self.execute_attempt(attempt, service, url, request, sink).await {
                Ok(output) => return Ok(output),
                Err(failure) => {
                    match attempt.next_after(&failure, self.options.non_streaming_fallback) {
                        Some(next) => {
                            warn!(
                                "[BACKEND] {} 尝试失败，改用 {}: service={} error={}",
                                attempt.label(),
                                next.label(),
                                service.id,
                                failure.error
                            );
                            attempt = next;
                        }
                        None => return Err(failure.error),
                    }
                }
            }
        }
    }

    async fn execute_attempt(
        &self,
        kind: AttemptKind,
        service: &BackendService,
        url: &Url,
        request: &TranslationRequest,
        sink: &UpdateSink,
    ) -> Result<BackendOutput, AttemptFailure> {
        let body = build_request_body(
            service,
            &request.glossary,
            &request.source_text,
            kind.stream_flag(),
        );
        let api_key = service.api_key.trim();
        let accept = if kind.stream_flag() {
            "text/event-stream"
        } else {
            "application/json"
        };

        info!(
            "[BACKEND] 发送请求: service={} model={} mode={}",
            service.id,
            service.model,
            kind.label()
        );

        let response = self
            .http
            .post(url.clone())
            .header("Content-Type", "application/json")
            .header("Accept", accept)
            .header("x-api-key", api_key)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AttemptFailure::terminal(transport_error(&e, service), 0))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview = body_preview(&body, self.options.preview_limit);
            error!(
                "[BACKEND] 请求失败: service={} status={} body={}",
                service.id, status, preview
            );
            return Err(AttemptFailure::terminal(
                TranslateError::HttpError {
                    status_code: status.as_u16(),
                    body_preview: preview,
                },
                0,
            ));
        }

        let mut parser = SseParser::new(service.capture_thinking);
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("[BACKEND] 流读取错误: service={} error={}", service.id, e);
                    let error = transport_error(&e, service);
                    let deltas = parser.delta_count();
                    return Err(match error {
                        TranslateError::RequestFailed { .. } => {
                            AttemptFailure::recoverable(error, deltas)
                        }
                        other => AttemptFailure::terminal(other, deltas),
                    });
                }
            };
            buffer.extend_from_slice(&bytes);

            // 按字节切行，跨 chunk 的多字节字符保持完整
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line[..line.len() - 1]);
                if let Some(change) = parser.feed_line(&line) {
                    sink.emit(&change);
                }
            }
        }

        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer).into_owned();
            if let Some(change) = parser.feed_line(&line) {
                sink.emit(&change);
            }
        }
        if let Some(change) = parser.finish() {
            sink.emit(&change);
        }

        self.conclude(kind, service, &parser)
    }

    /// 根据解析器最终状态决定尝试结果
    fn conclude(
        &self,
        kind: AttemptKind,
        service: &BackendService,
        parser: &SseParser,
    ) -> Result<BackendOutput, AttemptFailure> {
        let deltas = parser.delta_count();
        if !parser.text().trim().is_empty() {
            info!(
                "[BACKEND] 完成: service={} mode={} chars={} deltas={} dropped_frames={}",
                service.id,
                kind.label(),
                parser.text().chars().count(),
                deltas,
                parser.dropped_frames()
            );
            return Ok(BackendOutput {
                text: parser.text().to_string(),
                thinking: parser.thinking().to_string(),
                from_cache: false,
            });
        }

        let preview = body_preview(parser.raw_body(), self.options.preview_limit);
        warn!(
            "[BACKEND] 没有得到译文: service={} stop_reason={:?} body={}",
            service.id,
            parser.stop_reason(),
            preview
        );

        if parser.stopped_before_answer() {
            let reason = parser.stop_reason().unwrap_or_default().to_string();
            return Err(AttemptFailure::terminal(
                TranslateError::StoppedBeforeAnswer {
                    reason,
                    body_preview: preview,
                },
                deltas,
            ));
        }

        let error = if parser.saw_data_line()
            || !parser.received_bytes()
            || parser.stop_reason().is_some()
        {
            TranslateError::EmptyResponse {
                stop_reason: parser.stop_reason().map(str::to_string),
                body_preview: preview,
            }
        } else {
            TranslateError::InvalidResponseFormat {
                body_preview: preview,
            }
        };
        Err(AttemptFailure::recoverable(error, deltas))
    }
}

/// 传输层错误分类
fn transport_error(e: &reqwest::Error, service: &BackendService) -> TranslateError {
    if e.is_timeout() {
        TranslateError::RequestTimedOut {
            timeout_ms: service.timeout_ms,
        }
    } else {
        let mut message = e.to_string();
        let mut source = std::error::Error::source(e);
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        TranslateError::RequestFailed { message }
    }
}

#[async_trait]
impl BackendRunner for BackendClient {
    async fn run(
        &self,
        service: &BackendService,
        request: &TranslationRequest,
        sink: &UpdateSink,
        cancel: &CancellationToken,
    ) -> BackendResult<BackendOutput> {
        let missing = service.missing_fields();
        if !missing.is_empty() {
            warn!(
                "[BACKEND] 配置不完整: service={} missing={:?}",
                service.id, missing
            );
            return Err(TranslateError::InvalidConfiguration {
                missing: missing.into_iter().map(str::to_string).collect(),
            });
        }
        let url = messages_url(&service.base_url)?;

        let key = CacheKey::for_service(service, &request.glossary, &request.source_text);
        if let Some(text) = self.cache.get(&key) {
            debug!("[CACHE] 命中: service={}", service.id);
            sink.emit(&StreamChange {
                text: Some(TextUpdate::Full(text.clone())),
                ..Default::default()
            });
            return Ok(BackendOutput::cached(text));
        }

        let controller = TimeoutController::new(service.timeout());
        let output = controller
            .execute(self.run_attempts(service, &url, request, sink), cancel)
            .await
            .map_err(|e| match e {
                TimeoutError::RequestTimeout { elapsed_ms, .. } => {
                    warn!(
                        "[BACKEND] 请求超时: service={} timeout={}ms elapsed={}ms",
                        service.id, service.timeout_ms, elapsed_ms
                    );
                    TranslateError::RequestTimedOut {
                        timeout_ms: service.timeout_ms,
                    }
                }
                TimeoutError::Cancelled => {
                    debug!("[BACKEND] 已取消: service={}", service.id);
                    TranslateError::Cancelled
                }
            })??;

        self.cache.put(key, &output.text);
        Ok(output)
    }
}
