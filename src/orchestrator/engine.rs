//! 翻译编排器
//!
//! 对一次请求：按路由评分排序候选后端，每个后端一个并发任务，汇总各任务的进度消息，
//! 向调用方发送快照或增量事件，全部结束后更新路由统计并发送终止事件。

use super::events::{EmitMode, ServiceDelta, TextPatch, TranslationEvent};
use super::state::{ServiceRunState, ServiceStatus, Summary};
use super::throttle::Throttle;
use crate::backends::{
    BackendMessage, BackendMessageKind, BackendOutput, BackendRunner, TranslateError, UpdateSink,
};
use crate::models::{BackendService, TranslationRequest};
use crate::router::RoutingScorer;
use crate::stream::TextUpdate;
use futures::Stream;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

fn default_throttle_ms() -> u64 {
    80
}

/// 编排器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// 同一后端两次流式事件的最小间隔
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    #[serde(default)]
    pub emit_mode: EmitMode,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
            emit_mode: EmitMode::default(),
        }
    }
}

/// 一次请求的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationOutcome {
    pub states: Vec<ServiceRunState>,
    pub summary: Summary,
    /// 所有后端都失败时的代表性错误
    pub error: Option<String>,
}

impl TranslationOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// 每个后端已发送给调用方的内容
#[derive(Debug, Default)]
struct EmittedView {
    text: String,
    thinking: String,
}

/// 单次请求的运行上下文，只在 `translate` 内存在
struct RunContext {
    request_id: String,
    states: IndexMap<String, ServiceRunState>,
    emitted: IndexMap<String, EmittedView>,
    throttle: Throttle,
    first_error: Option<String>,
    events: mpsc::Sender<TranslationEvent>,
    mode: EmitMode,
}

impl RunContext {
    fn summary(&self) -> Summary {
        Summary::from_states(self.states.values())
    }

    fn snapshot(&self) -> Vec<ServiceRunState> {
        self.states.values().cloned().collect()
    }

    async fn send(&self, event: TranslationEvent) {
        if self.events.send(event).await.is_err() {
            debug!("[ORCHESTRATOR] 事件接收端已关闭");
        }
    }

    /// 发送某个后端的当前状态
    async fn emit(&mut self, service_id: &str) {
        let Some(state) = self.states.get(service_id) else {
            return;
        };
        let view = self.emitted.entry(service_id.to_string()).or_default();
        let translation = TextPatch::between(&view.text, &state.accumulated_text);
        let thinking = TextPatch::between(&view.thinking, &state.accumulated_thinking);
        view.text.clone_from(&state.accumulated_text);
        view.thinking.clone_from(&state.accumulated_thinking);

        let event = match self.mode {
            EmitMode::Snapshot => TranslationEvent::Progress {
                services: self.snapshot(),
                summary: self.summary(),
            },
            EmitMode::Delta => TranslationEvent::ServiceUpdate {
                changed_service_id: service_id.to_string(),
                service_delta: ServiceDelta {
                    status: state.status,
                    error: state.error_message.clone(),
                    error_detail: state.error_detail.clone(),
                    translation,
                    thinking,
                    from_cache: state.from_cache,
                },
            },
        };
        self.throttle.mark_emitted(service_id, Instant::now());
        self.send(event).await;
    }

    /// 流式进度：窗口内推迟，窗口外立即发送
    async fn emit_throttled(&mut self, service_id: &str) {
        if self.throttle.ready(service_id, Instant::now()) {
            self.emit(service_id).await;
        } else {
            self.throttle.defer(service_id);
        }
    }

    async fn flush_due(&mut self) {
        for service_id in self.throttle.take_due(Instant::now()) {
            self.emit(&service_id).await;
        }
    }
}

/// 翻译编排器
///
/// 跨请求只通过 `RoutingScorer` 保留状态；重复触发的去重由调用方负责。
#[derive(Clone)]
pub struct Orchestrator {
    runner: Arc<dyn BackendRunner>,
    scorer: Arc<RoutingScorer>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        runner: Arc<dyn BackendRunner>,
        scorer: Arc<RoutingScorer>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            runner,
            scorer,
            config,
        }
    }

    pub fn scorer(&self) -> &Arc<RoutingScorer> {
        &self.scorer
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// 参与本次请求的后端，按尝试顺序排列
    pub fn candidates(&self, request: &TranslationRequest) -> Vec<BackendService> {
        self.scorer
            .rank(&request.services, request.active_service_id.as_deref())
            .into_iter()
            .filter(|s| s.enabled)
            .cloned()
            .collect()
    }

    /// 执行一次翻译请求
    ///
    /// 事件依次为：初始快照、各后端的进度、终止事件。取消 `cancel` 会让所有
    /// 未结束的后端以 `Cancelled` 结束。
    pub async fn translate(
        &self,
        request: TranslationRequest,
        events: mpsc::Sender<TranslationEvent>,
        cancel: CancellationToken,
    ) -> TranslationOutcome {
        let candidates = if request.source_text.trim().is_empty() {
            warn!("[ORCHESTRATOR] 原文为空，不发起请求");
            Vec::new()
        } else {
            self.candidates(&request)
        };

        let mut ctx = RunContext {
            request_id: Uuid::new_v4().to_string(),
            states: candidates
                .iter()
                .map(|s| (s.id.clone(), ServiceRunState::pending(s)))
                .collect(),
            emitted: IndexMap::new(),
            throttle: Throttle::new(Duration::from_millis(self.config.throttle_ms)),
            first_error: None,
            events,
            mode: self.config.emit_mode,
        };

        info!(
            "[ORCHESTRATOR] 开始翻译: request_id={} chars={} services={:?}",
            ctx.request_id,
            request.source_text.chars().count(),
            ctx.states.keys().collect::<Vec<_>>()
        );
        ctx.send(TranslationEvent::Started {
            services: ctx.snapshot(),
            summary: ctx.summary(),
        })
        .await;

        if candidates.is_empty() {
            let error = if request.source_text.trim().is_empty() {
                "原文为空".to_string()
            } else {
                "没有可用的翻译服务".to_string()
            };
            return self.finish(ctx, Some(error)).await;
        }

        let request = Arc::new(request);
        let (tx, mut rx) = mpsc::unbounded_channel::<BackendMessage>();
        let mut tasks = JoinSet::new();
        for service in candidates {
            let sink = UpdateSink::new(service.id.clone(), tx.clone());
            let runner = self.runner.clone();
            let request = request.clone();
            let token = cancel.child_token();
            tasks.spawn(async move {
                sink.started();
                let start = Instant::now();
                let result = runner.run(&service, &request, &sink, &token).await;
                sink.finished(result, start.elapsed());
            });
        }
        drop(tx);

        let mut cancelled = false;
        loop {
            let due = ctx.throttle.next_due();
            tokio::select! {
                message = rx.recv() => match message {
                    Some(message) => self.handle_message(&mut ctx, message).await,
                    None => break,
                },
                _ = sleep_until_due(due), if due.is_some() => ctx.flush_due().await,
                _ = cancel.cancelled(), if !cancelled => {
                    cancelled = true;
                    info!(
                        "[ORCHESTRATOR] 请求已取消，中止未结束的后端任务: request_id={}",
                        ctx.request_id
                    );
                    // 已发出的结束消息仍留在通道中，随后照常处理
                    tasks.abort_all();
                }
            }
        }

        // 任务在发送结束消息前退出（panic 或被中止）
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Err(e) if e.is_panic() => error!("[ORCHESTRATOR] 后端任务异常退出: {}", e),
                Err(_) => debug!("[ORCHESTRATOR] 后端任务已中止"),
                Ok(()) => {}
            }
        }
        let unfinished: Vec<String> = ctx
            .states
            .values()
            .filter(|s| !s.status.is_terminal())
            .map(|s| s.service_id.clone())
            .collect();
        for service_id in unfinished {
            let error = if cancelled {
                TranslateError::Cancelled
            } else {
                TranslateError::RequestFailed {
                    message: "后端任务异常退出".to_string(),
                }
            };
            self.complete(&mut ctx, &service_id, Err(error), Duration::ZERO)
                .await;
        }

        let summary = ctx.summary();
        let error = if summary.done > 0 {
            None
        } else {
            ctx.first_error
                .clone()
                .or_else(|| Some("所有翻译服务均失败".to_string()))
        };
        self.finish(ctx, error).await
    }

    /// 以拉取方式消费事件
    ///
    /// 丢弃返回的 stream 会取消尚未结束的后端任务。
    pub fn translate_stream(
        &self,
        request: TranslationRequest,
        cancel: CancellationToken,
    ) -> impl Stream<Item = TranslationEvent> + Send + 'static {
        let this = self.clone();
        let token = cancel.child_token();
        async_stream::stream! {
            let _guard = token.clone().drop_guard();
            let (tx, mut rx) = mpsc::channel(64);
            let handle = tokio::spawn(async move { this.translate(request, tx, token).await });
            while let Some(event) = rx.recv().await {
                yield event;
            }
            if let Err(e) = handle.await {
                error!("[ORCHESTRATOR] 编排任务异常退出: {}", e);
            }
        }
    }

    async fn handle_message(&self, ctx: &mut RunContext, message: BackendMessage) {
        let BackendMessage { service_id, kind } = message;
        match kind {
            BackendMessageKind::Started => {
                let Some(state) = ctx.states.get_mut(&service_id) else {
                    return;
                };
                if state.status == ServiceStatus::Pending {
                    state.status = ServiceStatus::Running;
                    ctx.emit(&service_id).await;
                }
            }
            BackendMessageKind::Progress { text, thinking } => {
                let Some(state) = ctx.states.get_mut(&service_id) else {
                    return;
                };
                if state.status.is_terminal() {
                    return;
                }
                let mut changed = false;
                if let Some(update) = text {
                    changed |= apply_update(&mut state.accumulated_text, update);
                }
                if let Some(update) = thinking {
                    changed |= apply_update(&mut state.accumulated_thinking, update);
                }
                if changed {
                    state.status = ServiceStatus::Streaming;
                    ctx.emit_throttled(&service_id).await;
                }
            }
            BackendMessageKind::Finished { result, elapsed } => {
                self.complete(ctx, &service_id, result, elapsed).await;
            }
        }
    }

    /// 记录后端结束：更新状态与路由统计，并立即发送
    async fn complete(
        &self,
        ctx: &mut RunContext,
        service_id: &str,
        result: Result<BackendOutput, TranslateError>,
        elapsed: Duration,
    ) {
        let Some(state) = ctx.states.get_mut(service_id) else {
            return;
        };
        if state.status.is_terminal() {
            return;
        }

        match result {
            Ok(output) => {
                info!(
                    "[ORCHESTRATOR] 后端完成: service={} elapsed={}ms cached={}",
                    service_id,
                    elapsed.as_millis(),
                    output.from_cache
                );
                state.status = ServiceStatus::Done;
                state.accumulated_text = output.text;
                if !output.thinking.is_empty() {
                    state.accumulated_thinking = output.thinking;
                }
                state.from_cache = output.from_cache;
                if !output.from_cache {
                    self.scorer.record_success(service_id, elapsed);
                }
            }
            Err(e) => {
                warn!(
                    "[ORCHESTRATOR] 后端失败: service={} type={} error={}",
                    service_id,
                    e.error_type(),
                    e
                );
                state.status = ServiceStatus::Error;
                state.error_message = Some(e.to_string());
                state.error_detail = e.body_preview().map(str::to_string);
                if e.counts_toward_routing() {
                    self.scorer.record_failure(
                        service_id,
                        &e.summary(),
                        e.status_code(),
                        e.is_timeout_like(),
                    );
                }
                if ctx.first_error.is_none() {
                    ctx.first_error = Some(e.to_string());
                }
            }
        }
        ctx.emit(service_id).await;
    }

    async fn finish(&self, ctx: RunContext, error: Option<String>) -> TranslationOutcome {
        let summary = ctx.summary();
        match &error {
            None => info!(
                "[ORCHESTRATOR] 全部结束: request_id={} done={} error={}",
                ctx.request_id, summary.done, summary.error
            ),
            Some(e) => warn!("[ORCHESTRATOR] 全部失败: request_id={} {}", ctx.request_id, e),
        }
        ctx.send(TranslationEvent::AllDone {
            error: error.clone(),
        })
        .await;

        TranslationOutcome {
            states: ctx.snapshot(),
            summary,
            error,
        }
    }
}

fn apply_update(target: &mut String, update: TextUpdate) -> bool {
    match update {
        TextUpdate::Delta(delta) if !delta.is_empty() => {
            target.push_str(&delta);
            true
        }
        TextUpdate::Full(full) if full != *target => {
            *target = full;
            true
        }
        _ => false,
    }
}

async fn sleep_until_due(due: Option<Instant>) {
    if let Some(at) = due {
        tokio::time::sleep_until(at).await;
    }
}
