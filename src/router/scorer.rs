//! 路由评分器
//!
//! 按观测到的可靠性和延迟对后端排序。指标表由同一请求内的并发任务和先后请求共享，
//! 用互斥锁保护。

use super::metric::{RoutingMetric, ScoreWeights};
use crate::models::BackendService;
use crate::resilience::FailureKind;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// 单个后端的评分
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceScore {
    pub service_id: String,
    pub score: f64,
    pub enabled: bool,
    pub is_active: bool,
}

/// 路由评分器
#[derive(Debug)]
pub struct RoutingScorer {
    metrics: Mutex<HashMap<String, RoutingMetric>>,
    weights: ScoreWeights,
    adaptive: bool,
}

impl RoutingScorer {
    pub fn new(weights: ScoreWeights, adaptive: bool) -> Self {
        Self {
            metrics: Mutex::new(HashMap::new()),
            weights,
            adaptive,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ScoreWeights::default(), true)
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    /// 计算单个后端的评分
    pub fn score(&self, service: &BackendService, is_active: bool) -> f64 {
        let metrics = self.metrics.lock();
        self.score_locked(&metrics, service, is_active)
    }

    fn score_locked(
        &self,
        metrics: &HashMap<String, RoutingMetric>,
        service: &BackendService,
        is_active: bool,
    ) -> f64 {
        match metrics.get(&service.id) {
            Some(metric) => metric.score(&self.weights, service.enabled, is_active),
            None => RoutingMetric::new(self.weights.seed_latency_ms).score(
                &self.weights,
                service.enabled,
                is_active,
            ),
        }
    }

    /// 生成尝试顺序
    ///
    /// 激活后端总是排第一；其余后端在自适应模式下按评分升序（稳定排序），
    /// 否则保持配置顺序。
    pub fn rank<'a>(
        &self,
        services: &'a [BackendService],
        active_id: Option<&str>,
    ) -> Vec<&'a BackendService> {
        let active = active_id.and_then(|id| services.iter().find(|s| s.id == id));
        let mut rest: Vec<&BackendService> = services
            .iter()
            .filter(|s| Some(s.id.as_str()) != active.map(|a| a.id.as_str()))
            .collect();

        if self.adaptive {
            let metrics = self.metrics.lock();
            let mut scored: Vec<(f64, &BackendService)> = rest
                .into_iter()
                .map(|s| (self.score_locked(&metrics, s, false), s))
                .collect();
            scored.sort_by(|a, b| a.0.total_cmp(&b.0));
            rest = scored.into_iter().map(|(_, s)| s).collect();
        }

        let ranked: Vec<&BackendService> = active.into_iter().chain(rest).collect();
        debug!(
            "[ROUTER] 排序结果: {:?}",
            ranked.iter().map(|s| s.id.as_str()).collect::<Vec<_>>()
        );
        ranked
    }

    /// 所有后端的当前评分（按输入顺序）
    pub fn scores(&self, services: &[BackendService], active_id: Option<&str>) -> Vec<ServiceScore> {
        let metrics = self.metrics.lock();
        services
            .iter()
            .map(|s| {
                let is_active = Some(s.id.as_str()) == active_id;
                ServiceScore {
                    service_id: s.id.clone(),
                    score: self.score_locked(&metrics, s, is_active),
                    enabled: s.enabled,
                    is_active,
                }
            })
            .collect()
    }

    /// 记录一次成功
    pub fn record_success(&self, service_id: &str, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;
        let mut metrics = self.metrics.lock();
        let metric = metrics
            .entry(service_id.to_string())
            .or_insert_with(|| RoutingMetric::new(self.weights.seed_latency_ms));
        metric.record_success(latency_ms, self.weights.ewma_alpha);
        debug!(
            "[ROUTER] 记录成功: service={} latency={:.0}ms ewma={:.0}ms",
            service_id, latency_ms, metric.ewma_latency_ms
        );
    }

    /// 记录一次失败
    ///
    /// `timed_out` 为显式超时标志；否则根据状态码和错误文本判断是否为超时类失败。
    pub fn record_failure(
        &self,
        service_id: &str,
        error: &str,
        status_code: Option<u16>,
        timed_out: bool,
    ) {
        let kind = FailureKind::classify(status_code, error);
        let timeout_like = timed_out || kind.is_timeout();
        let mut metrics = self.metrics.lock();
        let metric = metrics
            .entry(service_id.to_string())
            .or_insert_with(|| RoutingMetric::new(self.weights.seed_latency_ms));
        metric.record_failure(error, timeout_like);
        debug!(
            "[ROUTER] 记录失败: service={} kind={} timeout_like={} consecutive={}",
            service_id,
            kind.as_str(),
            timeout_like,
            metric.consecutive_failures
        );
    }

    pub fn metric(&self, service_id: &str) -> Option<RoutingMetric> {
        self.metrics.lock().get(service_id).cloned()
    }

    /// 所有指标快照，按 id 排序
    pub fn snapshot(&self) -> Vec<(String, RoutingMetric)> {
        let mut all: Vec<(String, RoutingMetric)> = self
            .metrics
            .lock()
            .iter()
            .map(|(id, m)| (id.clone(), m.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn reset(&self, service_id: &str) -> bool {
        self.metrics.lock().remove(service_id).is_some()
    }
}

impl Default for RoutingScorer {
    fn default() -> Self {
        Self::with_defaults()
    }
}
