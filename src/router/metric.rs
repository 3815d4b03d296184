//! 路由指标
//!
//! 每个后端一份，进程生命周期内持续累积，从不回滚。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_failure_penalty() -> f64 {
    320.0
}
fn default_timeout_penalty() -> f64 {
    560.0
}
fn default_rate_penalty() -> f64 {
    540.0
}
fn default_disabled_penalty() -> f64 {
    2200.0
}
fn default_active_bonus() -> f64 {
    36.0
}
fn default_seed_latency() -> f64 {
    760.0
}
fn default_ewma_alpha() -> f64 {
    0.35
}

/// 评分权重（单位：毫秒）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// 每次连续失败的惩罚
    #[serde(default = "default_failure_penalty")]
    pub failure_penalty_ms: f64,
    /// 每次连续超时的惩罚
    #[serde(default = "default_timeout_penalty")]
    pub timeout_penalty_ms: f64,
    /// 失败率惩罚（乘以 [0, 1] 的失败率）
    #[serde(default = "default_rate_penalty")]
    pub rate_penalty_ms: f64,
    /// 禁用后端的惩罚
    #[serde(default = "default_disabled_penalty")]
    pub disabled_penalty_ms: f64,
    /// 当前激活后端的奖励
    #[serde(default = "default_active_bonus")]
    pub active_bonus_ms: f64,
    /// 未观测过的后端的初始延迟
    #[serde(default = "default_seed_latency")]
    pub seed_latency_ms: f64,
    /// EWMA 平滑系数
    #[serde(default = "default_ewma_alpha")]
    pub ewma_alpha: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            failure_penalty_ms: default_failure_penalty(),
            timeout_penalty_ms: default_timeout_penalty(),
            rate_penalty_ms: default_rate_penalty(),
            disabled_penalty_ms: default_disabled_penalty(),
            active_bonus_ms: default_active_bonus(),
            seed_latency_ms: default_seed_latency(),
            ewma_alpha: default_ewma_alpha(),
        }
    }
}

/// 单个后端的可靠性与延迟统计
///
/// 不变量：`ewma_latency_ms >= 0`，`attempts == successes + failures`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingMetric {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub consecutive_failures: u32,
    pub timeout_streak: u32,
    pub ewma_latency_ms: f64,
    pub last_error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RoutingMetric {
    pub fn new(seed_latency_ms: f64) -> Self {
        Self {
            attempts: 0,
            successes: 0,
            failures: 0,
            timeouts: 0,
            consecutive_failures: 0,
            timeout_streak: 0,
            ewma_latency_ms: seed_latency_ms.max(0.0),
            last_error: None,
            updated_at: None,
        }
    }

    /// 记录一次成功
    pub fn record_success(&mut self, latency_ms: f64, alpha: f64) {
        let alpha = alpha.clamp(0.0, 1.0);
        let observed = if latency_ms.is_finite() {
            latency_ms.max(0.0)
        } else {
            self.ewma_latency_ms
        };
        self.attempts += 1;
        self.successes += 1;
        self.ewma_latency_ms = (self.ewma_latency_ms * (1.0 - alpha) + observed * alpha).max(0.0);
        self.consecutive_failures = 0;
        self.timeout_streak = 0;
        self.last_error = None;
        self.updated_at = Some(Utc::now());
    }

    /// 记录一次失败
    pub fn record_failure(&mut self, error: &str, timeout_like: bool) {
        self.attempts += 1;
        self.failures += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if timeout_like {
            self.timeouts += 1;
            self.timeout_streak = self.timeout_streak.saturating_add(1);
        } else {
            self.timeout_streak = 0;
        }
        self.last_error = Some(error.to_string());
        self.updated_at = Some(Utc::now());
    }

    /// 失败率，范围 [0, 1]
    pub fn failure_rate(&self) -> f64 {
        self.failures as f64 / self.attempts.max(1) as f64
    }

    /// 计算评分，越低越优先
    pub fn score(&self, weights: &ScoreWeights, enabled: bool, is_active: bool) -> f64 {
        let mut score = self.ewma_latency_ms
            + self.consecutive_failures as f64 * weights.failure_penalty_ms
            + self.timeout_streak as f64 * weights.timeout_penalty_ms
            + self.failure_rate() * weights.rate_penalty_ms;
        if !enabled {
            score += weights.disabled_penalty_ms;
        }
        if is_active {
            score -= weights.active_bonus_ms;
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metric_uses_seed() {
        let metric = RoutingMetric::new(760.0);
        assert_eq!(metric.ewma_latency_ms, 760.0);
        assert_eq!(metric.failure_rate(), 0.0);
        assert_eq!(metric.score(&ScoreWeights::default(), true, false), 760.0);
    }

    #[test]
    fn test_success_updates_ewma_and_resets_streaks() {
        let mut metric = RoutingMetric::new(760.0);
        metric.record_failure("请求超时", true);
        metric.record_success(100.0, 0.35);

        let expected = 760.0 * 0.65 + 100.0 * 0.35;
        assert!((metric.ewma_latency_ms - expected).abs() < 1e-9);
        assert_eq!(metric.consecutive_failures, 0);
        assert_eq!(metric.timeout_streak, 0);
        assert_eq!(metric.last_error, None);
        assert_eq!(metric.attempts, 2);
        assert_eq!(metric.attempts, metric.successes + metric.failures);
    }

    #[test]
    fn test_failure_tracks_timeout_streak() {
        let mut metric = RoutingMetric::new(760.0);
        metric.record_failure("timeout", true);
        metric.record_failure("timeout", true);
        assert_eq!(metric.timeout_streak, 2);
        assert_eq!(metric.timeouts, 2);

        metric.record_failure("HTTP 500", false);
        assert_eq!(metric.timeout_streak, 0);
        assert_eq!(metric.timeouts, 2);
        assert_eq!(metric.consecutive_failures, 3);
        assert_eq!(metric.last_error.as_deref(), Some("HTTP 500"));
        assert_eq!(metric.failure_rate(), 1.0);
    }

    #[test]
    fn test_score_components() {
        let weights = ScoreWeights::default();
        let mut metric = RoutingMetric::new(0.0);
        metric.record_failure("timeout", true);

        // 0 + 1*320 + 1*560 + 1.0*540
        assert!((metric.score(&weights, true, false) - 1420.0).abs() < 1e-9);
        assert!((metric.score(&weights, false, false) - 3620.0).abs() < 1e-9);
        assert!((metric.score(&weights, true, true) - 1384.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_latency_is_ignored() {
        let mut metric = RoutingMetric::new(500.0);
        metric.record_success(f64::NAN, 0.35);
        assert_eq!(metric.ewma_latency_ms, 500.0);
        metric.record_success(-20.0, 1.0);
        assert_eq!(metric.ewma_latency_ms, 0.0);
    }
}
