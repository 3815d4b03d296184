//! 路由评分模块
//!
//! 维护每个后端的可靠性/延迟指标，并据此生成后端尝试顺序：
//! - 激活后端始终排在第一位
//! - 其余后端按评分升序排列（自适应路由），或保持配置顺序
//!
//! 评分公式：
//!
//! ```text
//! score = ewma_latency
//!       + consecutive_failures * FAILURE_PENALTY
//!       + timeout_streak * TIMEOUT_PENALTY
//!       + failure_rate * RATE_PENALTY
//!       + (disabled ? DISABLED_PENALTY : 0)
//!       - (active ? ACTIVE_BONUS : 0)
//! ```

mod metric;
mod scorer;

pub use metric::{RoutingMetric, ScoreWeights};
pub use scorer::{RoutingScorer, ServiceScore};
