//! 按后端的发送节流
//!
//! 同一后端两次流式发送之间至少间隔 `interval`；窗口内的变化合并到窗口结束时发送。
//! 终态不经过节流。

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_emit: HashMap<String, Instant>,
    /// 等待发送的后端及其到期时间
    pending: HashMap<String, Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 现在是否可以立即发送
    pub fn ready(&self, service_id: &str, now: Instant) -> bool {
        match self.last_emit.get(service_id) {
            Some(last) => now.saturating_duration_since(*last) >= self.interval,
            None => true,
        }
    }

    /// 记录一次发送，清除该后端的待发送标记
    pub fn mark_emitted(&mut self, service_id: &str, now: Instant) {
        self.last_emit.insert(service_id.to_string(), now);
        self.pending.remove(service_id);
    }

    /// 推迟到窗口结束
    pub fn defer(&mut self, service_id: &str) {
        let due = self
            .last_emit
            .get(service_id)
            .map(|last| *last + self.interval)
            .unwrap_or_else(Instant::now);
        self.pending.entry(service_id.to_string()).or_insert(due);
    }

    /// 最早的到期时间
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// 取出所有已到期的后端
    pub fn take_due(&mut self, now: Instant) -> Vec<String> {
        let mut due: Vec<(Instant, String)> = self
            .pending
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, at)| (*at, id.clone()))
            .collect();
        due.sort();
        for (_, id) in &due {
            self.pending.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_emit_is_ready() {
        let throttle = Throttle::new(Duration::from_millis(80));
        assert!(throttle.ready("a", Instant::now()));
    }

    #[test]
    fn test_window_blocks_then_releases() {
        let mut throttle = Throttle::new(Duration::from_millis(80));
        let start = Instant::now();
        throttle.mark_emitted("a", start);

        assert!(!throttle.ready("a", start + Duration::from_millis(10)));
        assert!(throttle.ready("b", start + Duration::from_millis(10)));
        assert!(throttle.ready("a", start + Duration::from_millis(80)));
    }

    #[test]
    fn test_defer_and_take_due() {
        let mut throttle = Throttle::new(Duration::from_millis(80));
        let start = Instant::now();
        throttle.mark_emitted("a", start);
        throttle.mark_emitted("b", start + Duration::from_millis(20));

        throttle.defer("b");
        throttle.defer("a");
        throttle.defer("a");
        assert_eq!(throttle.next_due(), Some(start + Duration::from_millis(80)));

        assert!(throttle.take_due(start + Duration::from_millis(50)).is_empty());
        assert_eq!(throttle.take_due(start + Duration::from_millis(80)), vec!["a"]);
        assert_eq!(throttle.take_due(start + Duration::from_millis(200)), vec!["b"]);
        assert!(!throttle.has_pending());
    }

    #[test]
    fn test_mark_emitted_clears_pending() {
        let mut throttle = Throttle::new(Duration::from_millis(80));
        let start = Instant::now();
        throttle.mark_emitted("a", start);
        throttle.defer("a");
        assert!(throttle.has_pending());

        throttle.mark_emitted("a", start + Duration::from_millis(5));
        assert!(!throttle.has_pending());
        assert_eq!(throttle.next_due(), None);
    }

    #[test]
    fn test_zero_interval_never_blocks() {
        let mut throttle = Throttle::new(Duration::ZERO);
        let now = Instant::now();
        throttle.mark_emitted("a", now);
        assert!(throttle.ready("a", now));
        assert_eq!(throttle.interval(), Duration::ZERO);
    }
}
