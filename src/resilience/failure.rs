//! 故障分类
//!
//! 根据状态码和错误消息粗分失败原因，路由评分据此单独惩罚超时类失败。

/// 失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// 超时、网关超时或传输被中止
    Timeout,
    /// 429 或限流提示
    RateLimited,
    /// 401 / 403
    Unauthorized,
    /// 502 / 503
    Unavailable,
    Other,
}

impl FailureKind {
    pub fn classify(status_code: Option<u16>, message: &str) -> Self {
        match status_code {
            Some(408) | Some(504) => return FailureKind::Timeout,
            Some(429) => return FailureKind::RateLimited,
            _ => {}
        }

        let lower = message.to_lowercase();
        if mentions(&lower, &["timeout", "timed out", "deadline", "abort", "超时"]) {
            return FailureKind::Timeout;
        }
        if mentions(
            &lower,
            &["rate limit", "rate_limit", "too many requests", "quota", "限流"],
        ) {
            return FailureKind::RateLimited;
        }

        match status_code {
            Some(401) | Some(403) => FailureKind::Unauthorized,
            Some(502) | Some(503) => FailureKind::Unavailable,
            _ => FailureKind::Other,
        }
    }

    pub fn is_timeout(self) -> bool {
        self == FailureKind::Timeout
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Other => "other",
        }
    }
}

fn mentions(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}
