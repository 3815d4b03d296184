//! 日志模块
//!
//! 初始化 `tracing` 订阅器，并对写入日志或错误预览的原始响应体做脱敏。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

fn default_level() -> String {
    "info".to_string()
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 默认日志级别，可被 `RUST_LOG` 覆盖
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

static INIT: Once = Once::new();

/// 安装全局 `tracing` 订阅器，重复调用无副作用
pub fn init_tracing(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("transcast={}", config.level)));
        // 宿主程序可能已经安装了订阅器
        let _ = fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

static SECRET_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        // Bearer token
        (r"Bearer\s+[A-Za-z0-9._-]+", "Bearer ***"),
        // API key 各种格式
        (
            r#"(?i)(x-)?api[_-]?key["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "api_key: ***",
        ),
        // Anthropic / OpenAI 风格密钥
        (r"sk-[A-Za-z0-9._-]{8,}", "sk-***"),
        // 通用 token
        (
            r#"(access[_-]?|refresh[_-]?)?token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "token: ***",
        ),
        // secret
        (
            r#"secret["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "secret: ***",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
    .collect()
});

/// 脱敏日志消息
pub fn sanitize_log_message(message: &str) -> String {
    let mut sanitized = message.to_string();
    for (re, replacement) in SECRET_PATTERNS.iter() {
        sanitized = re.replace_all(&sanitized, *replacement).into_owned();
    }
    sanitized
}

/// 截取响应体预览（按字符截断），并做脱敏
pub fn body_preview(body: &str, limit: usize) -> String {
    let sanitized = sanitize_log_message(body.trim());
    match sanitized.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}…", &sanitized[..idx]),
        None => sanitized,
    }
}
