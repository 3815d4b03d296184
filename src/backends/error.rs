//! 后端错误类型
//!
//! 单个后端一次尝试的终止性错误。对该后端是终止的，对整个请求不是。

use crate::resilience::FailureKind;
use thiserror::Error;

/// 翻译后端错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    /// 缺少 base_url / api_key / model，不会发出网络请求
    #[error("配置不完整: 缺少 {}", missing.join(", "))]
    InvalidConfiguration { missing: Vec<String> },

    /// base_url 无法解析
    #[error("无效的 URL: {url}")]
    InvalidUrl { url: String },

    /// 非 2xx 响应
    #[error("HTTP 错误 {status_code}: {body_preview}")]
    HttpError {
        status_code: u16,
        body_preview: String,
    },

    /// 超过配置的超时时间
    #[error("请求超时: {timeout_ms}ms")]
    RequestTimedOut { timeout_ms: u64 },

    /// 输出长度耗尽且没有产生任何译文
    #[error("模型在给出译文前停止: {reason}")]
    StoppedBeforeAnswer { reason: String, body_preview: String },

    /// 流结束但没有文本
    #[error("响应为空{}", stop_reason.as_ref().map(|r| format!(" (stop_reason={r})")).unwrap_or_default())]
    EmptyResponse {
        stop_reason: Option<String>,
        body_preview: String,
    },

    /// 响应格式无法识别
    #[error("响应格式无法识别")]
    InvalidResponseFormat { body_preview: String },

    /// 其他传输层错误
    #[error("请求失败: {message}")]
    RequestFailed { message: String },

    /// 请求被用户取消
    #[error("请求已取消")]
    Cancelled,
}

impl TranslateError {
    /// 获取错误类型字符串
    pub fn error_type(&self) -> &'static str {
        match self {
            TranslateError::InvalidConfiguration { .. } => "invalid_configuration",
            TranslateError::InvalidUrl { .. } => "invalid_url",
            TranslateError::HttpError { .. } => "http_error",
            TranslateError::RequestTimedOut { .. } => "request_timed_out",
            TranslateError::StoppedBeforeAnswer { .. } => "stopped_before_answer",
            TranslateError::EmptyResponse { .. } => "empty_response",
            TranslateError::InvalidResponseFormat { .. } => "invalid_response_format",
            TranslateError::RequestFailed { .. } => "request_failed",
            TranslateError::Cancelled => "cancelled",
        }
    }

    /// HTTP 状态码（如果有）
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TranslateError::HttpError { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// 原始响应预览（如果有）
    pub fn body_preview(&self) -> Option<&str> {
        match self {
            TranslateError::HttpError { body_preview, .. }
            | TranslateError::StoppedBeforeAnswer { body_preview, .. }
            | TranslateError::EmptyResponse { body_preview, .. }
            | TranslateError::InvalidResponseFormat { body_preview } => Some(body_preview),
            _ => None,
        }
    }

    /// 不含响应体的简短描述，用于路由统计
    pub fn summary(&self) -> String {
        match self {
            TranslateError::HttpError { status_code, .. } => format!("HTTP 错误 {}", status_code),
            other => other.to_string(),
        }
    }

    /// 是否为超时类失败；只看状态码和简短描述，不看上游响应体
    pub fn is_timeout_like(&self) -> bool {
        match self {
            TranslateError::RequestTimedOut { .. } => true,
            TranslateError::Cancelled => false,
            other => FailureKind::classify(other.status_code(), &other.summary()).is_timeout(),
        }
    }

    /// 是否应计入路由统计
    pub fn counts_toward_routing(&self) -> bool {
        !matches!(self, TranslateError::Cancelled)
    }
}
