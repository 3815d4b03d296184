//! HTTP 客户端工厂
//!
//! 所有后端共用一个 `reqwest::Client`（连接池），可选配置出站代理。
//! 不设置整体请求超时：流式响应的时长由每个后端自己的超时控制。

use reqwest::{Client, Proxy};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// 构建共享客户端失败
#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("无效的代理地址 {url}: {reason}")]
    InvalidProxy { url: String, reason: String },

    #[error("不支持的代理协议: {0}（仅支持 http/https）")]
    UnsupportedProxyScheme(String),

    #[error("HTTP 客户端构建失败: {0}")]
    Build(String),
}

/// 共享 HTTP 客户端的构建参数
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    proxy: Option<String>,
    connect_timeout: Duration,
    pool_idle_timeout: Duration,
    tcp_keepalive: Duration,
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self {
            proxy: None,
            connect_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Duration::from_secs(60),
        }
    }
}

impl HttpClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 空白字符串视为未设置
    pub fn with_proxy(mut self, proxy_url: Option<String>) -> Self {
        self.proxy = proxy_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// 代理地址必须是带主机名的 http/https URL
    pub fn validate_proxy(url: &str) -> Result<Url, ClientBuildError> {
        let parsed = Url::parse(url).map_err(|e| ClientBuildError::InvalidProxy {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(ClientBuildError::UnsupportedProxyScheme(other.to_string())),
        }
        if parsed.host_str().is_none() {
            return Err(ClientBuildError::InvalidProxy {
                url: url.to_string(),
                reason: "缺少主机名".to_string(),
            });
        }
        Ok(parsed)
    }

    pub fn create_client(&self) -> Result<Client, ClientBuildError> {
        let mut builder = Client::builder()
            .connect_timeout(self.connect_timeout)
            .pool_idle_timeout(self.pool_idle_timeout)
            .tcp_keepalive(self.tcp_keepalive);

        if let Some(url) = self.proxy.as_deref() {
            let parsed = Self::validate_proxy(url)?;
            debug!(
                "[BACKEND] 使用出站代理: {}://{}",
                parsed.scheme(),
                parsed.host_str().unwrap_or_default()
            );
            let proxy = Proxy::all(parsed.as_str()).map_err(|e| ClientBuildError::InvalidProxy {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| ClientBuildError::Build(e.to_string()))
    }
}
