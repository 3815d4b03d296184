//! 翻译服务模型
//!
//! 描述单个翻译后端（供应商 + 模型 + 凭证）的配置。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

fn default_enabled() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// 翻译后端配置
///
/// 由配置层创建，请求期间对核心只读。`id` 在已配置服务中唯一。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendService {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub target_language: String,
    /// 单次请求的硬超时（毫秒）
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// 额外的请求体参数，最后合并进请求体
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra_params: Map<String, Value>,
    /// 是否采集 thinking / reasoning 增量
    #[serde(default)]
    pub capture_thinking: bool,
}

impl BackendService {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            base_url: String::new(),
            api_key: String::new(),
            model: String::new(),
            target_language: String::new(),
            timeout_ms: default_timeout_ms(),
            temperature: None,
            max_tokens: None,
            extra_params: Map::new(),
            capture_thinking: false,
        }
    }

    pub fn with_endpoint(
        mut self,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        self.base_url = base_url.into();
        self.api_key = api_key.into();
        self.model = model.into();
        self
    }

    pub fn with_target_language(mut self, language: impl Into<String>) -> Self {
        self.target_language = language.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = (timeout.as_millis() as u64).max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }

    /// 显示名称，未配置时回退为 id
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// 返回缺失的必填字段
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.base_url.trim().is_empty() {
            missing.push("base_url");
        }
        if self.api_key.trim().is_empty() {
            missing.push("api_key");
        }
        if self.model.trim().is_empty() {
            missing.push("model");
        }
        missing
    }
}
