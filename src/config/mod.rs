//! 配置
//!
//! 从 YAML 文件加载 `TranscastConfig`。所有字段都有默认值，文件不存在时使用默认配置。

mod error;

pub use error::ConfigError;

use crate::backends::ClientOptions;
use crate::logger::LoggingConfig;
use crate::models::{BackendService, Glossary, GlossaryEntry, TranslationRequest};
use crate::orchestrator::OrchestratorConfig;
use crate::proxy::HttpClientFactory;
use crate::router::ScoreWeights;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// 配置目录名（位于用户主目录下）
pub const CONFIG_DIR: &str = ".transcast";
/// 配置文件名
pub const CONFIG_FILE: &str = "config.yaml";

fn default_true() -> bool {
    true
}

fn default_capacity() -> usize {
    crate::cache::DEFAULT_CACHE_CAPACITY
}

fn default_connect_timeout_secs() -> u64 {
    30
}

/// 路由配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// 关闭时除激活后端外保持配置顺序
    #[serde(default = "default_true")]
    pub adaptive: bool,
    #[serde(default)]
    pub weights: ScoreWeights,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            adaptive: true,
            weights: ScoreWeights::default(),
        }
    }
}

/// 缓存配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

/// HTTP 客户端配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// 出站代理（http/https）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(flatten)]
    pub options: ClientOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            proxy: None,
            options: ClientOptions::default(),
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn client_factory(&self) -> HttpClientFactory {
        HttpClientFactory::new()
            .with_proxy(self.proxy.clone())
            .with_connect_timeout(self.connect_timeout())
    }
}

/// 完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscastConfig {
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub services: Vec<BackendService>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_service_id: Option<String>,
    /// 服务未单独配置时使用的目标语言
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
    #[serde(default)]
    pub glossary: Vec<GlossaryEntry>,
}

/// 默认配置文件路径 `~/.transcast/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
}

impl TranscastConfig {
    /// 加载配置；`path` 为空时使用默认路径，文件不存在时返回默认配置
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => {
                    warn!("无法获取主目录，使用默认配置");
                    return Ok(Self::default());
                }
            },
        };

        debug!("读取配置文件: {}", path.display());
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("配置文件不存在，使用默认配置: {}", path.display());
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse { path, source },
            other => other,
        })
    }

    /// 从 YAML 文本解析并规范化
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: PathBuf::new(),
                source,
            })?
        };
        config.normalized()
    }

    /// 服务 id 去重（保留首次出现）、补全目标语言、术语表去重
    fn normalized(mut self) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut services = Vec::with_capacity(self.services.len());
        for (index, mut service) in std::mem::take(&mut self.services).into_iter().enumerate() {
            service.id = service.id.trim().to_string();
            if service.id.is_empty() {
                return Err(ConfigError::MissingServiceId { index });
            }
            if !seen.insert(service.id.clone()) {
                warn!("忽略重复的服务 id: {}", service.id);
                continue;
            }
            if service.target_language.trim().is_empty() {
                if let Some(language) = &self.target_language {
                    service.target_language = language.clone();
                }
            }
            services.push(service);
        }
        self.services = services;

        if let Some(active) = &self.active_service_id {
            if !seen.contains(active) {
                warn!("激活服务不存在，忽略: {}", active);
                self.active_service_id = None;
            }
        }

        self.glossary = Glossary::from_entries(std::mem::take(&mut self.glossary))
            .entries()
            .to_vec();
        Ok(self)
    }

    pub fn glossary(&self) -> Glossary {
        Glossary::from_entries(self.glossary.iter().cloned())
    }

    /// 用当前配置构建一次翻译请求
    pub fn request(&self, source_text: impl Into<String>) -> TranslationRequest {
        let mut request = TranslationRequest::new(source_text, self.services.clone())
            .with_glossary(self.glossary());
        request.active_service_id = self.active_service_id.clone();
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::EmitMode;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = TranscastConfig::parse("").unwrap();
        assert_eq!(config, TranscastConfig::default());
        assert!(config.routing.adaptive);
        assert_eq!(config.cache.capacity, 200);
        assert_eq!(config.orchestrator.throttle_ms, 80);
        assert_eq!(config.orchestrator.emit_mode, EmitMode::Delta);
        assert_eq!(config.client.connect_timeout_secs, 30);
        assert_eq!(config.client.options.preview_limit, 8000);
        assert!(config.client.options.non_streaming_fallback);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
routing:
  adaptive: false
  weights:
    failure_penalty_ms: 100
cache:
  capacity: 10
orchestrator:
  throttle_ms: 60
  emit_mode: snapshot
client:
  proxy: http://127.0.0.1:7890
  preview_limit: 500
  non_streaming_fallback: false
logging:
  level: debug
target_language: 日本語
active_service_id: claude
services:
  - id: claude
    name: Claude
    base_url: https://api.anthropic.com
    api_key: sk-ant-xxx
    model: claude-3-5-haiku-latest
    timeout_ms: 15000
    max_tokens: 2048
    extra_params:
      top_k: 5
  - id: local
    base_url: http://127.0.0.1:8080
    api_key: local
    model: qwen
    target_language: English
    enabled: false
glossary:
  - { source: cache, target: キャッシュ }
  - { source: cache, target: キャッシュ }
"#;
        let config = TranscastConfig::parse(yaml).unwrap();

        assert!(!config.routing.adaptive);
        assert_eq!(config.routing.weights.failure_penalty_ms, 100.0);
        assert_eq!(config.routing.weights.timeout_penalty_ms, 560.0);
        assert_eq!(config.cache.capacity, 10);
        assert_eq!(config.orchestrator.emit_mode, EmitMode::Snapshot);
        assert_eq!(config.client.proxy.as_deref(), Some("http://127.0.0.1:7890"));
        assert_eq!(config.client.options.preview_limit, 500);
        assert!(!config.client.options.non_streaming_fallback);
        assert_eq!(config.logging.level, "debug");

        let claude = &config.services[0];
        assert_eq!(claude.timeout_ms, 15_000);
        assert_eq!(claude.max_tokens, Some(2048));
        assert_eq!(claude.target_language, "日本語");
        assert_eq!(claude.extra_params["top_k"], 5);
        assert!(claude.enabled);
        assert_eq!(config.services[1].target_language, "English");
        assert!(!config.services[1].enabled);

        assert_eq!(config.glossary.len(), 1);
        let request = config.request("Hello");
        assert_eq!(request.active_service_id.as_deref(), Some("claude"));
        assert_eq!(request.glossary.signature(), "cache=>キャッシュ");
        assert_eq!(request.services.len(), 2);
    }

    #[test]
    fn test_duplicate_service_ids_first_wins() {
        let yaml = r#"
services:
  - { id: a, model: first }
  - { id: " a ", model: second }
  - { id: b, model: third }
active_service_id: missing
"#;
        let config = TranscastConfig::parse(yaml).unwrap();
        let models: Vec<&str> = config.services.iter().map(|s| s.model.as_str()).collect();
        assert_eq!(models, vec!["first", "third"]);
        assert_eq!(config.active_service_id, None);
    }

    #[test]
    fn test_missing_service_id_is_rejected() {
        let err = TranscastConfig::parse("services:\n  - { id: '  ', model: m }\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingServiceId { index: 0 }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cache:\n  capacity: 42").unwrap();

        let config = TranscastConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.cache.capacity, 42);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = TranscastConfig::load(Some(&dir.path().join("absent.yaml"))).unwrap();
        assert_eq!(config, TranscastConfig::default());
    }

    #[test]
    fn test_malformed_yaml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "services: [unclosed").unwrap();

        match TranscastConfig::load(Some(&path)) {
            Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_client_factory_from_config() {
        let config = TranscastConfig::parse(
            "client:\n  connect_timeout_secs: 5\n  proxy: '  '\n",
        )
        .unwrap();
        let factory = config.client.client_factory();
        assert_eq!(factory.connect_timeout(), Duration::from_secs(5));
        assert_eq!(factory.proxy(), None);
    }

    #[test]
    fn test_default_path_layout() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with(".transcast/config.yaml"));
        }
    }
}
