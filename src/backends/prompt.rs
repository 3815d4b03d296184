//! 请求构建
//!
//! 生成 `/v1/messages` 地址、系统提示词和 JSON 请求体。

use super::error::TranslateError;
use crate::models::{BackendService, Glossary};
use serde_json::{json, Map, Value};
use url::Url;

/// 未配置目标语言时使用
pub const DEFAULT_TARGET_LANGUAGE: &str = "Simplified Chinese";

/// 默认采样温度
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Messages API 版本头
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// 请求体中不允许被 `extra_params` 覆盖的字段
const RESERVED_FIELDS: &[&str] = &["model", "stream", "messages"];

/// 构建 `{base_url}/v1/messages`，去掉 base_url 末尾的 `/`
pub fn messages_url(base_url: &str) -> Result<Url, TranslateError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    let url = format!("{}/v1/messages", trimmed);
    match Url::parse(&url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => {
            Ok(parsed)
        }
        _ => Err(TranslateError::InvalidUrl {
            url: base_url.to_string(),
        }),
    }
}

fn target_language(service: &BackendService) -> &str {
    let language = service.target_language.trim();
    if language.is_empty() {
        DEFAULT_TARGET_LANGUAGE
    } else {
        language
    }
}

/// 系统提示词：目标语言 + 术语表
pub fn system_prompt(service: &BackendService, glossary: &Glossary) -> String {
    let mut prompt = format!(
        "You are a professional translator. Translate the user's text into {}. \
         Preserve the original formatting, line breaks and inline code. \
         Output only the translation without explanations, notes or quotes.",
        target_language(service)
    );

    if !glossary.is_empty() {
        prompt.push_str("\n\nUse the following glossary strictly (source => target):");
        for entry in glossary.entries() {
            prompt.push_str(&format!("\n- {} => {}", entry.source, entry.target));
        }
    }
    prompt
}

/// 构建请求体
pub fn build_request_body(
    service: &BackendService,
    glossary: &Glossary,
    source_text: &str,
    stream: bool,
) -> Value {
    let mut body = Map::new();
    body.insert("model".to_string(), json!(service.model.trim()));
    body.insert("stream".to_string(), json!(stream));
    body.insert(
        "temperature".to_string(),
        json!(service.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
    );
    body.insert(
        "system".to_string(),
        json!(system_prompt(service, glossary)),
    );
    body.insert(
        "messages".to_string(),
        json!([{ "role": "user", "content": source_text }]),
    );
    if let Some(max_tokens) = service.max_tokens {
        body.insert("max_tokens".to_string(), json!(max_tokens));
    }

    for (key, value) in &service.extra_params {
        if RESERVED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        body.insert(key.clone(), value.clone());
    }

    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GlossaryEntry;

    fn service() -> BackendService {
        BackendService::new("s1", "Claude").with_endpoint(
            "https://api.example.com/",
            "sk-test",
            "claude-test",
        )
    }

    #[test]
    fn test_messages_url_strips_trailing_slashes() {
        assert_eq!(
            messages_url("https://api.example.com///").unwrap().as_str(),
            "https://api.example.com/v1/messages"
        );
        assert_eq!(
            messages_url("http://127.0.0.1:8080/proxy").unwrap().as_str(),
            "http://127.0.0.1:8080/proxy/v1/messages"
        );
    }

    #[test]
    fn test_messages_url_rejects_invalid() {
        assert!(matches!(
            messages_url("not a url"),
            Err(TranslateError::InvalidUrl { .. })
        ));
        assert!(matches!(
            messages_url("ftp://example.com"),
            Err(TranslateError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_system_prompt_embeds_language_and_glossary() {
        let glossary = Glossary::from_entries(vec![
            GlossaryEntry::new("cache", "缓存"),
            GlossaryEntry::new("router", "路由器"),
        ]);
        let prompt = system_prompt(&service().with_target_language("日本語"), &glossary);
        assert!(prompt.contains("into 日本語"));
        assert!(prompt.contains("- cache => 缓存\n- router => 路由器"));

        let prompt = system_prompt(&service(), &Glossary::new());
        assert!(prompt.contains(DEFAULT_TARGET_LANGUAGE));
        assert!(!prompt.contains("glossary"));
    }

    #[test]
    fn test_request_body_shape() {
        let mut svc = service();
        svc.max_tokens = Some(1024);
        svc.temperature = Some(0.7);
        let body = build_request_body(&svc, &Glossary::new(), "Hello", true);

        assert_eq!(body["model"], "claude-test");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 1024);
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Hello");
        assert!(body["system"].as_str().unwrap().contains("translator"));
    }

    #[test]
    fn test_request_body_without_max_tokens() {
        let body = build_request_body(&service(), &Glossary::new(), "Hello", false);
        assert_eq!(body["stream"], false);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_extra_params_cannot_override_reserved_fields() {
        let mut svc = service();
        svc.extra_params.insert("stream".to_string(), json!(false));
        svc.extra_params.insert("model".to_string(), json!("other"));
        svc.extra_params.insert("top_p".to_string(), json!(0.9));
        svc.extra_params.insert("temperature".to_string(), json!(0.1));

        let body = build_request_body(&svc, &Glossary::new(), "Hello", true);
        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "claude-test");
        assert_eq!(body["top_p"], 0.9);
        assert_eq!(body["temperature"], 0.1);
    }
}
