//! 编排器对外发出的事件
//!
//! 快照携带全部后端状态；增量只引用发生变化的后端。两者都能被 `ResultBoard`
//! 还原成相同的状态列表。

use super::state::{ServiceRunState, ServiceStatus, Summary};
use serde::{Deserialize, Serialize};

/// 事件输出方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitMode {
    /// 每次变化发送完整快照
    Snapshot,
    /// 每次变化只发送变化的后端
    #[default]
    Delta,
}

/// 文本补丁
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextPatch {
    /// 追加到上次发送的文本之后
    TranslationDelta(String),
    /// 整体替换
    FullTranslation(String),
}

impl TextPatch {
    /// 由上次发送的文本和当前文本计算补丁，未变化时返回 `None`
    pub fn between(previous: &str, current: &str) -> Option<Self> {
        if previous == current {
            return None;
        }
        match current.strip_prefix(previous) {
            Some(suffix) => Some(TextPatch::TranslationDelta(suffix.to_string())),
            None => Some(TextPatch::FullTranslation(current.to_string())),
        }
    }

    pub fn apply(&self, target: &mut String) {
        match self {
            TextPatch::TranslationDelta(delta) => target.push_str(delta),
            TextPatch::FullTranslation(full) => *target = full.clone(),
        }
    }
}

/// 单个后端的增量
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDelta {
    pub status: ServiceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<TextPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<TextPatch>,
    #[serde(default)]
    pub from_cache: bool,
}

/// 编排器事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "kebab-case")]
pub enum TranslationEvent {
    /// 初始快照，所有后端为 pending
    Started {
        services: Vec<ServiceRunState>,
        summary: Summary,
    },
    /// 快照模式下的进度快照
    Progress {
        services: Vec<ServiceRunState>,
        summary: Summary,
    },
    /// 增量模式下单个后端的变化
    ServiceUpdate {
        changed_service_id: String,
        service_delta: ServiceDelta,
    },
    /// 所有后端结束
    AllDone {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl TranslationEvent {
    pub fn stage(&self) -> &'static str {
        match self {
            TranslationEvent::Started { .. } => "started",
            TranslationEvent::Progress { .. } => "progress",
            TranslationEvent::ServiceUpdate { .. } => "service-update",
            TranslationEvent::AllDone { .. } => "all-done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TranslationEvent::AllDone { .. })
    }

    /// 快照事件中的状态列表
    pub fn snapshot(&self) -> Option<&[ServiceRunState]> {
        match self {
            TranslationEvent::Started { services, .. }
            | TranslationEvent::Progress { services, .. } => Some(services),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_between() {
        assert_eq!(TextPatch::between("你", "你"), None);
        assert_eq!(
            TextPatch::between("你", "你好"),
            Some(TextPatch::TranslationDelta("好".to_string()))
        );
        assert_eq!(
            TextPatch::between("", "你好"),
            Some(TextPatch::TranslationDelta("你好".to_string()))
        );
        assert_eq!(
            TextPatch::between("你好", "您好"),
            Some(TextPatch::FullTranslation("您好".to_string()))
        );
    }

    #[test]
    fn test_patch_apply() {
        let mut text = "你".to_string();
        TextPatch::TranslationDelta("好".to_string()).apply(&mut text);
        assert_eq!(text, "你好");
        TextPatch::FullTranslation("hi".to_string()).apply(&mut text);
        assert_eq!(text, "hi");
    }

    #[test]
    fn test_event_wire_shape() {
        let event = TranslationEvent::ServiceUpdate {
            changed_service_id: "s1".to_string(),
            service_delta: ServiceDelta {
                status: ServiceStatus::Streaming,
                error: None,
                error_detail: None,
                translation: Some(TextPatch::TranslationDelta("好".to_string())),
                thinking: None,
                from_cache: false,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["stage"], "service-update");
        assert_eq!(json["changed_service_id"], "s1");
        assert_eq!(json["service_delta"]["status"], "streaming");
        assert_eq!(json["service_delta"]["translation"]["translation_delta"], "好");

        let done = serde_json::to_value(TranslationEvent::AllDone { error: None }).unwrap();
        assert_eq!(done, serde_json::json!({"stage": "all-done"}));

        let back: TranslationEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.stage(), "service-update");
    }
}
