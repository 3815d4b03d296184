//! 翻译请求模型
//!
//! 一次用户操作对应一个 `TranslationRequest`，只在编排器调用期间存在。

use super::BackendService;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// 术语表条目
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub source: String,
    pub target: String,
}

impl GlossaryEntry {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// 有序术语表，按 (source, target) 去重
///
/// 反序列化同样经过 `from_entries`。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<GlossaryEntry>", into = "Vec<GlossaryEntry>")]
pub struct Glossary {
    entries: Vec<GlossaryEntry>,
}

impl Glossary {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从条目构建，保留首次出现的顺序并去掉空条目和重复条目
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = GlossaryEntry>,
    {
        let unique: IndexSet<GlossaryEntry> = entries
            .into_iter()
            .map(|e| GlossaryEntry::new(e.source.trim(), e.target.trim()))
            .filter(|e| !e.source.is_empty() && !e.target.is_empty())
            .collect();
        Self {
            entries: unique.into_iter().collect(),
        }
    }

    pub fn entries(&self) -> &[GlossaryEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 稳定签名：`source=>target` 按列表顺序以换行拼接
    pub fn signature(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}=>{}", e.source, e.target))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<Vec<GlossaryEntry>> for Glossary {
    fn from(entries: Vec<GlossaryEntry>) -> Self {
        Self::from_entries(entries)
    }
}

impl From<Glossary> for Vec<GlossaryEntry> {
    fn from(glossary: Glossary) -> Self {
        glossary.entries
    }
}

/// 一次翻译请求
#[derive(Debug, Clone)]
pub struct TranslationRequest {
    /// 已预处理的原文（非空）
    pub source_text: String,
    pub glossary: Glossary,
    /// 按配置顺序排列的候选服务
    pub services: Vec<BackendService>,
    /// 当前激活（用户选中）的服务
    pub active_service_id: Option<String>,
}

impl TranslationRequest {
    pub fn new(source_text: impl Into<String>, services: Vec<BackendService>) -> Self {
        Self {
            source_text: source_text.into(),
            glossary: Glossary::default(),
            services,
            active_service_id: None,
        }
    }

    pub fn with_glossary(mut self, glossary: Glossary) -> Self {
        self.glossary = glossary;
        self
    }

    pub fn with_active_service(mut self, id: impl Into<String>) -> Self {
        self.active_service_id = Some(id.into());
        self
    }
}
