//! 翻译结果缓存
//!
//! 进程内的 LRU 文本缓存，键由后端、模型、目标语言、术语表签名和原文共同决定。

use crate::models::{BackendService, Glossary};
use indexmap::IndexMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;

/// 默认缓存容量
pub const DEFAULT_CACHE_CAPACITY: usize = 200;

/// 缓存键
///
/// 任一组成部分变化都会得到不同的键。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(
        service_id: &str,
        model: &str,
        target_language: &str,
        glossary_signature: &str,
        source_text: &str,
    ) -> Self {
        let mut hasher = Sha256::new();
        // 长度前缀避免字段拼接产生歧义
        for part in [
            service_id,
            model,
            target_language,
            glossary_signature,
            source_text,
        ] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn for_service(service: &BackendService, glossary: &Glossary, source_text: &str) -> Self {
        Self::new(
            &service.id,
            &service.model,
            &service.target_language,
            &glossary.signature(),
            source_text,
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 有界 LRU 响应缓存
///
/// `IndexMap` 的插入顺序即最近使用顺序：队首最旧，队尾最新。
#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<IndexMap<CacheKey, String>>,
    capacity: usize,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(IndexMap::with_capacity(capacity + 1)),
            capacity,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 查询缓存，命中时移动到最近使用位置
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let mut entries = self.entries.lock();
        let value = entries.shift_remove(key)?;
        entries.insert(key.clone(), value.clone());
        Some(value)
    }

    /// 写入缓存，空白文本不缓存
    pub fn put(&self, key: CacheKey, text: &str) {
        if text.trim().is_empty() {
            return;
        }

        let mut entries = self.entries.lock();
        entries.shift_remove(&key);
        entries.insert(key, text.to_string());

        while entries.len() > self.capacity {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                debug!("[CACHE] 淘汰最久未使用条目: {}", evicted.as_str());
            }
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}
