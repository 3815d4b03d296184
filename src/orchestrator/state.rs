//! 单次请求内每个后端的运行状态

use crate::models::BackendService;
use serde::{Deserialize, Serialize};

/// 后端运行状态
///
/// `pending → running → streaming → {done | error}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Pending,
    Running,
    Streaming,
    Done,
    Error,
}

impl ServiceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ServiceStatus::Done | ServiceStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Pending => "pending",
            ServiceStatus::Running => "running",
            ServiceStatus::Streaming => "streaming",
            ServiceStatus::Done => "done",
            ServiceStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个后端在本次请求中的状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRunState {
    pub service_id: String,
    pub service_name: String,
    pub status: ServiceStatus,
    pub accumulated_text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub accumulated_thinking: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// 原始响应预览
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default)]
    pub from_cache: bool,
}

impl ServiceRunState {
    pub fn pending(service: &BackendService) -> Self {
        Self {
            service_id: service.id.clone(),
            service_name: service.display_name().to_string(),
            status: ServiceStatus::Pending,
            accumulated_text: String::new(),
            accumulated_thinking: String::new(),
            error_message: None,
            error_detail: None,
            from_cache: false,
        }
    }
}

/// 各状态的计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub streaming: usize,
    pub done: usize,
    pub error: usize,
}

impl Summary {
    pub fn from_states<'a, I>(states: I) -> Self
    where
        I: IntoIterator<Item = &'a ServiceRunState>,
    {
        let mut summary = Summary::default();
        for state in states {
            summary.total += 1;
            match state.status {
                ServiceStatus::Pending => summary.pending += 1,
                ServiceStatus::Running => summary.running += 1,
                ServiceStatus::Streaming => summary.streaming += 1,
                ServiceStatus::Done => summary.done += 1,
                ServiceStatus::Error => summary.error += 1,
            }
        }
        summary
    }

    /// 所有后端都已结束
    pub fn is_complete(&self) -> bool {
        self.done + self.error == self.total
    }
}
