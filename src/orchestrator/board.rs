//! 事件消费端的状态还原
//!
//! 无论收到的是快照还是增量，`ResultBoard` 都还原出同一份按后端 id 索引的状态。

use super::events::TranslationEvent;
use super::state::{ServiceRunState, Summary};
use indexmap::IndexMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ResultBoard {
    states: IndexMap<String, ServiceRunState>,
    finished: bool,
    error: Option<String>,
}

impl ResultBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 应用一个事件
    pub fn apply(&mut self, event: &TranslationEvent) {
        match event {
            TranslationEvent::Started { services, .. }
            | TranslationEvent::Progress { services, .. } => {
                self.states = services
                    .iter()
                    .map(|s| (s.service_id.clone(), s.clone()))
                    .collect();
            }
            TranslationEvent::ServiceUpdate {
                changed_service_id,
                service_delta,
            } => {
                let Some(state) = self.states.get_mut(changed_service_id) else {
                    debug!("[ORCHESTRATOR] 忽略未知后端的增量: {}", changed_service_id);
                    return;
                };
                state.status = service_delta.status;
                state.from_cache = service_delta.from_cache;
                if service_delta.error.is_some() {
                    state.error_message = service_delta.error.clone();
                    state.error_detail = service_delta.error_detail.clone();
                }
                if let Some(patch) = &service_delta.translation {
                    patch.apply(&mut state.accumulated_text);
                }
                if let Some(patch) = &service_delta.thinking {
                    patch.apply(&mut state.accumulated_thinking);
                }
            }
            TranslationEvent::AllDone { error } => {
                self.finished = true;
                self.error = error.clone();
            }
        }
    }

    pub fn get(&self, service_id: &str) -> Option<&ServiceRunState> {
        self.states.get(service_id)
    }

    /// 按初始快照顺序排列的状态
    pub fn states(&self) -> Vec<ServiceRunState> {
        self.states.values().cloned().collect()
    }

    pub fn summary(&self) -> Summary {
        Summary::from_states(self.states.values())
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
