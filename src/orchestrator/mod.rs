//! 翻译编排
//!
//! 一次请求内所有后端并发执行（fan-out），编排器汇总各后端的进度（fan-in）：
//!
//! ```text
//! TranslationRequest ──▶ RoutingScorer::rank ──▶ 每个后端一个任务 ──▶ UpdateSink
//!                                                                      │
//!              TranslationEvent ◀── 节流 / 快照或增量 ◀── 编排循环 ◀───┘
//! ```
//!
//! 请求成功的条件是至少一个后端 `done`；全部 `error` 时以最先失败的后端错误作为
//! 请求级错误。

mod board;
mod engine;
mod events;
mod state;
mod throttle;


pub use board::ResultBoard;
pub use engine::{Orchestrator, OrchestratorConfig, TranslationOutcome};
pub use events::{EmitMode, ServiceDelta, TextPatch, TranslationEvent};
pub use state::{ServiceRunState, ServiceStatus, Summary};
pub use throttle::Throttle;
