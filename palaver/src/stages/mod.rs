//! Stage implementations and pipeline assembly.
//!
//! Outer graph:
//! `preprocess → {chat, summarize} ⇒ merge → {afterthought, autotools} ⇒
//! cleanup → end`, with a side branch `preprocess → wakeup → end` when a
//! wake-up input is present.
//!
//! The chat subgraph runs `entrypoint → {tools, activity, vision,
//! knowledge} ⇒ local_merge → agents → postprocess`, with the entrypoint
//! picking one of three fan-out modes (regular, vision-first, idle).

mod activity;
mod afterthought;
mod agents;
mod autotools;
mod cleanup;
mod entrypoint;
mod graph;
mod knowledge;
mod preprocess;
mod summarize;
mod tools;
mod vision;
mod wakeup;

pub use activity::{ActivityDecision, ActivityStage, DecisionAction};
pub use afterthought::AfterthoughtStage;
pub use agents::AgentsStage;
pub use autotools::AutoToolsStage;
pub use cleanup::CleanupStage;
pub use entrypoint::EntrypointStage;
pub use graph::{build_chat_subgraph, build_pipeline, PostprocessStage};
pub use knowledge::KnowledgeStage;
pub use preprocess::PreprocessStage;
pub use summarize::SummarizeStage;
pub use tools::ToolsStage;
pub use vision::VisionStage;
pub use wakeup::WakeupStage;

use std::sync::Arc;

use env_config::Knobs;

use crate::knowledge::KnowledgeStore;
use crate::llm::ChatModel;
use crate::mcp::{McpClient, WakeupSender};
use crate::registry::AgentRegistry;
use crate::vision::VisionService;
use crate::wait::WaitTable;

/// Long-lived services created at startup and handed to every stage.
///
/// Stages hold this behind an `Arc`; nothing here is mutated after init
/// (the stores synchronize internally).
pub struct Services {
    pub knobs: Knobs,
    pub registry: AgentRegistry,
    /// Small model answering the skip/check/take routing question.
    pub decision_model: Arc<dyn ChatModel>,
    /// Model producing summaries.
    pub summarize_model: Arc<dyn ChatModel>,
    pub mcp: Arc<McpClient>,
    pub vision: Arc<VisionService>,
    pub knowledge: Arc<KnowledgeStore>,
    pub wakeups: Arc<dyn WakeupSender>,
    pub waits: Arc<WaitTable>,
    /// Client used to fire channel wake-up URLs.
    pub http: reqwest::Client,
}

#[cfg(test)]
pub(crate) mod testing;
