//! Pipeline assembly: the outer graph and the chat subgraph.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    ActivityStage, AfterthoughtStage, AgentsStage, AutoToolsStage, CleanupStage, EntrypointStage,
    KnowledgeStage, PreprocessStage, Services, SummarizeStage, ToolsStage, VisionStage,
    WakeupStage,
};
use crate::error::RuntimeError;
use crate::graph::{
    Command, CompilationError, CompiledGraph, JoinStage, RunContext, Stage, StateGraph,
    SubgraphStage, END, START,
};
use crate::memory::Checkpointer;
use crate::state::{Delta, PipelineReducer, PipelineState};

/// Subgraph exit bookkeeping: report the turn's activity over the side
/// channel.
pub struct PostprocessStage;

impl PostprocessStage {
    pub const ID: &'static str = "postprocess";
}

#[async_trait]
impl Stage<PipelineState, Delta> for PostprocessStage {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn run(
        &self,
        state: PipelineState,
        ctx: &RunContext<PipelineState>,
    ) -> Result<Command<Delta>, RuntimeError> {
        ctx.emit_directive(directive::Directive::Activity(state.activity.clone()))
            .await;
        Ok(Command::cont())
    }
}

fn reducer(services: &Services) -> Arc<PipelineReducer> {
    Arc::new(PipelineReducer::new(services.knobs.default_activity.clone()))
}

/// The chat subgraph:
/// `entrypoint → {tools, activity, vision, knowledge} ⇒ local_merge →
/// agents → postprocess → end`. The entrypoint (and, in its modes, vision
/// or activity) overrides the static fan-out through commands.
pub fn build_chat_subgraph(
    services: Arc<Services>,
) -> Result<CompiledGraph<PipelineState, Delta>, CompilationError> {
    let mut graph = StateGraph::new(reducer(&services));
    graph.add_stage(Arc::new(EntrypointStage));
    graph.add_stage(Arc::new(ToolsStage::new(services.clone())));
    graph.add_stage(Arc::new(ActivityStage::new(services.clone())));
    graph.add_stage(Arc::new(VisionStage::new(services.clone())));
    graph.add_stage(Arc::new(KnowledgeStage::new(services.clone())));
    graph.add_stage(Arc::new(JoinStage::new("local_merge")));
    graph.add_stage(Arc::new(AgentsStage::new(services)));
    graph.add_stage(Arc::new(PostprocessStage));

    graph.add_edge(START, EntrypointStage::ID);
    for stage in [
        ToolsStage::ID,
        ActivityStage::ID,
        VisionStage::ID,
        KnowledgeStage::ID,
    ] {
        graph.add_edge(EntrypointStage::ID, stage);
        graph.add_edge(stage, "local_merge");
    }
    graph.add_edge("local_merge", AgentsStage::ID);
    graph.add_edge(AgentsStage::ID, PostprocessStage::ID);
    graph.add_edge(PostprocessStage::ID, END);
    graph.compile()
}

/// The outer pipeline:
/// `preprocess → {chat, summarize} ⇒ merge → {afterthought, autotools} ⇒
/// cleanup → end`, plus the `preprocess → wakeup → end` side branch.
pub fn build_pipeline(
    services: Arc<Services>,
    checkpointer: Option<Arc<dyn Checkpointer<PipelineState>>>,
) -> Result<CompiledGraph<PipelineState, Delta>, CompilationError> {
    let chat = build_chat_subgraph(services.clone())?;

    let mut graph = StateGraph::new(reducer(&services));
    graph.add_stage(Arc::new(PreprocessStage::new(services.clone())));
    graph.add_stage(Arc::new(WakeupStage::new(services.clone())));
    graph.add_stage(Arc::new(SubgraphStage::new("chat", chat)));
    graph.add_stage(Arc::new(SummarizeStage::new(services.clone())));
    graph.add_stage(Arc::new(JoinStage::new("merge")));
    graph.add_stage(Arc::new(AfterthoughtStage::new(services.clone())));
    graph.add_stage(Arc::new(AutoToolsStage::new(services)));
    graph.add_stage(Arc::new(CleanupStage));

    graph.add_edge(START, PreprocessStage::ID);
    graph.add_edge(PreprocessStage::ID, "chat");
    graph.add_edge(PreprocessStage::ID, SummarizeStage::ID);
    graph.add_edge("chat", "merge");
    graph.add_edge(SummarizeStage::ID, "merge");
    graph.add_edge("merge", AfterthoughtStage::ID);
    graph.add_edge("merge", AutoToolsStage::ID);
    graph.add_edge(AfterthoughtStage::ID, CleanupStage::ID);
    graph.add_edge(AutoToolsStage::ID, CleanupStage::ID);
    graph.add_edge(CleanupStage::ID, END);

    match checkpointer {
        Some(checkpointer) => graph.compile_with_checkpointer(checkpointer),
        None => graph.compile(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::test_services;

    /// **Scenario**: Both graphs assemble without edge-table errors.
    #[test]
    fn graphs_compile() {
        let (services, _env) = test_services();
        build_chat_subgraph(services.clone()).unwrap();
        build_pipeline(services, None).unwrap();
    }
}
