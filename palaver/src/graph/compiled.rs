//! Compiled graph: immutable, runs supersteps until no stage is scheduled.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use super::command::Goto;
use super::run_context::RunContext;
use super::stage::{Merge, Reducer, Stage};
use super::state_graph::END;
use crate::error::RuntimeError;
use crate::memory::{Checkpoint, CheckpointSource, Checkpointer, RunConfig};
use crate::stream::{StreamEvent, StreamMode};

/// Executable pipeline graph produced by `StateGraph::compile`.
///
/// Execution is a sequence of supersteps: every stage in the frontier runs
/// concurrently on a snapshot of the state; their updates fold into the
/// state through the reducer in frontier order; the next frontier is the
/// union of the routed successors. Fan-in falls out of the union (a stage
/// targeted by several predecessors runs once, after the barrier).
pub struct CompiledGraph<S, D> {
    pub(super) stages: HashMap<String, Arc<dyn Stage<S, D>>>,
    pub(super) entry: Vec<String>,
    pub(super) successors: HashMap<String, Vec<String>>,
    pub(super) reducer: Arc<dyn Reducer<S, D>>,
    pub(super) checkpointer: Option<Arc<dyn Checkpointer<S>>>,
    pub(super) step_limit: usize,
}

impl<S, D> Debug for CompiledGraph<S, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("entry", &self.entry)
            .field("successors", &self.successors)
            .field("step_limit", &self.step_limit)
            .finish()
    }
}

impl<S, D> Clone for CompiledGraph<S, D> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
            entry: self.entry.clone(),
            successors: self.successors.clone(),
            reducer: self.reducer.clone(),
            checkpointer: self.checkpointer.clone(),
            step_limit: self.step_limit,
        }
    }
}

impl<S, D> CompiledGraph<S, D>
where
    S: Clone + Send + Sync + Debug + 'static,
    D: Merge + Default + Debug,
{
    /// Runs the graph to completion and returns the final state.
    ///
    /// With a checkpointer and `config.thread_id`, the state is persisted at
    /// every stage boundary; the last boundary uses the `update` source.
    pub async fn invoke(&self, state: S, config: Option<RunConfig>) -> Result<S, RuntimeError> {
        let ctx = RunContext::new(config.unwrap_or_default());
        self.invoke_with_context(state, &ctx).await
    }

    /// As [`Self::invoke`] with a caller-built context (streaming, config).
    pub async fn invoke_with_context(
        &self,
        state: S,
        ctx: &RunContext<S>,
    ) -> Result<S, RuntimeError> {
        let mut state = state;
        self.run_loop(&mut state, ctx, None).await?;
        Ok(state)
    }

    /// Runs the graph and additionally returns the merged accumulation of
    /// every update the stages produced. Used by [`super::SubgraphStage`] to
    /// surface an embedded run as one update of the outer graph.
    pub async fn invoke_collect(&self, state: S, ctx: &RunContext<S>) -> Result<(S, D), RuntimeError> {
        let mut state = state;
        let mut collected = D::default();
        self.run_loop(&mut state, ctx, Some(&mut collected)).await?;
        Ok((state, collected))
    }

    /// Streams execution events while running in a spawned task.
    pub fn stream(
        &self,
        state: S,
        config: Option<RunConfig>,
        modes: impl IntoIterator<Item = StreamMode>,
    ) -> ReceiverStream<StreamEvent<S>> {
        let (tx, rx) = mpsc::channel(128);
        let graph = self.clone();
        let ctx = RunContext::new(config.unwrap_or_default()).with_stream(tx, modes);
        tokio::spawn(async move {
            let mut state = state;
            if let Err(e) = graph.run_loop(&mut state, &ctx, None).await {
                error!(error = %e, "graph run failed");
            }
        });
        ReceiverStream::new(rx)
    }

    async fn run_loop(
        &self,
        state: &mut S,
        ctx: &RunContext<S>,
        mut collect: Option<&mut D>,
    ) -> Result<(), RuntimeError> {
        if self.entry.is_empty() {
            return Err(RuntimeError::ExecutionFailed("empty graph".into()));
        }
        let mut frontier: Vec<String> = self.entry.clone();
        let mut step: i64 = 0;

        while !frontier.is_empty() {
            if step as usize >= self.step_limit {
                return Err(RuntimeError::ExecutionFailed(format!(
                    "superstep limit {} reached",
                    self.step_limit
                )));
            }
            debug!(step, frontier = ?frontier, "superstep");

            for stage_id in &frontier {
                ctx.emit(
                    StreamMode::Tasks,
                    StreamEvent::TaskStart {
                        stage: stage_id.clone(),
                    },
                )
                .await;
            }

            let runs = frontier.iter().map(|stage_id| {
                let stage = self
                    .stages
                    .get(stage_id)
                    .expect("compiled graph has all stages")
                    .clone();
                let snapshot = state.clone();
                let ctx = ctx.clone();
                async move { (stage_id.clone(), stage.run(snapshot, &ctx).await) }
            });
            let results = futures::future::join_all(runs).await;

            let mut next: Vec<String> = Vec::new();
            for (stage_id, result) in results {
                let command = match result {
                    Ok(command) => {
                        ctx.emit(
                            StreamMode::Tasks,
                            StreamEvent::TaskEnd {
                                stage: stage_id.clone(),
                                result: Ok(()),
                            },
                        )
                        .await;
                        command
                    }
                    Err(e) => {
                        ctx.emit(
                            StreamMode::Tasks,
                            StreamEvent::TaskEnd {
                                stage: stage_id.clone(),
                                result: Err(e.to_string()),
                            },
                        )
                        .await;
                        error!(stage = %stage_id, error = %e, "stage failed");
                        return Err(e);
                    }
                };

                if let Some(delta) = command.update {
                    if let Some(collector) = collect.as_deref_mut() {
                        collector.merge(delta.clone());
                    }
                    self.reducer.apply(state, delta)?;
                }

                let targets: Vec<String> = match command.goto {
                    Goto::Continue => self
                        .successors
                        .get(&stage_id)
                        .cloned()
                        .unwrap_or_default(),
                    Goto::Stage(target) => vec![target],
                    Goto::Fanout(targets) => targets,
                    Goto::End => Vec::new(),
                };
                for target in targets {
                    if target == END {
                        continue;
                    }
                    if !self.stages.contains_key(&target) {
                        return Err(RuntimeError::ExecutionFailed(format!(
                            "routed to unknown stage: {target}"
                        )));
                    }
                    if !next.contains(&target) {
                        next.push(target);
                    }
                }
            }

            ctx.emit(StreamMode::Values, StreamEvent::Values(state.clone()))
                .await;

            step += 1;
            let source = if next.is_empty() {
                CheckpointSource::Update
            } else {
                CheckpointSource::Step
            };
            self.save_checkpoint(state, ctx, source, step).await;
            frontier = next;
        }
        Ok(())
    }

    async fn save_checkpoint(
        &self,
        state: &S,
        ctx: &RunContext<S>,
        source: CheckpointSource,
        step: i64,
    ) {
        let Some(checkpointer) = &self.checkpointer else {
            return;
        };
        if ctx.config.thread_id.is_none() {
            return;
        }
        let checkpoint = Checkpoint::from_state(state.clone(), source, step);
        match checkpointer.put(&ctx.config, &checkpoint).await {
            Ok(checkpoint_id) => {
                ctx.emit(
                    StreamMode::Checkpoints,
                    StreamEvent::Checkpoint {
                        checkpoint_id,
                        step,
                    },
                )
                .await;
            }
            Err(e) => error!(error = %e, "checkpoint write failed"),
        }
    }
}
