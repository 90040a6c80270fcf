//! Stage, reducer, and merge seams, plus the two structural stages
//! (join barrier, embedded subgraph).

use std::fmt::Debug;

use async_trait::async_trait;

use super::command::Command;
use super::compiled::CompiledGraph;
use super::run_context::RunContext;
use crate::error::RuntimeError;

/// A partial-state update that can be combined with another (fan-in, and
/// accumulation across an embedded subgraph).
pub trait Merge: Clone + Send + Sync + 'static {
    /// Folds `other` into `self`; `self` happened first.
    fn merge(&mut self, other: Self);
}

/// Folds a stage's partial update into the state, one field strategy at a
/// time (last-writer-wins, accumulate-until-reset, history reduce, …).
pub trait Reducer<S, D>: Send + Sync {
    fn apply(&self, state: &mut S, delta: D) -> Result<(), RuntimeError>;
}

/// One pipeline stage: an immutable state snapshot in, a [`Command`] out.
///
/// Stages emit side-channel events through the context and never mutate the
/// state directly; the graph router owns transitions and the reducer owns
/// mutation. On failure a stage either degrades to an empty update
/// internally or returns an error that aborts the run with the previous
/// checkpoint left authoritative.
#[async_trait]
pub trait Stage<S, D>: Send + Sync
where
    S: Clone + Send + Sync + Debug + 'static,
{
    /// Stage id, unique within a graph.
    fn id(&self) -> &str;

    async fn run(&self, state: S, ctx: &RunContext<S>) -> Result<Command<D>, RuntimeError>;
}

/// A no-op barrier used as a fan-in point: it runs once after all of its
/// in-flight predecessors finished their superstep.
pub struct JoinStage {
    id: String,
}

impl JoinStage {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl<S, D> Stage<S, D> for JoinStage
where
    S: Clone + Send + Sync + Debug + 'static,
    D: Merge + Default,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, _state: S, _ctx: &RunContext<S>) -> Result<Command<D>, RuntimeError> {
        Ok(Command::cont())
    }
}

/// An embedded graph running as a single stage of the outer graph.
///
/// The inner run starts from the outer snapshot; every update its stages
/// produce is accumulated and handed to the outer graph as this stage's one
/// update, so concurrent outer stages merge with it like with any other.
pub struct SubgraphStage<S, D> {
    id: String,
    inner: CompiledGraph<S, D>,
}

impl<S, D> SubgraphStage<S, D> {
    pub fn new(id: impl Into<String>, inner: CompiledGraph<S, D>) -> Self {
        Self {
            id: id.into(),
            inner,
        }
    }
}

#[async_trait]
impl<S, D> Stage<S, D> for SubgraphStage<S, D>
where
    S: Clone + Send + Sync + Debug + 'static,
    D: Merge + Default + Debug,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, state: S, ctx: &RunContext<S>) -> Result<Command<D>, RuntimeError> {
        let (_, collected) = self.inner.invoke_collect(state, ctx).await?;
        Ok(Command::update(collected))
    }
}
