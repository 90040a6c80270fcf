//! Graph builder: stages + edge table, validated into a [`CompiledGraph`].

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use super::compile_error::CompilationError;
use super::compiled::CompiledGraph;
use super::stage::{Reducer, Stage};
use crate::memory::Checkpointer;

/// Sentinel for graph entry: `add_edge(START, first_stage)`.
pub const START: &str = "__start__";

/// Sentinel for graph exit: `add_edge(last_stage, END)`.
pub const END: &str = "__end__";

/// Default cap on supersteps; a routing loop hits this instead of hanging.
const DEFAULT_STEP_LIMIT: usize = 50;

/// Declarative pipeline graph under construction.
///
/// Unlike a linear chain, a stage may declare several outgoing edges
/// (fan-out) and be the target of several (fan-in); the per-field reducer
/// passed at construction makes concurrent updates merge deterministically.
pub struct StateGraph<S, D> {
    stages: HashMap<String, Arc<dyn Stage<S, D>>>,
    edges: Vec<(String, String)>,
    reducer: Arc<dyn Reducer<S, D>>,
    step_limit: usize,
}

impl<S, D> StateGraph<S, D>
where
    S: Clone + Send + Sync + Debug + 'static,
{
    /// Creates an empty graph with the reducer that folds stage updates.
    pub fn new(reducer: Arc<dyn Reducer<S, D>>) -> Self {
        Self {
            stages: HashMap::new(),
            edges: Vec::new(),
            reducer,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    /// Overrides the superstep cap.
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    /// Adds a stage under its own id; replaces on duplicate id.
    pub fn add_stage(&mut self, stage: Arc<dyn Stage<S, D>>) -> &mut Self {
        self.stages.insert(stage.id().to_string(), stage);
        self
    }

    /// Adds an edge. Repeated `from` ids accumulate into a fan-out set; the
    /// successor order is the insertion order (it is also the deterministic
    /// merge order for concurrent updates).
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Validates the edge table and produces an executable graph.
    pub fn compile(self) -> Result<CompiledGraph<S, D>, CompilationError> {
        self.compile_internal(None)
    }

    /// As [`Self::compile`], with state persisted per thread id at stage
    /// boundaries.
    pub fn compile_with_checkpointer(
        self,
        checkpointer: Arc<dyn Checkpointer<S>>,
    ) -> Result<CompiledGraph<S, D>, CompilationError> {
        self.compile_internal(Some(checkpointer))
    }

    fn compile_internal(
        self,
        checkpointer: Option<Arc<dyn Checkpointer<S>>>,
    ) -> Result<CompiledGraph<S, D>, CompilationError> {
        for (from, to) in &self.edges {
            if from != START && !self.stages.contains_key(from) {
                return Err(CompilationError::StageNotFound(from.clone()));
            }
            if to != END && !self.stages.contains_key(to) {
                return Err(CompilationError::StageNotFound(to.clone()));
            }
        }

        let entry: Vec<String> = self
            .edges
            .iter()
            .filter(|(from, _)| from == START)
            .map(|(_, to)| to.clone())
            .collect();
        if entry.is_empty() {
            return Err(CompilationError::MissingEntry);
        }
        if !self.edges.iter().any(|(_, to)| to == END) {
            return Err(CompilationError::MissingEnd);
        }

        let mut successors: HashMap<String, Vec<String>> = HashMap::new();
        for (from, to) in &self.edges {
            if from == START {
                continue;
            }
            let list = successors.entry(from.clone()).or_default();
            if !list.contains(to) {
                list.push(to.clone());
            }
        }

        Ok(CompiledGraph {
            stages: self.stages,
            entry,
            successors,
            reducer: self.reducer,
            checkpointer,
            step_limit: self.step_limit,
        })
    }
}
