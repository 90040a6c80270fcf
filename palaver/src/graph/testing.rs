//! Shared fixtures for graph tests: a note-taking stage over Vec<String>.

use async_trait::async_trait;

use super::command::Command;
use super::run_context::RunContext;
use super::stage::{Merge, Reducer, Stage};
use crate::error::RuntimeError;

impl Merge for Vec<String> {
    fn merge(&mut self, other: Self) {
        self.extend(other);
    }
}

/// Reducer that appends every note to the state.
pub(crate) struct NoteReducer;

impl Reducer<Vec<String>, Vec<String>> for NoteReducer {
    fn apply(&self, state: &mut Vec<String>, delta: Vec<String>) -> Result<(), RuntimeError> {
        state.extend(delta);
        Ok(())
    }
}

/// Stage that records its id and continues along the edge table.
pub(crate) struct NoteStage {
    id: String,
}

impl NoteStage {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Stage<Vec<String>, Vec<String>> for NoteStage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(
        &self,
        _state: Vec<String>,
        _ctx: &RunContext<Vec<String>>,
    ) -> Result<Command<Vec<String>>, RuntimeError> {
        Ok(Command::update(vec![self.id.clone()]))
    }
}

type RouteFn = fn(&Vec<String>) -> Result<Command<Vec<String>>, RuntimeError>;

/// Stage with a custom routing function.
pub(crate) struct RouteStage {
    id: String,
    route: RouteFn,
}

impl RouteStage {
    pub(crate) fn new(id: impl Into<String>, route: RouteFn) -> Self {
        Self {
            id: id.into(),
            route,
        }
    }
}

#[async_trait]
impl Stage<Vec<String>, Vec<String>> for RouteStage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(
        &self,
        state: Vec<String>,
        _ctx: &RunContext<Vec<String>>,
    ) -> Result<Command<Vec<String>>, RuntimeError> {
        (self.route)(&state)
    }
}
