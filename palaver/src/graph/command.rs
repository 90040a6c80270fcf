//! The single value every stage returns: where to go, and a partial update.

/// Routing decision attached to a [`Command`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Goto {
    /// Follow the edge table (all declared successors).
    Continue,
    /// Jump to one named stage, ignoring the edge table.
    Stage(String),
    /// Fan out to this set of stages, ignoring the edge table.
    Fanout(Vec<String>),
    /// Stop this branch.
    End,
}

/// A stage's output: a routing decision plus an optional partial-state
/// update folded into the state by the graph's reducer.
#[derive(Clone, Debug)]
pub struct Command<D> {
    pub goto: Goto,
    pub update: Option<D>,
}

impl<D> Command<D> {
    /// Follow the edge table with no update.
    pub fn cont() -> Self {
        Self {
            goto: Goto::Continue,
            update: None,
        }
    }

    /// Follow the edge table, folding in an update.
    pub fn update(delta: D) -> Self {
        Self {
            goto: Goto::Continue,
            update: Some(delta),
        }
    }

    /// Jump to a named stage.
    pub fn goto(stage: impl Into<String>) -> Self {
        Self {
            goto: Goto::Stage(stage.into()),
            update: None,
        }
    }

    /// Fan out to a set of stages.
    pub fn fanout<I: IntoIterator<Item = T>, T: Into<String>>(stages: I) -> Self {
        Self {
            goto: Goto::Fanout(stages.into_iter().map(Into::into).collect()),
            update: None,
        }
    }

    /// Stop this branch.
    pub fn end() -> Self {
        Self {
            goto: Goto::End,
            update: None,
        }
    }

    /// Attach an update to any routing decision.
    pub fn with_update(mut self, delta: D) -> Self {
        self.update = Some(delta);
        self
    }
}
