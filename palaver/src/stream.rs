//! Streaming side channel: what a graph run emits while it executes.

use directive::Directive;

/// Which gated event kinds to emit. [`StreamEvent::Directive`] always
/// passes: directives are the run's product, not telemetry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamMode {
    /// Full state snapshot after each superstep.
    Values,
    /// Stage start/end markers.
    Tasks,
    /// Checkpoint ids as they are written.
    Checkpoints,
}

/// One event on the side channel.
#[derive(Clone, Debug)]
pub enum StreamEvent<S> {
    /// A side-channel directive for the adapter (`#send#`, tokens, …).
    Directive(Directive),
    /// State snapshot after a superstep (mode: Values).
    Values(S),
    /// A stage began executing (mode: Tasks).
    TaskStart { stage: String },
    /// A stage finished (mode: Tasks).
    TaskEnd {
        stage: String,
        result: Result<(), String>,
    },
    /// A checkpoint was written (mode: Checkpoints).
    Checkpoint { checkpoint_id: String, step: i64 },
}
