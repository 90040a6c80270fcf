//! Pipeline graph: stages + an explicit edge table, compile and invoke.
//!
//! Build with `add_stage` / `add_edge(from, to)` using `START` and `END`
//! sentinels, then `compile` (or `compile_with_checkpointer`) to get a
//! [`CompiledGraph`]. A stage may have several outgoing edges (fan-out: the
//! successors run concurrently on state snapshots) and several incoming ones
//! (fan-in: updates merge through the per-field reducer before the successor
//! runs). Routing can be overridden per run through the returned
//! [`Command`].

mod command;
mod compile_error;
mod compiled;
mod run_context;
mod stage;
mod state_graph;

#[cfg(test)]
pub(crate) mod testing;

pub use command::{Command, Goto};
pub use compile_error::CompilationError;
pub use compiled::CompiledGraph;
pub use run_context::RunContext;
pub use stage::{JoinStage, Merge, Reducer, Stage, SubgraphStage};
pub use state_graph::{StateGraph, END, START};
