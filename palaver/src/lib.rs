//! palaver: a multi-channel conversational agent runtime.
//!
//! The runtime keeps a persistent, structured conversation [`history`] across
//! external channels, drives a checkpointed pipeline [`graph`] of cooperating
//! [`stages`], schedules tool execution through the per-thread [`mcp`]
//! subsystem with a quick-response window, and compresses history into
//! hierarchical summaries through the [`format`] module to stay within a
//! bounded working set.
//!
//! Chat-surface adapters, LLM providers, and concrete tools are external
//! collaborators; the seams they plug into are [`llm::ChatModel`],
//! [`tools::Tool`], [`vision::LinkAdapter`], and [`mcp::WakeupSender`].

pub mod cache;
pub mod error;
pub mod format;
pub mod graph;
pub mod history;
pub mod knowledge;
pub mod llm;
pub mod mcp;
pub mod memory;
pub mod registry;
pub mod runtime;
pub mod stages;
pub mod state;
pub mod stream;
pub mod tools;
pub mod vision;
pub mod wait;

pub use error::RuntimeError;
pub use history::{History, InternalUpdates, Message};
pub use state::{Delta, PipelineState};
