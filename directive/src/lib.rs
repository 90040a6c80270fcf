//! Side-channel line protocol: control directives + literal text.
//!
//! This crate defines the wire shape of one side-channel line and the
//! adapter-side accumulation rules. It does not depend on the runtime; the
//! runtime encodes [`Directive`] values into lines and adapters parse them
//! back with [`Directive::parse`].

pub mod collector;
pub mod line;

pub use collector::{Collector, Flush};
pub use line::{Directive, ToolDescriptor};
