//! Ezbatch Resolver
//!
//! Turns a workflow's job keys and dependency map into a serial submission
//! order. Ordering is Kahn's algorithm over an index arena; among jobs that
//! are ready at the same time the lexically smallest key goes first, so the
//! order is reproducible.

mod error;
mod graph;
mod resolver;

pub use error::ResolveError;
pub use resolver::resolve;
