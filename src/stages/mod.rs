//! Stage functions. Each returns a typed output; the orchestrator decides
//! which state field receives it.

pub mod columns;
pub mod domain;
pub mod execution;
pub mod filters;
pub mod generation;
pub mod router;
