pub mod cache;
pub mod compiler;
pub mod diag;
pub mod error;
pub mod graph;
pub mod plan;
pub mod planner;
pub mod resolver;
pub mod runtime;
