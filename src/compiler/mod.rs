pub mod core;
pub mod edge_lookup;
pub mod flow;
pub mod loader;
pub mod params;

pub use self::core::{CompileContext, CompileOutput, TaskPlanCompiler};
