use thiserror::Error;

use crate::plan::StepKind;

/// 编译期致命错误：任何一个都会中止整次编译，不提交部分任务树。
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("composite '{composite_id}' references itself (directly or transitively)")]
    CompositeCycle { composite_id: String },

    #[error("composite '{composite_id}' has no graph document in the store")]
    UnresolvedComposite { composite_id: String },

    #[error("missing required compile context: {field}")]
    MissingContext { field: &'static str },
}

/// 规划期可恢复错误：只影响单次调用，由调用方决定提示/日志/静默。
///
/// `reason()` 是机器可读错误码，UI 层按码选择文案。
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanningError {
    #[error("no resolvable current task")]
    NoCurrentTask,

    #[error("no resolvable current event flow")]
    NoCurrentFlow,

    #[error("the graph root has no event flows")]
    NoEventFlows,

    #[error("current flow is not among the graph root's flows")]
    FlowNotInGraph,

    #[error("step kind {kind:?} does not support execution: {message}")]
    UnsupportedType { kind: StepKind, message: String },

    #[error("graph data unavailable for '{graph_id}'")]
    GraphDataUnavailable { graph_id: String },
}

impl PlanningError {
    pub fn reason(&self) -> &'static str {
        match self {
            PlanningError::NoCurrentTask => "no_current_task",
            PlanningError::NoCurrentFlow => "no_current_flow",
            PlanningError::NoEventFlows => "no_event_flows",
            PlanningError::FlowNotInGraph => "flow_not_in_graph",
            PlanningError::UnsupportedType { .. } => "unsupported_type",
            PlanningError::GraphDataUnavailable { .. } => "graph_data_unavailable",
        }
    }
}
