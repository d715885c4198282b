pub mod bridge;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::plan::{StepStatus, TaskTree};

/// 跳过原因。`ContextOnly` 是单步模式下的“仅作上下文”标记，
/// 执行器必须直接越过它，绝不能当作失败渲染。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    ContextOnly,
    TooFarToAct,
    Other { detail: String },
}

impl SkipReason {
    pub fn other(detail: impl Into<String>) -> Self {
        SkipReason::Other { detail: detail.into() }
    }
}

/// Runner 生命周期事件：每次运行内保证有序，但可能落在任意一轮事件循环上。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunnerEvent {
    StepWillStart {
        task_id: String,
    },
    StepCompleted {
        task_id: String,
        success: bool,
        #[serde(default)]
        reason: String,
    },
    StepSkipped {
        task_id: String,
        reason: SkipReason,
    },
    Finished,
}

/// 把一条 Runner 事件落到任务树上：只改对应节点的单个运行期字段。
///
/// 失败只记录原因，不中止剩余步骤；状态从不预写，
/// 中途取消后树上只会留下真实发生过的完成/失败/跳过。
pub fn apply_runner_event(tree: &mut TaskTree, event: &RunnerEvent) {
    match event {
        RunnerEvent::StepWillStart { task_id } => {
            set_status(tree, task_id, StepStatus::Running);
        }
        RunnerEvent::StepCompleted { task_id, success, reason } => {
            let status = if *success {
                StepStatus::Succeeded
            } else {
                StepStatus::Failed { reason: reason.clone() }
            };
            set_status(tree, task_id, status);
        }
        RunnerEvent::StepSkipped { task_id, reason } => {
            set_status(tree, task_id, StepStatus::Skipped { reason: reason.clone() });
        }
        RunnerEvent::Finished => {}
    }
}

fn set_status(tree: &mut TaskTree, task_id: &str, status: StepStatus) {
    match tree.get_mut(task_id) {
        Some(node) => {
            debug!(task_id, ?status, "step status update");
            node.state.status = status;
        }
        None => {
            // 识别回填或重编译可能与事件交错；陈旧 id 不致命
            warn!(task_id, "runner event for unknown task id");
        }
    }
}
