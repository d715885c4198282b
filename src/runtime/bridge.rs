use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::plan::TaskTree;
use crate::planner::PlannedStep;
use crate::runtime::{RunnerEvent, SkipReason, apply_runner_event};

/// 外部执行器边界：拿到步骤列表后在自己的 worker 里跑，
/// 通过事件通道回报生命周期。本核心只消费事件，从不等待执行本身。
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn start(&self, steps: Vec<PlannedStep>) -> mpsc::Receiver<RunnerEvent>;
}

/// 一次运行的汇总：取消后树上与这里只会有真实发生过的结果。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub finished: bool,
}

/// 把一次运行的事件流排干到任务树上。
///
/// 事件按到达顺序逐条落树；通道被 Runner 丢弃（取消）时循环自然结束，
/// 不补写任何未收到的状态。
pub async fn drain_run(
    tree: &mut TaskTree,
    mut events: mpsc::Receiver<RunnerEvent>,
) -> RunSummary {
    let mut summary = RunSummary {
        run_id: Uuid::new_v4(),
        ..RunSummary::default()
    };
    info!(run_id = %summary.run_id, "run started");
    while let Some(event) = events.recv().await {
        match &event {
            RunnerEvent::StepCompleted { success, .. } => {
                if *success {
                    summary.completed += 1;
                } else {
                    summary.failed += 1;
                }
            }
            RunnerEvent::StepSkipped { reason, .. } => {
                // 上下文步骤的越过不计入任何失败口径
                if *reason != SkipReason::ContextOnly {
                    summary.skipped += 1;
                }
            }
            RunnerEvent::Finished => {
                summary.finished = true;
            }
            RunnerEvent::StepWillStart { .. } => {}
        }
        apply_runner_event(tree, &event);
        if summary.finished {
            break;
        }
    }
    info!(
        run_id = %summary.run_id,
        completed = summary.completed,
        failed = summary.failed,
        skipped = summary.skipped,
        finished = summary.finished,
        "run drained"
    );
    summary
}
