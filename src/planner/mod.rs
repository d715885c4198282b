pub mod backfill;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PlanningError;
use crate::plan::{RootKind, StepKind, TaskTree};
use crate::resolver::{CurrentTaskContext, resolve_root};
use crate::runtime::SkipReason;

/// 计划里的一个元素：要么真执行，要么带跳过原因仅作上下文。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannedStep {
    pub task_id: String,
    /// Some(ContextOnly) 的步骤执行器必须直接越过，不算失败。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<SkipReason>,
}

impl PlannedStep {
    fn run(task_id: &str) -> Self {
        Self { task_id: task_id.to_string(), skip: None }
    }

    fn context_only(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            skip: Some(SkipReason::ContextOnly),
        }
    }
}

/// 规划结果：有序步骤列表 + 运行结束后要恢复选中的锚点任务 id。
#[derive(Debug, Clone, PartialEq)]
pub struct StepPlan {
    pub steps: Vec<PlannedStep>,
    pub anchor_id: String,
}

impl StepPlan {
    /// 真正会执行的步骤 id（过滤掉上下文步骤）。
    pub fn executable_ids(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.skip.is_none())
            .map(|s| s.task_id.as_str())
            .collect()
    }
}

/// 整图执行：解析当前图根，深度优先展平全部后代叶子（递归进事件流）。
pub fn plan_whole_graph(context: &CurrentTaskContext<'_>) -> Result<StepPlan, PlanningError> {
    let root = resolve_root(context, RootKind::GraphRoot).ok_or(PlanningError::NoCurrentTask)?;
    if root.detail.kind() != StepKind::GraphRoot {
        return Err(PlanningError::NoCurrentTask);
    }
    let steps = flatten_run_steps(context.tree, &root.id);
    debug!(anchor = %root.id, steps = steps.len(), "whole-graph plan");
    Ok(StepPlan { steps, anchor_id: root.id.clone() })
}

/// 单个事件流执行：解析最近的事件流根并展平它的叶子。
pub fn plan_event_flow(context: &CurrentTaskContext<'_>) -> Result<StepPlan, PlanningError> {
    let flow_root =
        resolve_root(context, RootKind::EventFlowRoot).ok_or(PlanningError::NoCurrentTask)?;
    if flow_root.detail.kind() != StepKind::EventFlowRoot {
        return Err(PlanningError::NoCurrentFlow);
    }
    let steps = flatten_run_steps(context.tree, &flow_root.id);
    debug!(anchor = %flow_root.id, steps = steps.len(), "event-flow plan");
    Ok(StepPlan { steps, anchor_id: flow_root.id.clone() })
}

/// 从当前事件流起，连续执行同一图根下声明顺序靠后的剩余事件流。
pub fn plan_remaining_flows(context: &CurrentTaskContext<'_>) -> Result<StepPlan, PlanningError> {
    let resolved =
        resolve_root(context, RootKind::EventFlowRoot).ok_or(PlanningError::NoCurrentFlow)?;

    // 回溯可能停在图根上（例如选中的就是图根）；此时从它的第一条事件流起跑
    let (graph_root_id, current_flow_id) = match &resolved.detail {
        crate::plan::TaskDetail::EventFlowRoot { graph_root_task_id, .. } => {
            let graph_root_id = if graph_root_task_id.is_empty() {
                resolved.parent_id.clone()
            } else {
                graph_root_task_id.clone()
            };
            (graph_root_id, Some(resolved.id.clone()))
        }
        crate::plan::TaskDetail::GraphRoot { .. } => (resolved.id.clone(), None),
        _ => return Err(PlanningError::NoCurrentFlow),
    };

    let flows = context.tree.event_flow_children(&graph_root_id);
    if flows.is_empty() {
        return Err(PlanningError::NoEventFlows);
    }

    let start_index = match &current_flow_id {
        Some(id) => flows
            .iter()
            .position(|f| &f.id == id)
            .ok_or(PlanningError::FlowNotInGraph)?,
        None => 0,
    };
    let current_flow = flows[start_index];

    let mut steps = Vec::new();
    for flow in &flows[start_index..] {
        steps.extend(flatten_run_steps(context.tree, &flow.id));
    }
    debug!(anchor = %current_flow.id, flows = flows.len() - start_index, steps = steps.len(), "remaining-flows plan");
    Ok(StepPlan { steps, anchor_id: current_flow.id.clone() })
}

/// 从指定叶子步骤起，到其所属序列末尾的连续执行计划。
/// 结果的第一个元素恒为 `start_id` 本身。
pub fn plan_from_step(tree: &TaskTree, start_id: &str) -> Result<StepPlan, PlanningError> {
    let start = tree.get(start_id).ok_or(PlanningError::NoCurrentTask)?;
    let anchor = pick_planning_scope(tree, start_id);
    let flattened = flatten_run_steps(tree, &anchor);

    let steps = match flattened.iter().position(|s| s.task_id == start_id) {
        Some(index) => flattened[index..].to_vec(),
        // 锚点序列里找不到起点时退化为只执行起点自身
        None => vec![PlannedStep::run(&start.id)],
    };
    debug!(anchor = %start_id, scope = %anchor, steps = steps.len(), "from-step plan");
    Ok(StepPlan { steps, anchor_id: start_id.to_string() })
}

/// 严格单步执行：只有目标步骤可执行，同流的其余步骤保留为上下文。
pub fn plan_single_step(tree: &TaskTree, step_id: &str) -> Result<StepPlan, PlanningError> {
    let step = tree.get(step_id).ok_or(PlanningError::NoCurrentTask)?;
    let kind = step.detail.kind();
    if !kind.is_executable() {
        return Err(PlanningError::UnsupportedType {
            kind,
            message: format!(
                "当前步骤类型不支持自动执行：{kind:?}。请选择具体的节点图操作步骤（创建节点/连线/配置等）后再试。"
            ),
        });
    }

    let scope = pick_planning_scope(tree, step_id);
    let steps: Vec<PlannedStep> = tree
        .flatten_leaves(&scope)
        .into_iter()
        .map(|id| {
            if id == step_id {
                PlannedStep::run(&id)
            } else {
                PlannedStep::context_only(&id)
            }
        })
        .collect();
    let steps = if steps.iter().any(|s| s.skip.is_none()) {
        steps
    } else {
        vec![PlannedStep::run(step_id)]
    };
    Ok(StepPlan { steps, anchor_id: step_id.to_string() })
}

/// 选择步骤级规划的范围：事件流根 → 图根 → 直接父节点 → 自身。
fn pick_planning_scope(tree: &TaskTree, task_id: &str) -> String {
    if let Some(flow_root) = tree.nearest_ancestor_of_kind(task_id, RootKind::EventFlowRoot) {
        return flow_root.id.clone();
    }
    if let Some(graph_root) = tree.nearest_ancestor_of_kind(task_id, RootKind::GraphRoot) {
        return graph_root.id.clone();
    }
    if let Some(node) = tree.get(task_id) {
        if !node.parent_id.is_empty() && tree.contains(&node.parent_id) {
            return node.parent_id.clone();
        }
    }
    task_id.to_string()
}

fn flatten_run_steps(tree: &TaskTree, root_id: &str) -> Vec<PlannedStep> {
    tree.flatten_leaves(root_id)
        .into_iter()
        .map(|id| PlannedStep::run(&id))
        .collect()
}
