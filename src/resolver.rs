//! 当前任务统一解析器。
//!
//! 把“当前任务”的解析规则收敛到单一模块，避免编排层和桥接层各自实现
//! 一套优先级策略。统一优先级（先到先得）：
//! 1. 视图选中项（与用户视觉上的“当前任务”一致）
//! 2. 显式跟踪的 current_id（由详情面板/外部跳转维护）
//! 3. 明细快照全量匹配（用于外部联动/旧上下文恢复）
//! 4. graph_id 兜底回调（用于任务清单刷新后 id 变化的情况，仅叶子解析）
//!
//! 根解析在命中叶子时沿父链回溯到目标类型的最近祖先；
//! 回溯本身委托给注入的结构回调或 `TaskTree` 的结构方法，
//! 本模块只定优先级，不重复实现树遍历。

use crate::plan::{RootKind, TaskDetail, TaskNode, TaskTree};

/// 叶子兜底回调：按 graph_id 找第一个合理的叶子步骤（找不到叶子时给最近的容器）。
pub type FindFirstForGraph<'a> = &'a dyn Fn(&str) -> Option<String>;
/// 根回溯回调：宿主想保持与 UI 行为一致时注入。
pub type FindRootOverride<'a> = &'a dyn Fn(&str, RootKind) -> Option<String>;

/// 一次解析调用消费的全部状态来源；解析器自身不依赖任何 UI 对象。
pub struct CurrentTaskContext<'a> {
    pub selected_id: &'a str,
    pub current_id: &'a str,
    /// 最近一次外部明细快照（可能已经过期）。
    pub last_detail: Option<&'a TaskDetail>,
    pub tree: &'a TaskTree,
    pub find_first_for_graph: Option<FindFirstForGraph<'a>>,
    pub find_root_override: Option<FindRootOverride<'a>>,
}

impl<'a> CurrentTaskContext<'a> {
    pub fn new(tree: &'a TaskTree) -> Self {
        Self {
            selected_id: "",
            current_id: "",
            last_detail: None,
            tree,
            find_first_for_graph: None,
            find_root_override: None,
        }
    }
}

/// 解析当前要执行的叶子任务；无法解析时返回 None，调用方视为“无事可做”。
pub fn resolve_leaf<'a>(context: &CurrentTaskContext<'a>) -> Option<&'a TaskNode> {
    if let Some(found) = resolve_by_priority(context) {
        return Some(found);
    }

    // 4) 兜底：按明细快照里的 graph_id 找一个可执行叶子
    let detail = context.last_detail?;
    let graph_id = detail.graph_id()?;
    let find = context.find_first_for_graph?;
    let fallback_id = find(graph_id)?;
    context.tree.get(&fallback_id)
}

/// 解析当前要执行的根任务（图根或事件流根）。
///
/// 命中非根节点时回溯到目标类型的最近祖先；回溯失败则原样返回命中节点，
/// 让调用方决定如何处理。
pub fn resolve_root<'a>(
    context: &CurrentTaskContext<'a>,
    root_kind: RootKind,
) -> Option<&'a TaskNode> {
    let current = resolve_by_priority(context)?;

    let target = match root_kind {
        RootKind::GraphRoot => crate::plan::StepKind::GraphRoot,
        RootKind::EventFlowRoot => crate::plan::StepKind::EventFlowRoot,
    };
    if current.detail.kind() == target {
        return Some(current);
    }

    if let Some(find) = context.find_root_override {
        if let Some(root_id) = find(&current.id, root_kind) {
            if let Some(root) = context.tree.get(&root_id) {
                return Some(root);
            }
        }
    }
    if let Some(root) = context.tree.nearest_ancestor_of_kind(&current.id, root_kind) {
        return Some(root);
    }
    Some(current)
}

fn resolve_by_priority<'a>(context: &CurrentTaskContext<'a>) -> Option<&'a TaskNode> {
    // 1) 视图选中项
    if !context.selected_id.is_empty() {
        if let Some(candidate) = context.tree.get(context.selected_id) {
            return Some(candidate);
        }
    }

    // 2) 显式跟踪的 current_id
    if !context.current_id.is_empty() {
        if let Some(candidate) = context.tree.get(context.current_id) {
            return Some(candidate);
        }
    }

    // 3) 明细快照全量匹配
    if let Some(detail) = context.last_detail {
        if let Some(candidate) = context.tree.iter().find(|n| &n.detail == detail) {
            return Some(candidate);
        }
    }

    None
}
