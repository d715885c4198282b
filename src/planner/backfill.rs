use std::collections::HashSet;

use tracing::debug;

use crate::plan::TaskTree;

/// 识别回填规划结果：命中的事件流根与索引最大的仍可见创建步骤。
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionProgress {
    pub flow_id: String,
    pub step_id: String,
    pub step_index_in_flow: usize,
}

/// 根据识别到的可见元素与候选事件流，规划“回填到哪一步”。
///
/// 搜索顺序：先看当前选中的事件流（若给定），没命中再按输入顺序
/// 依次检查其余候选流；返回第一个有命中的流里索引最大的匹配步骤。
pub fn plan_backfill(
    tree: &TaskTree,
    visible_ids: &HashSet<String>,
    candidate_flow_ids: &[String],
    selected_flow_id: Option<&str>,
) -> Option<RecognitionProgress> {
    if visible_ids.is_empty() || candidate_flow_ids.is_empty() {
        return None;
    }

    let mut primary: Vec<&str> = Vec::new();
    let mut secondary: Vec<&str> = Vec::new();
    match selected_flow_id {
        Some(selected) => {
            primary.push(selected);
            for flow_id in candidate_flow_ids {
                if flow_id != selected {
                    secondary.push(flow_id);
                }
            }
        }
        None => {
            primary.extend(candidate_flow_ids.iter().map(|s| s.as_str()));
        }
    }

    scan_flows(tree, visible_ids, &primary)
        .or_else(|| scan_flows(tree, visible_ids, &secondary))
}

/// 在给定事件流集合中找“索引最大且创建元素仍可见”的叶子步骤。
fn scan_flows(
    tree: &TaskTree,
    visible_ids: &HashSet<String>,
    flow_ids: &[&str],
) -> Option<RecognitionProgress> {
    let mut best: Option<RecognitionProgress> = None;

    for flow_id in flow_ids {
        let Some(flow) = tree.get(flow_id) else {
            continue;
        };
        for (child_index, child_id) in flow.children.iter().enumerate() {
            let Some(step) = tree.get(child_id) else {
                continue;
            };
            if !step.is_leaf() {
                continue;
            }
            let Some(created_id) = step.detail.created_element_id() else {
                continue;
            };
            if !visible_ids.contains(created_id) {
                continue;
            }
            let better = best
                .as_ref()
                .map(|b| child_index > b.step_index_in_flow)
                .unwrap_or(true);
            if better {
                best = Some(RecognitionProgress {
                    flow_id: flow.id.clone(),
                    step_id: step.id.clone(),
                    step_index_in_flow: child_index,
                });
            }
        }
        // 第一个有命中的流即为结果，不再看后续流
        if best.is_some() {
            break;
        }
    }

    if let Some(progress) = &best {
        debug!(flow = %progress.flow_id, step = %progress.step_id, index = progress.step_index_in_flow, "backfill match");
    }
    best
}

/// 消费回填结果：把命中流里 `[0, index)` 的可自动勾选叶子标记为已完成。
///
/// 默认只改会话态（`state.checked`）；`persist` 显式开启时才写持久化的
/// completed 表。返回被标记的任务 id。
pub fn apply_backfill(
    tree: &mut TaskTree,
    progress: &RecognitionProgress,
    persist: bool,
) -> Vec<String> {
    let Some(flow) = tree.get(&progress.flow_id) else {
        return Vec::new();
    };
    let prefix: Vec<String> = flow
        .children
        .iter()
        .take(progress.step_index_in_flow)
        .cloned()
        .collect();

    let mut marked = Vec::new();
    for child_id in prefix {
        let Some(step) = tree.get_mut(&child_id) else {
            continue;
        };
        if !step.is_leaf() || !step.detail.kind().is_auto_checkable() {
            continue;
        }
        step.state.checked = true;
        marked.push(child_id.clone());
        if persist {
            tree.mark_completed(&child_id, true);
        }
    }
    marked
}
