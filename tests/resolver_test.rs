use retrace::cache::MemoryDocumentStore;
use retrace::compiler::{CompileContext, TaskPlanCompiler};
use retrace::graph::builder::GraphBuilder;
use retrace::plan::{RootKind, StepKind, TaskDetail, TaskTree};
use retrace::resolver::{CurrentTaskContext, resolve_leaf, resolve_root};

fn compiled_chain() -> (TaskTree, String, Vec<String>) {
    let model = GraphBuilder::new("g-chain")
        .node("A", "事件开始").build()
        .node("B", "打印日志").build()
        .node("C", "结束").build()
        .flow("A", "B")
        .flow("B", "C")
        .build();
    let store = MemoryDocumentStore::new();
    let mut tree = TaskTree::new();
    let output = TaskPlanCompiler::new(&store)
        .compile(&mut tree, &model, &CompileContext::for_parent("t"))
        .unwrap();
    let leaves = tree.flatten_leaves(&output.graph_root_id);
    (tree, output.graph_root_id, leaves)
}

#[test]
fn test_view_selection_beats_all_other_sources() {
    let (tree, _, leaves) = compiled_chain();
    let detail_of_third = tree.get(&leaves[2]).unwrap().detail.clone();
    let callback_target = leaves[1].clone();
    let find = move |_: &str| Some(callback_target.clone());

    let mut context = CurrentTaskContext::new(&tree);
    context.selected_id = &leaves[0];
    context.current_id = &leaves[1];
    context.last_detail = Some(&detail_of_third);
    context.find_first_for_graph = Some(&find);

    let resolved = resolve_leaf(&context).expect("must resolve");
    assert_eq!(resolved.id, leaves[0]);
}

#[test]
fn test_tracked_current_id_when_nothing_selected() {
    let (tree, _, leaves) = compiled_chain();
    let mut context = CurrentTaskContext::new(&tree);
    context.current_id = &leaves[1];

    let resolved = resolve_leaf(&context).expect("must resolve");
    assert_eq!(resolved.id, leaves[1]);
}

#[test]
fn test_stale_ids_fall_through_to_detail_snapshot() {
    let (tree, _, leaves) = compiled_chain();
    let detail = tree.get(&leaves[2]).unwrap().detail.clone();

    let mut context = CurrentTaskContext::new(&tree);
    // 清单刷新后旧 id 均已失效
    context.selected_id = "gone:1";
    context.current_id = "gone:2";
    context.last_detail = Some(&detail);

    let resolved = resolve_leaf(&context).expect("must resolve");
    assert_eq!(resolved.id, leaves[2]);
}

#[test]
fn test_graph_id_callback_is_last_resort() {
    let (tree, _, leaves) = compiled_chain();
    // 全量匹配不可能命中的明细，但 graph_id 仍然有效
    let stale_detail = TaskDetail::EventFlowRoot {
        graph_id: "g-chain".to_string(),
        entry_node_id: "deleted-entry".to_string(),
        graph_root_task_id: String::new(),
    };
    let first_leaf = leaves[0].clone();
    let find = move |graph_id: &str| {
        assert_eq!(graph_id, "g-chain");
        Some(first_leaf.clone())
    };

    let mut context = CurrentTaskContext::new(&tree);
    context.last_detail = Some(&stale_detail);
    context.find_first_for_graph = Some(&find);

    let resolved = resolve_leaf(&context).expect("must resolve");
    assert_eq!(resolved.id, leaves[0]);
}

#[test]
fn test_resolve_leaf_none_when_no_source_available() {
    let (tree, _, _) = compiled_chain();
    let context = CurrentTaskContext::new(&tree);
    assert!(resolve_leaf(&context).is_none());
}

#[test]
fn test_resolve_root_walks_parent_chain() {
    let (tree, graph_root_id, leaves) = compiled_chain();
    let mut context = CurrentTaskContext::new(&tree);
    context.selected_id = &leaves[1];

    let flow_root = resolve_root(&context, RootKind::EventFlowRoot).unwrap();
    assert_eq!(flow_root.detail.kind(), StepKind::EventFlowRoot);

    let graph_root = resolve_root(&context, RootKind::GraphRoot).unwrap();
    assert_eq!(graph_root.id, graph_root_id);
}

#[test]
fn test_resolve_root_override_takes_precedence_over_walk() {
    let (tree, graph_root_id, leaves) = compiled_chain();
    let override_target = graph_root_id.clone();
    let find_root = move |_: &str, _: RootKind| Some(override_target.clone());

    let mut context = CurrentTaskContext::new(&tree);
    context.selected_id = &leaves[0];
    context.find_root_override = Some(&find_root);

    // 宿主回调说了算，即使父链上能找到事件流根
    let resolved = resolve_root(&context, RootKind::EventFlowRoot).unwrap();
    assert_eq!(resolved.id, graph_root_id);
}

#[test]
fn test_resolve_root_falls_back_to_resolved_node() {
    let (tree, graph_root_id, _) = compiled_chain();
    let mut context = CurrentTaskContext::new(&tree);
    context.selected_id = &graph_root_id;

    // 图根向上找不到事件流根；回溯失败时原样返回命中节点
    let resolved = resolve_root(&context, RootKind::EventFlowRoot).unwrap();
    assert_eq!(resolved.id, graph_root_id);
}
