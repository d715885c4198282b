use retrace::cache::MemoryDocumentStore;
use retrace::compiler::{CompileContext, TaskPlanCompiler};
use retrace::graph::builder::GraphBuilder;
use retrace::plan::{StepState, TaskDetail, TaskNode, TaskTree};
use retrace::planner::{
    plan_event_flow, plan_from_step, plan_remaining_flows, plan_single_step, plan_whole_graph,
};
use retrace::resolver::CurrentTaskContext;

fn compile(model: &retrace::graph::GraphModel) -> (TaskTree, String) {
    let store = MemoryDocumentStore::new();
    let mut tree = TaskTree::new();
    let output = TaskPlanCompiler::new(&store)
        .compile(&mut tree, model, &CompileContext::for_parent("t"))
        .unwrap();
    (tree, output.graph_root_id)
}

fn two_flow_graph() -> retrace::graph::GraphModel {
    GraphBuilder::new("g-two")
        .node("e1", "入口一").build()
        .node("a", "动作A").build()
        .node("e2", "入口二").build()
        .node("b", "动作B").build()
        .flow("e1", "a")
        .flow("e2", "b")
        .build()
}

fn chain_graph() -> retrace::graph::GraphModel {
    GraphBuilder::new("g-chain")
        .node("A", "事件开始").build()
        .node("B", "打印日志").build()
        .node("C", "结束").build()
        .flow("A", "B")
        .flow("B", "C")
        .build()
}

#[test]
fn test_whole_graph_plan_covers_every_flow() {
    let (tree, graph_root_id) = compile(&two_flow_graph());
    let mut context = CurrentTaskContext::new(&tree);
    context.selected_id = &graph_root_id;

    let plan = plan_whole_graph(&context).unwrap();
    assert_eq!(plan.steps.len(), 4);
    assert_eq!(plan.anchor_id, graph_root_id);
    assert_eq!(plan.executable_ids().len(), 4);
}

#[test]
fn test_event_flow_plan_resolves_up_from_leaf() {
    let (tree, graph_root_id) = compile(&two_flow_graph());
    let flows = tree.event_flow_children(&graph_root_id);
    let flow1_id = flows[0].id.clone();
    let flow1_leaves = tree.flatten_leaves(&flow1_id);

    let mut context = CurrentTaskContext::new(&tree);
    context.selected_id = &flow1_leaves[1];

    let plan = plan_event_flow(&context).unwrap();
    assert_eq!(plan.anchor_id, flow1_id);
    assert_eq!(plan.executable_ids(), flow1_leaves.iter().map(String::as_str).collect::<Vec<_>>());
}

#[test]
fn test_remaining_flows_from_first_includes_all() {
    let (tree, graph_root_id) = compile(&two_flow_graph());
    let flows = tree.event_flow_children(&graph_root_id);
    let flow1_id = flows[0].id.clone();

    let mut context = CurrentTaskContext::new(&tree);
    context.selected_id = &flow1_id;

    let plan = plan_remaining_flows(&context).unwrap();
    assert_eq!(plan.steps.len(), 4);
    assert_eq!(plan.anchor_id, flow1_id);
}

#[test]
fn test_remaining_flows_from_second_excludes_earlier() {
    let (tree, graph_root_id) = compile(&two_flow_graph());
    let flows = tree.event_flow_children(&graph_root_id);
    let flow2_id = flows[1].id.clone();
    let flow2_leaves = tree.flatten_leaves(&flow2_id);

    let mut context = CurrentTaskContext::new(&tree);
    context.selected_id = &flow2_id;

    let plan = plan_remaining_flows(&context).unwrap();
    assert_eq!(plan.executable_ids(), flow2_leaves.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(plan.anchor_id, flow2_id);
}

#[test]
fn test_remaining_flows_on_graph_root_starts_at_first_flow() {
    let (tree, graph_root_id) = compile(&two_flow_graph());
    let mut context = CurrentTaskContext::new(&tree);
    context.selected_id = &graph_root_id;

    let plan = plan_remaining_flows(&context).unwrap();
    assert_eq!(plan.steps.len(), 4);
}

#[test]
fn test_remaining_flows_without_any_flows_is_error() {
    let mut tree = TaskTree::new();
    tree.upsert(TaskNode {
        id: "t:graph:empty".to_string(),
        title: "配置节点图：空图".to_string(),
        description: String::new(),
        level: 3,
        parent_id: "t".to_string(),
        children: Vec::new(),
        task_type: "graph".to_string(),
        target_id: "empty".to_string(),
        detail: TaskDetail::GraphRoot {
            graph_id: "empty".to_string(),
            graph_name: "空图".to_string(),
            task_type: "graph".to_string(),
            graph_data_key: None,
        },
        state: StepState::default(),
    });
    tree.add_root("t:graph:empty");

    let mut context = CurrentTaskContext::new(&tree);
    context.selected_id = "t:graph:empty";

    let err = plan_remaining_flows(&context).unwrap_err();
    assert_eq!(err.reason(), "no_event_flows");
}

#[test]
fn test_remaining_flows_detached_flow_is_error() {
    let mut tree = TaskTree::new();
    let graph_root = TaskNode {
        id: "t:graph:g".to_string(),
        title: "配置节点图：G".to_string(),
        description: String::new(),
        level: 3,
        parent_id: "t".to_string(),
        children: vec!["t:graph:g:flow:e2".to_string()],
        task_type: "graph".to_string(),
        target_id: "g".to_string(),
        detail: TaskDetail::GraphRoot {
            graph_id: "g".to_string(),
            graph_name: "G".to_string(),
            task_type: "graph".to_string(),
            graph_data_key: None,
        },
        state: StepState::default(),
    };
    let flow = |entry: &str| TaskNode {
        id: format!("t:graph:g:flow:{entry}"),
        title: format!("搭建事件流：{entry}"),
        description: String::new(),
        level: 4,
        parent_id: "t:graph:g".to_string(),
        children: Vec::new(),
        task_type: "graph".to_string(),
        target_id: entry.to_string(),
        detail: TaskDetail::EventFlowRoot {
            graph_id: "g".to_string(),
            entry_node_id: entry.to_string(),
            graph_root_task_id: "t:graph:g".to_string(),
        },
        state: StepState::default(),
    };
    tree.upsert(graph_root);
    tree.upsert(flow("e1"));
    tree.upsert(flow("e2"));
    tree.add_root("t:graph:g");

    // e1 的流根指回图根，但图根的孩子列表里没有它
    let mut context = CurrentTaskContext::new(&tree);
    context.selected_id = "t:graph:g:flow:e1";

    let err = plan_remaining_flows(&context).unwrap_err();
    assert_eq!(err.reason(), "flow_not_in_graph");
}

#[test]
fn test_plan_from_step_first_element_is_start() {
    let (tree, graph_root_id) = compile(&chain_graph());
    let leaves = tree.flatten_leaves(&graph_root_id);
    let start = leaves[1].clone();

    let plan = plan_from_step(&tree, &start).unwrap();
    assert_eq!(plan.steps[0].task_id, start);
    assert_eq!(plan.steps.len(), 2);
    assert_eq!(plan.anchor_id, start);
}

#[test]
fn test_plan_from_step_unknown_id_is_error() {
    let (tree, _) = compile(&chain_graph());
    let err = plan_from_step(&tree, "gone").unwrap_err();
    assert_eq!(err.reason(), "no_current_task");
}

#[test]
fn test_plan_single_step_rejects_container_kinds() {
    let (tree, graph_root_id) = compile(&chain_graph());
    let flows = tree.event_flow_children(&graph_root_id);
    let flow_root_id = flows[0].id.clone();

    let err = plan_single_step(&tree, &flow_root_id).unwrap_err();
    assert_eq!(err.reason(), "unsupported_type");

    let err = plan_single_step(&tree, &graph_root_id).unwrap_err();
    assert_eq!(err.reason(), "unsupported_type");
}

#[test]
fn test_plan_single_step_keeps_siblings_as_context() {
    let (tree, graph_root_id) = compile(&chain_graph());
    let leaves = tree.flatten_leaves(&graph_root_id);
    let target = leaves[1].clone();

    let plan = plan_single_step(&tree, &target).unwrap();
    assert_eq!(plan.steps.len(), leaves.len());
    assert_eq!(plan.executable_ids(), vec![target.as_str()]);
    assert_eq!(plan.anchor_id, target);

    // 上下文步骤保持原有顺序
    let ids: Vec<&str> = plan.steps.iter().map(|s| s.task_id.as_str()).collect();
    assert_eq!(ids, leaves.iter().map(String::as_str).collect::<Vec<_>>());
}
