use retrace::cache::MemoryDocumentStore;
use retrace::compiler::{CompileContext, TaskPlanCompiler};
use retrace::graph::builder::GraphBuilder;
use retrace::plan::{StepKind, StepStatus, TaskTree};

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
fn test_linear_chain_compiles_to_three_leaves() {
    let store = MemoryDocumentStore::new();
    let mut tree = TaskTree::new();
    let output = TaskPlanCompiler::new(&store)
        .compile(&mut tree, &chain_graph(), &CompileContext::for_parent("t"))
        .expect("compile failed");

    let leaves = tree.flatten_leaves(&output.graph_root_id);
    assert_eq!(leaves.len(), 3, "A→B→C must compile to exactly 3 leaves");

    let kinds: Vec<StepKind> = leaves
        .iter()
        .map(|id| tree.get(id).unwrap().detail.kind())
        .collect();
    assert_eq!(
        kinds,
        vec![
            StepKind::CreateNode,
            StepKind::CreateAndConnect,
            StepKind::CreateAndConnect,
        ],
        "connections merge into create-and-connect, never separate connect steps"
    );
}

#[test]
fn test_recompile_identical_input_is_deterministic() {
    let store = MemoryDocumentStore::new();
    let model = chain_graph();
    let context = CompileContext::for_parent("t");
    let compiler = TaskPlanCompiler::new(&store);

    let mut tree_a = TaskTree::new();
    let out_a = compiler.compile(&mut tree_a, &model, &context).unwrap();
    let mut tree_b = TaskTree::new();
    let out_b = compiler.compile(&mut tree_b, &model, &context).unwrap();

    assert_eq!(out_a.root_ids, out_b.root_ids);
    assert_eq!(out_a.graph_root_id, out_b.graph_root_id);
    assert_eq!(out_a.created_ids, out_b.created_ids);
    for id in &out_a.created_ids {
        assert_eq!(tree_a.get(id), tree_b.get(id), "node {id} differs between passes");
    }
}

#[test]
fn test_recompile_mutates_nodes_in_place_and_keeps_state() {
    let store = MemoryDocumentStore::new();
    let model = chain_graph();
    let context = CompileContext::for_parent("t");
    let compiler = TaskPlanCompiler::new(&store);

    let mut tree = TaskTree::new();
    let output = compiler.compile(&mut tree, &model, &context).unwrap();
    let step_id = tree.flatten_leaves(&output.graph_root_id)[1].clone();
    tree.get_mut(&step_id).unwrap().state.status = StepStatus::Running;

    compiler.compile(&mut tree, &model, &context).unwrap();

    let step = tree.get(&step_id).expect("identity must survive recompilation");
    assert_eq!(step.state.status, StepStatus::Running, "runtime state must not be reset");
    assert!(tree.dangling_children().is_empty());
}

#[test]
fn test_dangling_child_reference_forces_full_rebuild() {
    let store = MemoryDocumentStore::new();
    let model = chain_graph();
    let context = CompileContext::for_parent("t");
    let compiler = TaskPlanCompiler::new(&store);

    let mut tree = TaskTree::new();
    let output = compiler.compile(&mut tree, &model, &context).unwrap();

    // 外部持久化层坏掉时可能出现指向不存在 id 的孩子引用
    tree.get_mut(&output.graph_root_id)
        .unwrap()
        .children
        .push("ghost:id".to_string());
    assert!(!tree.dangling_children().is_empty());

    compiler.compile(&mut tree, &model, &context).unwrap();

    assert!(tree.dangling_children().is_empty());
    let root = tree.get(&output.graph_root_id).unwrap();
    assert!(!root.children.iter().any(|id| id == "ghost:id"));
    assert_eq!(tree.len(), output.created_ids.len());
}

#[test]
fn test_param_step_filters_internal_keys_and_none_placeholder() {
    let model = GraphBuilder::new("g-params")
        .node("n1", "设置目标")
        .constant("__signal_id", "x")
        .constant("信号名", "y")
        .constant("目标", "none")
        .constant("开关", "False")
        .build()
        .node("n2", "结束").build()
        .flow("n1", "n2")
        .build();

    let store = MemoryDocumentStore::new();
    let mut tree = TaskTree::new();
    let output = TaskPlanCompiler::new(&store)
        .compile(&mut tree, &model, &CompileContext::for_parent("t"))
        .unwrap();

    let leaves = tree.flatten_leaves(&output.graph_root_id);
    let params_step = leaves
        .iter()
        .filter_map(|id| tree.get(id))
        .find(|n| n.detail.kind() == StepKind::ConfigParams)
        .expect("param step missing");
    let retrace::plan::TaskDetail::ConfigParams { params, .. } = &params_step.detail else {
        unreachable!();
    };
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].param_name, "开关");
    assert_eq!(params[0].param_value, serde_json::json!("False"));
}

#[test]
fn test_null_constant_treated_as_unconnected() {
    let model = GraphBuilder::new("g-null")
        .node("n1", "设置目标")
        .constant("目标", serde_json::Value::Null)
        .constant("开关", "False")
        .build()
        .node("n2", "结束").build()
        .flow("n1", "n2")
        .build();

    let store = MemoryDocumentStore::new();
    let mut tree = TaskTree::new();
    let output = TaskPlanCompiler::new(&store)
        .compile(&mut tree, &model, &CompileContext::for_parent("t"))
        .unwrap();

    let params = tree
        .flatten_leaves(&output.graph_root_id)
        .iter()
        .filter_map(|id| tree.get(id).cloned())
        .find_map(|n| match n.detail {
            retrace::plan::TaskDetail::ConfigParams { params, .. } => Some(params),
            _ => None,
        })
        .expect("param step missing");
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].param_name, "开关");
}

#[test]
fn test_boolean_constants_kept_regardless_of_value() {
    let model = GraphBuilder::new("g-bool")
        .node("n1", "开关节点")
        .constant("启用", false)
        .constant("可见", true)
        .build()
        .node("n2", "结束").build()
        .flow("n1", "n2")
        .build();

    let store = MemoryDocumentStore::new();
    let mut tree = TaskTree::new();
    let output = TaskPlanCompiler::new(&store)
        .compile(&mut tree, &model, &CompileContext::for_parent("t"))
        .unwrap();

    let params = tree
        .flatten_leaves(&output.graph_root_id)
        .iter()
        .filter_map(|id| tree.get(id).cloned())
        .find_map(|n| match n.detail {
            retrace::plan::TaskDetail::ConfigParams { params, .. } => Some(params),
            _ => None,
        })
        .expect("param step missing");
    assert_eq!(params.len(), 2);
}

#[test]
fn test_composite_cycle_aborts_without_partial_tree() {
    // c1 的子图再次引用 c1，构成自引用环
    let mut store = MemoryDocumentStore::new();
    store.insert(
        GraphBuilder::new("c1")
            .node("inner", "再入复合").composite("c1").build()
            .node("inner2", "结束").build()
            .flow("inner", "inner2")
            .build(),
    );
    let model = GraphBuilder::new("g-cycle")
        .node("n1", "引用复合").composite("c1").build()
        .node("n2", "结束").build()
        .flow("n1", "n2")
        .build();

    let mut tree = TaskTree::new();
    let result = TaskPlanCompiler::new(&store).compile(&mut tree, &model, &CompileContext::for_parent("t"));
    assert!(matches!(
        result,
        Err(retrace::error::ConfigurationError::CompositeCycle { .. })
    ));
    assert!(tree.is_empty(), "fatal compile errors must not commit a partial tree");
}

#[test]
fn test_unresolved_composite_is_fatal() {
    let store = MemoryDocumentStore::new();
    let model = GraphBuilder::new("g-missing")
        .node("n1", "引用复合").composite("ghost").build()
        .node("n2", "结束").build()
        .flow("n1", "n2")
        .build();

    let mut tree = TaskTree::new();
    let result = TaskPlanCompiler::new(&store).compile(&mut tree, &model, &CompileContext::for_parent("t"));
    assert!(matches!(
        result,
        Err(retrace::error::ConfigurationError::UnresolvedComposite { .. })
    ));
    assert!(tree.is_empty());
}

#[test]
fn test_composite_compiles_nested_subtree() {
    let mut store = MemoryDocumentStore::new();
    store.insert(
        GraphBuilder::new("c-move")
            .node("m1", "移动开始").build()
            .node("m2", "移动结束").build()
            .flow("m1", "m2")
            .build(),
    );
    let model = GraphBuilder::new("g-comp")
        .node("n1", "调用移动").composite("c-move").build()
        .node("n2", "结束").build()
        .flow("n1", "n2")
        .build();

    let mut tree = TaskTree::new();
    let output = TaskPlanCompiler::new(&store)
        .compile(&mut tree, &model, &CompileContext::for_parent("t"))
        .unwrap();

    // 复合步骤根在前，图根最后
    assert_eq!(output.root_ids.len(), 2);
    let composite_root = tree.get(&output.root_ids[0]).unwrap();
    assert_eq!(composite_root.detail.kind(), StepKind::CompositeStep);
    assert!(!composite_root.children.is_empty());
    assert!(tree.dangling_children().is_empty());
}

#[test]
fn test_variables_and_signals_summary_nodes() {
    let model = GraphBuilder::new("g-sum")
        .var("计数", 0)
        .node("n1", "发送信号").build()
        .node("n2", "发送信号").build()
        .node("n3", "结束").build()
        .flow("n1", "n2")
        .flow("n2", "n3")
        .bind_signal("n1", "sig-1", "受到攻击", true)
        .bind_signal("n2", "sig-1", "受到攻击", true)
        .build();

    let store = MemoryDocumentStore::new();
    let mut tree = TaskTree::new();
    let output = TaskPlanCompiler::new(&store)
        .compile(&mut tree, &model, &CompileContext::for_parent("t"))
        .unwrap();

    let root = tree.get(&output.graph_root_id).unwrap();
    let child_kinds: Vec<StepKind> = root
        .children
        .iter()
        .map(|id| tree.get(id).unwrap().detail.kind())
        .collect();
    assert!(child_kinds.contains(&StepKind::GraphVariables));
    assert!(child_kinds.contains(&StepKind::SignalsOverview));

    let signals = root
        .children
        .iter()
        .filter_map(|id| tree.get(id))
        .find_map(|n| match &n.detail {
            retrace::plan::TaskDetail::SignalsOverview { signals, .. } => Some(signals.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].usage_count, 2);
    assert!(signals[0].local);

    // 绑定节点还各自有一条绑定信号步骤
    let bind_steps = tree
        .flatten_leaves(&output.graph_root_id)
        .iter()
        .filter(|id| tree.get(id).unwrap().detail.kind() == StepKind::BindSignal)
        .count();
    assert_eq!(bind_steps, 2);
}

#[test]
fn test_branch_steps_deferred_to_flow_end() {
    let model = GraphBuilder::new("g-branch")
        .node("e", "事件开始").build()
        .node("br", "条件分支")
        .flow_output("分支A")
        .flow_output("分支B")
        .branch_outputs(&["分支A", "分支B"])
        .build()
        .node("x", "走A").build()
        .node("y", "走B").build()
        .flow("e", "br")
        .flow_ports("br", "分支A", "x", "流入")
        .flow_ports("br", "分支B", "y", "流入")
        .build();

    let store = MemoryDocumentStore::new();
    let mut tree = TaskTree::new();
    let output = TaskPlanCompiler::new(&store)
        .compile(&mut tree, &model, &CompileContext::for_parent("t"))
        .unwrap();

    let root = tree.get(&output.graph_root_id).unwrap();
    let flow_id = root
        .children
        .iter()
        .find(|id| tree.get(id).unwrap().detail.kind() == StepKind::EventFlowRoot)
        .unwrap();
    let kinds: Vec<StepKind> = tree
        .get(flow_id)
        .unwrap()
        .children
        .iter()
        .map(|id| tree.get(id).unwrap().detail.kind())
        .collect();

    assert!(kinds.contains(&StepKind::CreateBranchNode));
    // 延迟冲刷：分支端口两步排在流的最后
    assert_eq!(
        &kinds[kinds.len() - 2..],
        &[StepKind::AddDynamicPorts, StepKind::ConfigBranchOutputs]
    );
}

#[test]
fn test_data_source_merges_into_create_and_connect_data() {
    let model = GraphBuilder::new("g-data")
        .node("n1", "移动到").input("目标", "vector").build()
        .node("n2", "结束").build()
        .data_node("v1", "获取变量").build()
        .flow("n1", "n2")
        .data("v1", "值", "n1", "目标")
        .build();

    let store = MemoryDocumentStore::new();
    let mut tree = TaskTree::new();
    let output = TaskPlanCompiler::new(&store)
        .compile(&mut tree, &model, &CompileContext::for_parent("t"))
        .unwrap();

    let kinds: Vec<StepKind> = tree
        .flatten_leaves(&output.graph_root_id)
        .iter()
        .map(|id| tree.get(id).unwrap().detail.kind())
        .collect();
    assert!(kinds.contains(&StepKind::CreateAndConnectData));
}

#[test]
fn test_data_edge_suppresses_constant_param() {
    // “目标”端口既有常量又有数据线：连线赢，常量不再生成配置步骤
    let model = GraphBuilder::new("g-shadow")
        .node("n1", "移动到")
        .input("目标", "vector")
        .constant("目标", "(0,0)")
        .build()
        .node("n2", "结束").build()
        .data_node("v1", "获取变量").build()
        .flow("n1", "n2")
        .data("v1", "值", "n1", "目标")
        .build();

    let store = MemoryDocumentStore::new();
    let mut tree = TaskTree::new();
    let output = TaskPlanCompiler::new(&store)
        .compile(&mut tree, &model, &CompileContext::for_parent("t"))
        .unwrap();

    let has_param_step = tree
        .flatten_leaves(&output.graph_root_id)
        .iter()
        .any(|id| tree.get(id).unwrap().detail.kind() == StepKind::ConfigParams);
    assert!(!has_param_step);
}

#[test]
fn test_set_port_types_covers_generic_family_only() {
    let model = GraphBuilder::new("g-types")
        .node("n1", "以键查询字典值")
        .generic_input("键")
        .generic_input("字典输入")
        .generic_output("值")
        .build()
        .node("n2", "结束").build()
        .flow("n1", "n2")
        .build();

    let store = MemoryDocumentStore::new();
    let mut tree = TaskTree::new();
    let output = TaskPlanCompiler::new(&store)
        .compile(&mut tree, &model, &CompileContext::for_parent("t"))
        .unwrap();

    let params = tree
        .flatten_leaves(&output.graph_root_id)
        .iter()
        .filter_map(|id| tree.get(id).cloned())
        .find_map(|n| match n.detail {
            retrace::plan::TaskDetail::SetPortTypes { params, .. } => Some(params),
            _ => None,
        })
        .expect("type step missing");

    let names: Vec<&str> = params.iter().map(|p| p.param_name.as_str()).collect();
    assert!(names.contains(&"值"), "generic outputs always included");
    assert!(names.contains(&"键"), "non-dict generic inputs included");
    assert!(
        !names.contains(&"字典输入"),
        "dict-style generic inputs without an example constant stay out"
    );
}

#[test]
fn test_dict_generic_input_with_example_constant_included() {
    let model = GraphBuilder::new("g-types2")
        .node("n1", "以键查询字典值")
        .generic_input("字典输入")
        .constant("字典输入", "{\"a\":1}")
        .build()
        .node("n2", "结束").build()
        .flow("n1", "n2")
        .build();

    let store = MemoryDocumentStore::new();
    let mut tree = TaskTree::new();
    let output = TaskPlanCompiler::new(&store)
        .compile(&mut tree, &model, &CompileContext::for_parent("t"))
        .unwrap();

    let params = tree
        .flatten_leaves(&output.graph_root_id)
        .iter()
        .filter_map(|id| tree.get(id).cloned())
        .find_map(|n| match n.detail {
            retrace::plan::TaskDetail::SetPortTypes { params, .. } => Some(params),
            _ => None,
        })
        .expect("type step missing");
    assert!(params.iter().any(|p| p.param_name == "字典输入"));
}

#[test]
fn test_signal_send_params_annotated_with_expected_types() {
    let model = GraphBuilder::new("g-sig")
        .node("n1", "发送信号")
        .constant("伤害", "10")
        .build()
        .node("n2", "结束").build()
        .flow("n1", "n2")
        .bind_signal_with_types("n1", "sig-1", "受到攻击", &[("伤害", "数值")])
        .build();

    let store = MemoryDocumentStore::new();
    let mut tree = TaskTree::new();
    let output = TaskPlanCompiler::new(&store)
        .compile(&mut tree, &model, &CompileContext::for_parent("t"))
        .unwrap();

    let params = tree
        .flatten_leaves(&output.graph_root_id)
        .iter()
        .filter_map(|id| tree.get(id).cloned())
        .find_map(|n| match n.detail {
            retrace::plan::TaskDetail::ConfigParams { params, .. } => Some(params),
            _ => None,
        })
        .expect("param step missing");
    assert_eq!(params[0].expected_type.as_deref(), Some("数值"));
}

#[test]
fn test_missing_parent_id_is_configuration_error() {
    let store = MemoryDocumentStore::new();
    let mut tree = TaskTree::new();
    let context = CompileContext::for_parent("");
    let result = TaskPlanCompiler::new(&store).compile(&mut tree, &chain_graph(), &context);
    assert!(matches!(
        result,
        Err(retrace::error::ConfigurationError::MissingContext { .. })
    ));
}
