use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::compiler::edge_lookup::EdgeLookup;
use crate::compiler::params::{
    annotate_expected_types, branch_outputs_detail, collect_constant_params,
    dynamic_ports_detail, build_port_types_payload,
};
use crate::graph::{GraphModel, GraphNode};
use crate::plan::TaskDetail;

/// 事件流里的一条待生成步骤（id 由上层编译器拼接）。
#[derive(Debug, Clone)]
pub struct FlowStep {
    /// 在事件流根 id 下的稳定后缀，保证重复编译产出相同 id。
    pub slug: String,
    pub title: String,
    pub description: String,
    pub target_id: String,
    pub detail: TaskDetail,
}

/// 单个事件流的步骤规划产物。
///
/// `deferred` 是延迟插入的分支端口步骤：编译器在主序列之后统一冲刷，
/// 不依赖任何共享可变缓冲。
#[derive(Debug, Default)]
pub struct FlowPlan {
    pub steps: Vec<FlowStep>,
    pub deferred: Vec<FlowStep>,
}

/// 事件流步骤规划器：沿控制流边广度优先展开一个入口的动作链。
///
/// 创建/连线的合并规则（正反两个独立触发的对称情形）：
/// - 正向：经由“已创建前驱”的边第一次到达某节点时，创建与连线合成一步；
/// - 反向：发现“已创建后继”的未创建前驱时，同样合成一步；
/// - 两端都已创建的边退化为纯连线，且同一有序节点对的连续连线合并进 pairs。
pub struct FlowStepBuilder<'g> {
    model: &'g GraphModel,
    lookup: &'g EdgeLookup<'g>,
    /// 整图范围内已创建节点集合：跨事件流共享，节点只创建一次。
    created: &'g mut HashSet<String>,
}

impl<'g> FlowStepBuilder<'g> {
    pub fn new(
        model: &'g GraphModel,
        lookup: &'g EdgeLookup<'g>,
        created: &'g mut HashSet<String>,
    ) -> Self {
        Self { model, lookup, created }
    }

    pub fn build_flow(&mut self, entry: &GraphNode) -> FlowPlan {
        let mut plan = FlowPlan::default();
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut visited_edges: HashSet<String> = HashSet::new();

        if self.created.insert(entry.id.clone()) {
            self.emit_create_plain(&mut plan, entry);
            self.emit_node_config_steps(&mut plan, entry);
            self.connect_outgoing_data(&mut plan, entry, &mut visited_edges);
        }
        queue.push_back(entry.id.clone());

        while let Some(current_id) = queue.pop_front() {
            let Some(current) = self.model.node(&current_id) else {
                continue;
            };

            // 反向情形：当前节点已规划，但还有未创建的控制流前驱
            for edge in self
                .model
                .edges
                .iter()
                .filter(|e| e.is_flow && e.dst_node == current_id)
            {
                if self.created.contains(&edge.src_node) {
                    continue;
                }
                if !visited_edges.insert(edge.id.clone()) {
                    continue;
                }
                let Some(src) = self.model.node(&edge.src_node) else {
                    continue;
                };
                self.created.insert(src.id.clone());
                plan.steps.push(FlowStep {
                    slug: format!("create_rev:{}", src.id),
                    title: format!("创建并接回节点：{}", src.title),
                    description: format!(
                        "创建节点“{}”，并把它的“{}”接到“{}”的“{}”上",
                        src.title, edge.src_port, current.title, edge.dst_port
                    ),
                    target_id: src.id.clone(),
                    detail: TaskDetail::CreateAndConnectReverse {
                        node_id: src.id.clone(),
                        node_title: src.title.clone(),
                        dst_node_id: current.id.clone(),
                        src_port: edge.src_port.clone(),
                        dst_port: edge.dst_port.clone(),
                    },
                });
                self.emit_node_config_steps(&mut plan, src);
                self.connect_outgoing_data(&mut plan, src, &mut visited_edges);
                queue.push_back(src.id.clone());
            }

            // 正向推进：当前节点的出向控制流边
            for edge in self.lookup.flow_edges_from(self.model, &current_id) {
                if !visited_edges.insert(edge.id.clone()) {
                    continue;
                }
                let Some(dst) = self.model.node(&edge.dst_node) else {
                    continue;
                };
                if !self.created.contains(&dst.id) {
                    self.created.insert(dst.id.clone());
                    if dst.is_branching() {
                        // 分支节点独立创建，保持 branch_node_id 语义；到达边退化为连线
                        self.emit_create_plain(&mut plan, dst);
                        self.push_connect(&mut plan, edge.id.as_str(), current, dst, edge.src_port.as_str(), edge.dst_port.as_str());
                    } else {
                        plan.steps.push(FlowStep {
                            slug: format!("create:{}", dst.id),
                            title: format!("创建并连接节点：{}", dst.title),
                            description: format!(
                                "创建节点“{}”，并从“{}”的“{}”连到它的“{}”",
                                dst.title, current.title, edge.src_port, edge.dst_port
                            ),
                            target_id: dst.id.clone(),
                            detail: TaskDetail::CreateAndConnect {
                                node_id: dst.id.clone(),
                                node_title: dst.title.clone(),
                                src_node_id: current.id.clone(),
                                src_port: edge.src_port.clone(),
                                dst_port: edge.dst_port.clone(),
                            },
                        });
                    }
                    self.emit_node_config_steps(&mut plan, dst);
                    self.connect_outgoing_data(&mut plan, dst, &mut visited_edges);
                    queue.push_back(dst.id.clone());
                } else {
                    self.push_connect(&mut plan, edge.id.as_str(), current, dst, edge.src_port.as_str(), edge.dst_port.as_str());
                }
            }

            // 数据侧：已创建节点之间的数据线，以及纯数据源的随用随建
            for edge in self.lookup.data_edges_into(self.model, &current_id) {
                if !visited_edges.insert(edge.id.clone()) {
                    continue;
                }
                let Some(src) = self.model.node(&edge.src_node) else {
                    continue;
                };
                if self.created.contains(&src.id) {
                    self.push_connect(&mut plan, edge.id.as_str(), src, current, edge.src_port.as_str(), edge.dst_port.as_str());
                } else if src.is_pure_data() {
                    self.created.insert(src.id.clone());
                    plan.steps.push(FlowStep {
                        slug: format!("create_data:{}", src.id),
                        title: format!("创建数据节点并连线：{}", src.title),
                        description: format!(
                            "创建数据节点“{}”，并把“{}”接到“{}”的“{}”上",
                            src.title, edge.src_port, current.title, edge.dst_port
                        ),
                        target_id: src.id.clone(),
                        detail: TaskDetail::CreateAndConnectData {
                            data_node_id: src.id.clone(),
                            node_title: src.title.clone(),
                            dst_node_id: current.id.clone(),
                            src_port: edge.src_port.clone(),
                            dst_port: edge.dst_port.clone(),
                        },
                    });
                    self.emit_node_config_steps(&mut plan, src);
                } else {
                    // 非纯数据的前驱迟早会被某条控制流创建；把这条边留给那次访问
                    visited_edges.remove(&edge.id);
                }
            }
        }

        debug!(
            entry = %entry.id,
            steps = plan.steps.len(),
            deferred = plan.deferred.len(),
            "event flow planned"
        );
        plan
    }

    fn emit_create_plain(&self, plan: &mut FlowPlan, node: &GraphNode) {
        if node.is_branching() {
            let outputs = match node.dynamic_ports.as_ref() {
                Some(crate::graph::DynamicPortBehavior::BranchOutputs { outputs }) => outputs.clone(),
                _ => Vec::new(),
            };
            plan.steps.push(FlowStep {
                slug: format!("create:{}", node.id),
                title: format!("创建分支节点：{}", node.title),
                description: format!("在编辑器中创建分支节点“{}”", node.title),
                target_id: node.id.clone(),
                detail: TaskDetail::CreateBranchNode {
                    branch_node_id: node.id.clone(),
                    node_title: node.title.clone(),
                    outputs,
                },
            });
        } else {
            plan.steps.push(FlowStep {
                slug: format!("create:{}", node.id),
                title: format!("创建节点：{}", node.title),
                description: format!("在编辑器中创建节点“{}”", node.title),
                target_id: node.id.clone(),
                detail: TaskDetail::CreateNode {
                    node_id: node.id.clone(),
                    node_title: node.title.clone(),
                    category: node.category.clone(),
                },
            });
        }
    }

    /// 新节点创建后，把它指向“已创建目标”的数据线补成连线步骤。
    fn connect_outgoing_data(
        &self,
        plan: &mut FlowPlan,
        node: &GraphNode,
        visited_edges: &mut HashSet<String>,
    ) {
        for edge in self
            .model
            .edges
            .iter()
            .filter(|e| !e.is_flow && e.src_node == node.id)
        {
            if !self.created.contains(&edge.dst_node) {
                continue;
            }
            if !visited_edges.insert(edge.id.clone()) {
                continue;
            }
            if let Some(dst) = self.model.node(&edge.dst_node) {
                self.push_connect(plan, edge.id.as_str(), node, dst, edge.src_port.as_str(), edge.dst_port.as_str());
            }
        }
    }

    /// 纯连线步骤；同一有序节点对的连续连线合并进上一步的 pairs。
    fn push_connect(
        &self,
        plan: &mut FlowPlan,
        edge_id: &str,
        src: &GraphNode,
        dst: &GraphNode,
        src_port: &str,
        dst_port: &str,
    ) {
        if let Some(last) = plan.steps.last_mut() {
            if let TaskDetail::Connect { src_node_id, dst_node_id, pairs } = &mut last.detail {
                if src_node_id == &src.id && dst_node_id == &dst.id {
                    pairs.push((src_port.to_string(), dst_port.to_string()));
                    last.title = format!("连接节点：{} → {}（{} 组端口）", src.title, dst.title, pairs.len());
                    return;
                }
            }
        }
        plan.steps.push(FlowStep {
            slug: format!("connect:{edge_id}"),
            title: format!("连接节点：{} → {}", src.title, dst.title),
            description: format!(
                "把“{}”的“{}”连到“{}”的“{}”",
                src.title, src_port, dst.title, dst_port
            ),
            target_id: dst.id.clone(),
            detail: TaskDetail::Connect {
                src_node_id: src.id.clone(),
                dst_node_id: dst.id.clone(),
                pairs: vec![(src_port.to_string(), dst_port.to_string())],
            },
        });
    }

    /// 节点创建后的配置步骤：合并参数 → 动态端口（分支步骤延迟）→ 端口类型 → 信号/结构体绑定。
    fn emit_node_config_steps(&self, plan: &mut FlowPlan, node: &GraphNode) {
        let signal_binding = self.model.signal_bindings.get(&node.id);

        let mut params_payload = collect_constant_params(node, Some(self.lookup));
        if let Some(binding) = signal_binding {
            annotate_expected_types(&mut params_payload, binding);
        }
        if !params_payload.is_empty() {
            plan.steps.push(FlowStep {
                slug: format!("params:{}", node.id),
                title: format!("配置节点参数：{}", node.title),
                description: format!("为“{}”填写 {} 项常量输入", node.title, params_payload.len()),
                target_id: node.id.clone(),
                detail: TaskDetail::ConfigParams {
                    node_id: node.id.clone(),
                    node_title: node.title.clone(),
                    params: params_payload.clone(),
                },
            });
        }

        if let Some(detail) = dynamic_ports_detail(node) {
            let step = FlowStep {
                slug: format!("ports:{}", node.id),
                title: format!("添加动态端口：{}", node.title),
                description: format!("为“{}”补齐声明的动态端口", node.title),
                target_id: node.id.clone(),
                detail,
            };
            if node.is_branching() {
                // 分支端口步骤延迟到流末尾冲刷，等所有分支连线就位
                plan.deferred.push(step);
                if let Some(config_detail) = branch_outputs_detail(node) {
                    plan.deferred.push(FlowStep {
                        slug: format!("branch_cfg:{}", node.id),
                        title: format!("配置分支输出：{}", node.title),
                        description: format!("为“{}”逐一命名分支输出", node.title),
                        target_id: node.id.clone(),
                        detail: config_detail,
                    });
                }
            } else {
                plan.steps.push(step);
            }
        }

        // 信号节点的端口类型完全由信号定义决定，不生成类型步骤
        if signal_binding.is_none() {
            let types_payload = build_port_types_payload(node, &params_payload);
            if !types_payload.is_empty() {
                plan.steps.push(FlowStep {
                    slug: format!("types:{}", node.id),
                    title: format!("设置端口类型：{}", node.title),
                    description: format!("为“{}”的泛型端口显式设置类型", node.title),
                    target_id: node.id.clone(),
                    detail: TaskDetail::SetPortTypes {
                        node_id: node.id.clone(),
                        node_title: node.title.clone(),
                        params: types_payload,
                    },
                });
            }
        }

        if let Some(binding) = signal_binding {
            plan.steps.push(FlowStep {
                slug: format!("signal:{}", node.id),
                title: format!("绑定信号：{}", binding.signal_name),
                description: format!("把节点“{}”绑定到信号“{}”", node.title, binding.signal_name),
                target_id: node.id.clone(),
                detail: TaskDetail::BindSignal {
                    node_id: node.id.clone(),
                    signal_id: binding.signal_id.clone(),
                    signal_name: binding.signal_name.clone(),
                },
            });
        }

        if let Some(binding) = self.model.struct_bindings.get(&node.id) {
            plan.steps.push(FlowStep {
                slug: format!("struct:{}", node.id),
                title: format!("绑定结构体：{}", binding.struct_name),
                description: format!("把节点“{}”绑定到结构体“{}”", node.title, binding.struct_name),
                target_id: node.id.clone(),
                detail: TaskDetail::BindStruct {
                    node_id: node.id.clone(),
                    struct_id: binding.struct_id.clone(),
                    struct_name: binding.struct_name.clone(),
                },
            });
        }
    }
}
