pub mod builder;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 内部常量键：语义推导的稳定 ID，不对应真实端口，任务清单必须跳过。
pub const SIGNAL_ID_HINT_CONSTANT_KEY: &str = "__signal_id";
pub const STRUCT_ID_HINT_CONSTANT_KEY: &str = "__struct_id";
/// 兼容旧数据：历史上曾用单下划线存储稳定 ID。
pub const LEGACY_SIGNAL_ID_CONSTANT_KEY: &str = "_signal_id";
pub const LEGACY_STRUCT_ID_CONSTANT_KEY: &str = "_struct_id";
/// 信号/结构体的“选择端口”由专门的绑定步骤负责，不生成参数配置步骤。
pub const SIGNAL_NAME_PORT_NAME: &str = "信号名";
pub const STRUCT_NAME_PORT_NAME: &str = "结构体名";

/// 外部只读的节点图文档。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphModel {
    pub graph_id: String,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    /// 图的局部变量（变量名 -> 初始值）。
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    /// node_id -> 信号绑定。
    #[serde(default)]
    pub signal_bindings: BTreeMap<String, SignalBinding>,
    /// node_id -> 结构体绑定。
    #[serde(default)]
    pub struct_bindings: BTreeMap<String, StructBinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub category: String,
    /// 引用的复合子图 ID；为空表示普通节点。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_id: Option<String>,
    /// 输入端口上的常量值（端口名 -> 值文本/布尔等）。
    #[serde(default)]
    pub input_constants: BTreeMap<String, Value>,
    #[serde(default)]
    pub inputs: Vec<PortDecl>,
    #[serde(default)]
    pub outputs: Vec<PortDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_ports: Option<DynamicPortBehavior>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortDecl {
    pub name: String,
    #[serde(default)]
    pub port_type: String,
    /// 泛型端口需要在编辑器里显式设置类型。
    #[serde(default)]
    pub generic: bool,
    /// 是否是控制流端口（而非数据端口）。
    #[serde(default)]
    pub flow: bool,
}

/// 可变元端口行为：决定“添加动态端口”步骤的形态。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DynamicPortBehavior {
    VariadicInputs { ports: Vec<String> },
    DictPairs { pairs: Vec<String> },
    BranchOutputs { outputs: Vec<String> },
}

impl DynamicPortBehavior {
    pub fn is_branch_outputs(&self) -> bool {
        matches!(self, DynamicPortBehavior::BranchOutputs { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEdge {
    pub id: String,
    pub src_node: String,
    pub src_port: String,
    pub dst_node: String,
    pub dst_port: String,
    /// true 为控制流边，false 为数据边。
    #[serde(default)]
    pub is_flow: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalBinding {
    pub signal_id: String,
    pub signal_name: String,
    /// 是否在当前图/包内本地定义。
    #[serde(default)]
    pub local: bool,
    /// 信号参数名 -> 期望类型，用于补充参数步骤的 expected_type。
    #[serde(default)]
    pub param_types: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructBinding {
    pub struct_id: String,
    pub struct_name: String,
    #[serde(default)]
    pub local: bool,
}

impl GraphModel {
    pub fn node(&self, node_id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// 事件流入口：有出向控制流边、且没有入向控制流边的节点（按声明顺序）。
    pub fn flow_entry_nodes(&self) -> Vec<&GraphNode> {
        let mut has_incoming = std::collections::HashSet::new();
        let mut has_outgoing = std::collections::HashSet::new();
        for edge in &self.edges {
            if edge.is_flow {
                has_incoming.insert(edge.dst_node.as_str());
                has_outgoing.insert(edge.src_node.as_str());
            }
        }
        self.nodes
            .iter()
            .filter(|n| has_outgoing.contains(n.id.as_str()) && !has_incoming.contains(n.id.as_str()))
            .collect()
    }
}

impl GraphNode {
    /// 纯数据节点：没有任何控制流端口，连线时随用随建。
    pub fn is_pure_data(&self) -> bool {
        !self.inputs.iter().chain(self.outputs.iter()).any(|p| p.flow)
    }

    pub fn is_branching(&self) -> bool {
        self.dynamic_ports
            .as_ref()
            .map(|b| b.is_branch_outputs())
            .unwrap_or(false)
    }

    pub fn generic_input_names(&self) -> Vec<&str> {
        self.inputs
            .iter()
            .filter(|p| p.generic && !p.flow)
            .map(|p| p.name.as_str())
            .collect()
    }

    pub fn generic_output_names(&self) -> Vec<&str> {
        self.outputs
            .iter()
            .filter(|p| p.generic && !p.flow)
            .map(|p| p.name.as_str())
            .collect()
    }
}

/// 判断常量键是否属于“不应暴露给任务清单”的内部键。
pub fn is_internal_constant_key(key: &str) -> bool {
    matches!(
        key,
        SIGNAL_ID_HINT_CONSTANT_KEY
            | STRUCT_ID_HINT_CONSTANT_KEY
            | LEGACY_SIGNAL_ID_CONSTANT_KEY
            | LEGACY_STRUCT_ID_CONSTANT_KEY
            | SIGNAL_NAME_PORT_NAME
            | STRUCT_NAME_PORT_NAME
    ) || key.is_empty()
}
