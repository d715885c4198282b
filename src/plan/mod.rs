use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 一条需要配置的参数明细（端口名 + 常量值，可选期望类型）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamEntry {
    pub param_name: String,
    pub param_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_type: Option<String>,
}

/// 信号概览里的一行：信号定义及其在图中的使用情况。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalUsage {
    pub signal_id: String,
    pub signal_name: String,
    pub usage_count: usize,
    pub local: bool,
}

/// 任务明细：标识这一条任务对应的具体动作。
///
/// 封闭的 tagged union —— 解析器 / 规划器 / 渲染层都对它做穷尽匹配，
/// 不允许散落的字符串前缀判断。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskDetail {
    Root,
    Category {
        name: String,
    },
    GraphRoot {
        graph_id: String,
        graph_name: String,
        task_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        graph_data_key: Option<String>,
    },
    EventFlowRoot {
        graph_id: String,
        entry_node_id: String,
        graph_root_task_id: String,
    },
    CompositeStep {
        composite_id: String,
        composite_name: String,
    },
    GraphVariables {
        variables: Vec<ParamEntry>,
    },
    SignalsOverview {
        graph_id: String,
        signals: Vec<SignalUsage>,
    },
    CreateNode {
        node_id: String,
        node_title: String,
        category: String,
    },
    CreateBranchNode {
        branch_node_id: String,
        node_title: String,
        outputs: Vec<String>,
    },
    /// 创建新节点并把它接到已规划的前驱上（正向发现）。
    CreateAndConnect {
        node_id: String,
        node_title: String,
        src_node_id: String,
        src_port: String,
        dst_port: String,
    },
    /// 创建新节点并把它接到已规划的后继上（反向发现的对称情形）。
    CreateAndConnectReverse {
        node_id: String,
        node_title: String,
        dst_node_id: String,
        src_port: String,
        dst_port: String,
    },
    /// 创建纯数据节点并接上数据线。
    CreateAndConnectData {
        data_node_id: String,
        node_title: String,
        dst_node_id: String,
        src_port: String,
        dst_port: String,
    },
    /// 同一对节点间的连线；合并形式在 pairs 里携带多组端口对。
    Connect {
        src_node_id: String,
        dst_node_id: String,
        pairs: Vec<(String, String)>,
    },
    /// 一个节点的全部常量输入合并成一条配置步骤。
    ConfigParams {
        node_id: String,
        node_title: String,
        params: Vec<ParamEntry>,
    },
    AddDynamicPorts {
        node_id: String,
        node_title: String,
        mode: DynamicPortMode,
        ports: Vec<String>,
    },
    ConfigBranchOutputs {
        node_id: String,
        node_title: String,
        outputs: Vec<String>,
    },
    SetPortTypes {
        node_id: String,
        node_title: String,
        params: Vec<ParamEntry>,
    },
    BindSignal {
        node_id: String,
        signal_id: String,
        signal_name: String,
    },
    BindStruct {
        node_id: String,
        struct_id: String,
        struct_name: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DynamicPortMode {
    VariadicInputs,
    DictPairs,
    BranchOutputs,
}

/// `TaskDetail` 的无字段镜像，用于规则集与错误报文。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Root,
    Category,
    GraphRoot,
    EventFlowRoot,
    CompositeStep,
    GraphVariables,
    SignalsOverview,
    CreateNode,
    CreateBranchNode,
    CreateAndConnect,
    CreateAndConnectReverse,
    CreateAndConnectData,
    Connect,
    ConfigParams,
    AddDynamicPorts,
    ConfigBranchOutputs,
    SetPortTypes,
    BindSignal,
    BindStruct,
}

/// 根回溯的目标类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    GraphRoot,
    EventFlowRoot,
}

impl TaskDetail {
    pub fn kind(&self) -> StepKind {
        match self {
            TaskDetail::Root => StepKind::Root,
            TaskDetail::Category { .. } => StepKind::Category,
            TaskDetail::GraphRoot { .. } => StepKind::GraphRoot,
            TaskDetail::EventFlowRoot { .. } => StepKind::EventFlowRoot,
            TaskDetail::CompositeStep { .. } => StepKind::CompositeStep,
            TaskDetail::GraphVariables { .. } => StepKind::GraphVariables,
            TaskDetail::SignalsOverview { .. } => StepKind::SignalsOverview,
            TaskDetail::CreateNode { .. } => StepKind::CreateNode,
            TaskDetail::CreateBranchNode { .. } => StepKind::CreateBranchNode,
            TaskDetail::CreateAndConnect { .. } => StepKind::CreateAndConnect,
            TaskDetail::CreateAndConnectReverse { .. } => StepKind::CreateAndConnectReverse,
            TaskDetail::CreateAndConnectData { .. } => StepKind::CreateAndConnectData,
            TaskDetail::Connect { .. } => StepKind::Connect,
            TaskDetail::ConfigParams { .. } => StepKind::ConfigParams,
            TaskDetail::AddDynamicPorts { .. } => StepKind::AddDynamicPorts,
            TaskDetail::ConfigBranchOutputs { .. } => StepKind::ConfigBranchOutputs,
            TaskDetail::SetPortTypes { .. } => StepKind::SetPortTypes,
            TaskDetail::BindSignal { .. } => StepKind::BindSignal,
            TaskDetail::BindStruct { .. } => StepKind::BindStruct,
        }
    }

    /// 图中关联的 graph_id（若有）。
    pub fn graph_id(&self) -> Option<&str> {
        match self {
            TaskDetail::GraphRoot { graph_id, .. }
            | TaskDetail::EventFlowRoot { graph_id, .. }
            | TaskDetail::SignalsOverview { graph_id, .. } => Some(graph_id),
            _ => None,
        }
    }

    /// “新创建节点”的元素 ID，识别回填按这个字段与可见节点集求交。
    pub fn created_element_id(&self) -> Option<&str> {
        match self {
            TaskDetail::CreateNode { node_id, .. } => Some(node_id),
            TaskDetail::CreateAndConnect { node_id, .. } => Some(node_id),
            TaskDetail::CreateAndConnectReverse { node_id, .. } => Some(node_id),
            TaskDetail::CreateAndConnectData { data_node_id, .. } => Some(data_node_id),
            TaskDetail::CreateBranchNode { branch_node_id, .. } => Some(branch_node_id),
            _ => None,
        }
    }
}

impl StepKind {
    /// 容器类节点：即使没有孩子也不算叶子步骤。
    pub fn is_root_like(&self) -> bool {
        matches!(
            self,
            StepKind::Root
                | StepKind::Category
                | StepKind::GraphRoot
                | StepKind::EventFlowRoot
                | StepKind::CompositeStep
        )
    }

    /// 单步执行支持的步骤类型集合。
    pub fn is_executable(&self) -> bool {
        matches!(
            self,
            StepKind::CreateNode
                | StepKind::CreateBranchNode
                | StepKind::CreateAndConnect
                | StepKind::CreateAndConnectReverse
                | StepKind::CreateAndConnectData
                | StepKind::Connect
                | StepKind::ConfigParams
                | StepKind::AddDynamicPorts
                | StepKind::ConfigBranchOutputs
                | StepKind::SetPortTypes
                | StepKind::BindSignal
                | StepKind::BindStruct
        )
    }

    /// 识别回填允许自动勾选的类型：效果在屏幕上可见的创建/连线/端口步骤。
    /// 参数、类型、绑定类步骤无法凭截图核实，留给用户手动确认。
    pub fn is_auto_checkable(&self) -> bool {
        matches!(
            self,
            StepKind::CreateNode
                | StepKind::CreateBranchNode
                | StepKind::CreateAndConnect
                | StepKind::CreateAndConnectReverse
                | StepKind::CreateAndConnectData
                | StepKind::Connect
                | StepKind::AddDynamicPorts
        )
    }
}

/// 步骤的运行期状态（编译不重置已有状态）。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StepState {
    #[serde(default)]
    pub status: StepStatus,
    /// 会话级勾选（识别回填写这里，不直接动持久化的 completed 表）。
    #[serde(default)]
    pub checked: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed {
        #[serde(default)]
        reason: String,
    },
    Skipped {
        reason: crate::runtime::SkipReason,
    },
}

/// 层级任务树中的一个节点：要么是分组，要么是一条原子的手工复刻动作。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskNode {
    pub id: String,
    pub title: String,
    pub description: String,
    pub level: u8,
    pub parent_id: String,
    pub children: Vec<String>,
    pub task_type: String,
    pub target_id: String,
    pub detail: TaskDetail,
    #[serde(default)]
    pub state: StepState,
}

impl TaskNode {
    /// 叶子步骤：没有孩子，且明细不是容器类。
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty() && !self.detail.kind().is_root_like()
    }
}

/// 任务树：id -> TaskNode 的稳定槽位 map + 有序根列表 + 外部持久化的完成表。
///
/// 结构性更新走 `upsert`：已存在的 id 只覆盖字段、不换槽位，
/// 这样外部持有的 id（tooltip、选中态）在重编译后依然有效。
/// 整棵树的删除只发生在 `clear` 全量重建里。
#[derive(Debug, Default, Clone)]
pub struct TaskTree {
    nodes: HashMap<String, TaskNode>,
    pub roots: Vec<String>,
    pub completed: HashMap<String, bool>,
}

impl TaskTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TaskNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.values()
    }

    /// 插入或原位更新：保留运行期状态，覆盖其余全部字段。
    pub fn upsert(&mut self, node: TaskNode) {
        match self.nodes.get_mut(&node.id) {
            Some(existing) => {
                existing.title = node.title;
                existing.description = node.description;
                existing.level = node.level;
                existing.parent_id = node.parent_id;
                existing.children = node.children;
                existing.task_type = node.task_type;
                existing.target_id = node.target_id;
                existing.detail = node.detail;
                // state 不动：重编译不得抹掉运行中的状态
            }
            None => {
                self.nodes.insert(node.id.clone(), node);
            }
        }
    }

    pub fn add_root(&mut self, id: &str) {
        if !self.roots.iter().any(|r| r == id) {
            self.roots.push(id.to_string());
        }
    }

    /// 全量重建前的清空（唯一的删除路径）。
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        // completed 表是外部持久化的，由宿主决定何时丢弃
    }

    /// 所有“孩子引用指向不存在 id”的 (owner, missing) 对。
    /// 非空意味着必须整树重建。
    pub fn dangling_children(&self) -> Vec<(String, String)> {
        let mut dangling = Vec::new();
        for node in self.nodes.values() {
            for child_id in &node.children {
                if !self.nodes.contains_key(child_id) {
                    dangling.push((node.id.clone(), child_id.clone()));
                }
            }
        }
        dangling
    }

    /// 深度优先按声明顺序展平某个子树下的全部叶子步骤。
    pub fn flatten_leaves(&self, root_id: &str) -> Vec<String> {
        let mut leaves = Vec::new();
        self.collect_leaves(root_id, &mut leaves);
        leaves
    }

    fn collect_leaves(&self, id: &str, out: &mut Vec<String>) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if node.is_leaf() {
            out.push(node.id.clone());
            return;
        }
        for child_id in &node.children {
            self.collect_leaves(child_id, out);
        }
    }

    /// 沿 parent_id 链向上找最近的指定类型祖先（带环路保护）。
    pub fn nearest_ancestor_of_kind(&self, id: &str, kind: RootKind) -> Option<&TaskNode> {
        let target = match kind {
            RootKind::GraphRoot => StepKind::GraphRoot,
            RootKind::EventFlowRoot => StepKind::EventFlowRoot,
        };
        let mut cursor = self.nodes.get(id)?;
        if cursor.detail.kind() == target {
            return Some(cursor);
        }
        let mut visited = std::collections::HashSet::new();
        loop {
            let parent_id = cursor.parent_id.as_str();
            if parent_id.is_empty() || !visited.insert(parent_id.to_string()) {
                return None;
            }
            let parent = self.nodes.get(parent_id)?;
            if parent.detail.kind() == target {
                return Some(parent);
            }
            cursor = parent;
        }
    }

    /// 图根下的事件流根孩子（按声明顺序）。
    pub fn event_flow_children(&self, graph_root_id: &str) -> Vec<&TaskNode> {
        let Some(graph_root) = self.nodes.get(graph_root_id) else {
            return Vec::new();
        };
        graph_root
            .children
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|n| n.detail.kind() == StepKind::EventFlowRoot)
            .collect()
    }

    pub fn mark_completed(&mut self, id: &str, completed: bool) {
        self.completed.insert(id.to_string(), completed);
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.completed.get(id).copied().unwrap_or(false)
    }
}
