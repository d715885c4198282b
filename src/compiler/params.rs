use serde_json::Value;

use crate::compiler::edge_lookup::EdgeLookup;
use crate::graph::{GraphNode, SignalBinding, is_internal_constant_key};
use crate::plan::{DynamicPortMode, ParamEntry, TaskDetail};

/// 判断某个输入常量值是否应当跳过参数配置步骤。
///
/// 规则：
/// - JSON null 与文本 "None"/"none"（大小写不敏感、两端空白忽略）
///   都视为“端口留空”的占位值；
/// - 布尔常量无论真假一律保留，由任务清单显式生成配置步骤。
pub fn should_skip_constant_value(value: &Value) -> bool {
    if value.is_boolean() {
        return false;
    }
    if value.is_null() {
        return true;
    }
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string().trim().to_string(),
    };
    text.eq_ignore_ascii_case("none")
}

/// 从节点的输入常量中收集需要配置的参数（一个节点合并成一条步骤的 payload）。
///
/// 过滤：内部簿记键（稳定 ID 提示及其旧单下划线变体）、信号名/结构体名端口、
/// "none" 占位值、已有数据连线的输入端口。
pub fn collect_constant_params(
    node: &GraphNode,
    edge_lookup: Option<&EdgeLookup<'_>>,
) -> Vec<ParamEntry> {
    let mut payload = Vec::new();
    for (key, value) in &node.input_constants {
        if is_internal_constant_key(key) {
            continue;
        }
        if should_skip_constant_value(value) {
            continue;
        }
        if let Some(lookup) = edge_lookup {
            if lookup.input_has_data_edge(&node.id, key) {
                continue;
            }
        }
        payload.push(ParamEntry {
            param_name: key.clone(),
            param_value: value.clone(),
            expected_type: None,
        });
    }
    payload
}

/// 为信号发送节点的参数补充期望类型（来自信号定义的参数类型表）。
pub fn annotate_expected_types(payload: &mut [ParamEntry], binding: &SignalBinding) {
    for entry in payload.iter_mut() {
        if entry.expected_type.is_some() {
            continue;
        }
        if let Some(expected) = binding.param_types.get(&entry.param_name) {
            entry.expected_type = Some(expected.clone());
        }
    }
}

/// 构建“设置端口类型”步骤的 payload；空 payload 表示不生成该步骤。
///
/// 只覆盖泛型家族端口：
/// - 全部泛型输出；
/// - 非字典类泛型输入；
/// - 字典类泛型输入（端口名含“字典”）仅当常量 payload 里已有示例值时才参与，
///   避免对上游已确定类型的端口重复发出设置指引。
pub fn build_port_types_payload(node: &GraphNode, params_payload: &[ParamEntry]) -> Vec<ParamEntry> {
    let generic_inputs = node.generic_input_names();
    let generic_outputs = node.generic_output_names();
    if generic_inputs.is_empty() && generic_outputs.is_empty() {
        return Vec::new();
    }

    let mut payload: Vec<ParamEntry> = Vec::new();
    let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();

    // 常量 payload 里出现过的泛型端口先进，保留示例值
    for entry in params_payload {
        let name = entry.param_name.as_str();
        let is_generic = generic_inputs.contains(&name) || generic_outputs.contains(&name);
        if !is_generic || seen.contains(name) {
            continue;
        }
        payload.push(entry.clone());
        seen.insert(name);
    }

    for &name in &generic_outputs {
        if seen.insert(name) {
            payload.push(ParamEntry {
                param_name: name.to_string(),
                param_value: Value::String(String::new()),
                expected_type: None,
            });
        }
    }

    for &name in &generic_inputs {
        if seen.contains(name) {
            continue;
        }
        // 未显式声明的字典类输入不补齐，类型由上游字典构造决定
        if name.contains("字典") {
            continue;
        }
        seen.insert(name);
        payload.push(ParamEntry {
            param_name: name.to_string(),
            param_value: Value::String(String::new()),
            expected_type: None,
        });
    }

    payload
}

/// 动态端口步骤的明细（若节点声明了可变元/字典/分支行为）。
pub fn dynamic_ports_detail(node: &GraphNode) -> Option<TaskDetail> {
    let behavior = node.dynamic_ports.as_ref()?;
    let (mode, ports) = match behavior {
        crate::graph::DynamicPortBehavior::VariadicInputs { ports } => {
            (DynamicPortMode::VariadicInputs, ports.clone())
        }
        crate::graph::DynamicPortBehavior::DictPairs { pairs } => {
            (DynamicPortMode::DictPairs, pairs.clone())
        }
        crate::graph::DynamicPortBehavior::BranchOutputs { outputs } => {
            (DynamicPortMode::BranchOutputs, outputs.clone())
        }
    };
    if ports.is_empty() {
        return None;
    }
    Some(TaskDetail::AddDynamicPorts {
        node_id: node.id.clone(),
        node_title: node.title.clone(),
        mode,
        ports,
    })
}

/// 分支节点附带的“配置分支输出”步骤明细。
pub fn branch_outputs_detail(node: &GraphNode) -> Option<TaskDetail> {
    match node.dynamic_ports.as_ref()? {
        crate::graph::DynamicPortBehavior::BranchOutputs { outputs } if !outputs.is_empty() => {
            Some(TaskDetail::ConfigBranchOutputs {
                node_id: node.id.clone(),
                node_title: node.title.clone(),
                outputs: outputs.clone(),
            })
        }
        _ => None,
    }
}
