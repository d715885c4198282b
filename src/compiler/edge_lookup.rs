use std::collections::{HashMap, HashSet};

use crate::graph::{GraphEdge, GraphModel};

/// 每次编译重建的边索引视图，从不持久化。
///
/// 以 (node_id, port_name) 为键聚合落在该输入端口上的边，
/// 并单独记录控制流边的 id 集合（其余是数据边）。
#[derive(Debug, Default)]
pub struct EdgeLookup<'g> {
    pub input_edges: HashMap<(String, String), Vec<&'g GraphEdge>>,
    pub flow_edge_ids: HashSet<String>,
}

impl<'g> EdgeLookup<'g> {
    pub fn build(model: &'g GraphModel) -> Self {
        let mut lookup = EdgeLookup::default();
        for edge in &model.edges {
            lookup
                .input_edges
                .entry((edge.dst_node.clone(), edge.dst_port.clone()))
                .or_default()
                .push(edge);
            if edge.is_flow {
                lookup.flow_edge_ids.insert(edge.id.clone());
            }
        }
        lookup
    }

    /// 该输入端口是否已被数据线占用（同一端口不再生成“配置常量”步骤）。
    pub fn input_has_data_edge(&self, node_id: &str, port_name: &str) -> bool {
        self.input_edges
            .get(&(node_id.to_string(), port_name.to_string()))
            .map(|edges| edges.iter().any(|e| !self.flow_edge_ids.contains(&e.id)))
            .unwrap_or(false)
    }

    /// 节点的出向控制流边，按声明顺序。
    pub fn flow_edges_from(&self, model: &'g GraphModel, node_id: &str) -> Vec<&'g GraphEdge> {
        model
            .edges
            .iter()
            .filter(|e| e.is_flow && e.src_node == node_id)
            .collect()
    }

    /// 节点的入向数据边，按声明顺序。
    pub fn data_edges_into(&self, model: &'g GraphModel, node_id: &str) -> Vec<&'g GraphEdge> {
        model
            .edges
            .iter()
            .filter(|e| !e.is_flow && e.dst_node == node_id)
            .collect()
    }
}
