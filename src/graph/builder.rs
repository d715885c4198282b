use std::collections::BTreeMap;

use serde_json::Value;

use crate::graph::{
    DynamicPortBehavior, GraphEdge, GraphModel, GraphNode, PortDecl, SignalBinding, StructBinding,
};

pub struct GraphBuilder {
    graph_id: String,
    name: String,
    variables: BTreeMap<String, Value>,
    pub nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    signal_bindings: BTreeMap<String, SignalBinding>,
    struct_bindings: BTreeMap<String, StructBinding>,
    edge_seq: usize,
}

impl GraphBuilder {
    pub fn new(graph_id: &str) -> Self {
        Self {
            graph_id: graph_id.to_string(),
            name: graph_id.to_string(),
            variables: BTreeMap::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            signal_bindings: BTreeMap::new(),
            struct_bindings: BTreeMap::new(),
            edge_seq: 0,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn var(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(key.to_string(), value.into());
        self
    }

    pub fn node(self, id: &str, title: &str) -> NodeBuilder {
        NodeBuilder {
            graph_builder: self,
            node: GraphNode {
                id: id.to_string(),
                title: title.to_string(),
                category: String::new(),
                composite_id: None,
                input_constants: BTreeMap::new(),
                inputs: vec![PortDecl {
                    name: "流入".to_string(),
                    port_type: "flow".to_string(),
                    generic: false,
                    flow: true,
                }],
                outputs: vec![PortDecl {
                    name: "流出".to_string(),
                    port_type: "flow".to_string(),
                    generic: false,
                    flow: true,
                }],
                dynamic_ports: None,
            },
        }
    }

    /// 纯数据节点：没有控制流端口，只提供一个数据输出。
    pub fn data_node(self, id: &str, title: &str) -> NodeBuilder {
        NodeBuilder {
            graph_builder: self,
            node: GraphNode {
                id: id.to_string(),
                title: title.to_string(),
                category: String::new(),
                composite_id: None,
                input_constants: BTreeMap::new(),
                inputs: Vec::new(),
                outputs: vec![PortDecl {
                    name: "值".to_string(),
                    port_type: "any".to_string(),
                    generic: false,
                    flow: false,
                }],
                dynamic_ports: None,
            },
        }
    }

    pub fn bind_signal(mut self, node_id: &str, signal_id: &str, signal_name: &str, local: bool) -> Self {
        self.signal_bindings.insert(
            node_id.to_string(),
            SignalBinding {
                signal_id: signal_id.to_string(),
                signal_name: signal_name.to_string(),
                local,
                param_types: BTreeMap::new(),
            },
        );
        self
    }

    pub fn bind_signal_with_types(
        mut self,
        node_id: &str,
        signal_id: &str,
        signal_name: &str,
        param_types: &[(&str, &str)],
    ) -> Self {
        self.signal_bindings.insert(
            node_id.to_string(),
            SignalBinding {
                signal_id: signal_id.to_string(),
                signal_name: signal_name.to_string(),
                local: true,
                param_types: param_types
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        );
        self
    }

    pub fn bind_struct(mut self, node_id: &str, struct_id: &str, struct_name: &str) -> Self {
        self.struct_bindings.insert(
            node_id.to_string(),
            StructBinding {
                struct_id: struct_id.to_string(),
                struct_name: struct_name.to_string(),
                local: true,
            },
        );
        self
    }

    /// 控制流连线（按调用顺序决定边的声明顺序）。
    pub fn flow(mut self, src: &str, dst: &str) -> Self {
        self.push_edge(src, "流出", dst, "流入", true);
        self
    }

    pub fn flow_ports(mut self, src: &str, src_port: &str, dst: &str, dst_port: &str) -> Self {
        self.push_edge(src, src_port, dst, dst_port, true);
        self
    }

    /// 数据连线。
    pub fn data(mut self, src: &str, src_port: &str, dst: &str, dst_port: &str) -> Self {
        self.push_edge(src, src_port, dst, dst_port, false);
        self
    }

    fn push_edge(&mut self, src: &str, src_port: &str, dst: &str, dst_port: &str, is_flow: bool) {
        self.edge_seq += 1;
        self.edges.push(GraphEdge {
            id: format!("e{}", self.edge_seq),
            src_node: src.to_string(),
            src_port: src_port.to_string(),
            dst_node: dst.to_string(),
            dst_port: dst_port.to_string(),
            is_flow,
        });
    }

    pub fn build(self) -> GraphModel {
        GraphModel {
            graph_id: self.graph_id,
            name: self.name,
            nodes: self.nodes,
            edges: self.edges,
            variables: self.variables,
            signal_bindings: self.signal_bindings,
            struct_bindings: self.struct_bindings,
        }
    }
}

pub struct NodeBuilder {
    graph_builder: GraphBuilder,
    node: GraphNode,
}

impl NodeBuilder {
    pub fn category(mut self, category: &str) -> Self {
        self.node.category = category.to_string();
        self
    }

    pub fn composite(mut self, composite_id: &str) -> Self {
        self.node.composite_id = Some(composite_id.to_string());
        self
    }

    pub fn constant(mut self, port: &str, value: impl Into<Value>) -> Self {
        self.node.input_constants.insert(port.to_string(), value.into());
        self
    }

    pub fn input(mut self, name: &str, port_type: &str) -> Self {
        self.node.inputs.push(PortDecl {
            name: name.to_string(),
            port_type: port_type.to_string(),
            generic: false,
            flow: false,
        });
        self
    }

    pub fn generic_input(mut self, name: &str) -> Self {
        self.node.inputs.push(PortDecl {
            name: name.to_string(),
            port_type: "泛型".to_string(),
            generic: true,
            flow: false,
        });
        self
    }

    pub fn output(mut self, name: &str, port_type: &str) -> Self {
        self.node.outputs.push(PortDecl {
            name: name.to_string(),
            port_type: port_type.to_string(),
            generic: false,
            flow: false,
        });
        self
    }

    pub fn generic_output(mut self, name: &str) -> Self {
        self.node.outputs.push(PortDecl {
            name: name.to_string(),
            port_type: "泛型".to_string(),
            generic: true,
            flow: false,
        });
        self
    }

    pub fn flow_output(mut self, name: &str) -> Self {
        self.node.outputs.push(PortDecl {
            name: name.to_string(),
            port_type: "flow".to_string(),
            generic: false,
            flow: true,
        });
        self
    }

    pub fn variadic_inputs(mut self, ports: &[&str]) -> Self {
        self.node.dynamic_ports = Some(DynamicPortBehavior::VariadicInputs {
            ports: ports.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn dict_pairs(mut self, pairs: &[&str]) -> Self {
        self.node.dynamic_ports = Some(DynamicPortBehavior::DictPairs {
            pairs: pairs.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn branch_outputs(mut self, outputs: &[&str]) -> Self {
        self.node.dynamic_ports = Some(DynamicPortBehavior::BranchOutputs {
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn build(mut self) -> GraphBuilder {
        self.graph_builder.nodes.push(self.node);
        self.graph_builder
    }
}
