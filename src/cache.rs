use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use dashmap::DashMap;
use tracing::debug;

use crate::compiler::loader::load_graph_from_path;
use crate::error::PlanningError;
use crate::graph::GraphModel;

/// 图文档提供方：编译器对复合子图唯一允许的同步挂起点。
/// 实现内部可以自带重试/缓存，这里只看 Option。
pub trait DocumentStore {
    fn get(&self, graph_id: &str) -> Option<GraphModel>;
}

/// 内存文档库，测试与嵌入宿主用。
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: HashMap<String, GraphModel>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, model: GraphModel) {
        self.docs.insert(model.graph_id.clone(), model);
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get(&self, graph_id: &str) -> Option<GraphModel> {
        self.docs.get(graph_id).cloned()
    }
}

/// 目录文档库：`<root>/<graph_id>.yaml`（或 .json）。
pub struct DirDocumentStore {
    root: PathBuf,
}

impl DirDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl DocumentStore for DirDocumentStore {
    fn get(&self, graph_id: &str) -> Option<GraphModel> {
        for ext in ["yaml", "yml", "json"] {
            let path = self.root.join(format!("{graph_id}.{ext}"));
            if path.exists() {
                return load_graph_from_path(&path).ok();
            }
        }
        None
    }
}

/// 图数据负载缓存：两级索引，双轴 O(1) 失效。
///
/// 正向 `root_id -> graph_id -> payload`，反向 `graph_id -> {root_id}`。
/// 键形如 `root_id::graph_id`，由图根明细持有并在重编译时丢弃重建。
#[derive(Default)]
pub struct GraphPayloadCache {
    by_root: DashMap<String, HashMap<String, GraphModel>>,
    by_graph: DashMap<String, HashSet<String>>,
}

impl GraphPayloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, root_id: &str, graph_id: &str, payload: GraphModel) -> String {
        self.by_root
            .entry(root_id.to_string())
            .or_default()
            .insert(graph_id.to_string(), payload);
        self.by_graph
            .entry(graph_id.to_string())
            .or_default()
            .insert(root_id.to_string());
        format!("{root_id}::{graph_id}")
    }

    pub fn resolve(&self, key: &str) -> Option<GraphModel> {
        let (root_id, graph_id) = key.split_once("::")?;
        self.by_root.get(root_id)?.get(graph_id).cloned()
    }

    pub fn get(&self, root_id: &str, graph_id: &str) -> Option<GraphModel> {
        self.by_root.get(root_id)?.get(graph_id).cloned()
    }

    /// 宿主按图根明细里的 key 取负载；取不到时给出可恢复的规划错误，
    /// 由调用方决定提示或静默。
    pub fn resolve_required(&self, key: &str) -> Result<GraphModel, PlanningError> {
        self.resolve(key).ok_or_else(|| PlanningError::GraphDataUnavailable {
            graph_id: key
                .split_once("::")
                .map(|(_, graph_id)| graph_id)
                .unwrap_or(key)
                .to_string(),
        })
    }

    /// 按树根失效（图根重编译前丢弃旧负载）。
    pub fn drop_for_root(&self, root_id: &str) {
        if let Some((_, payloads)) = self.by_root.remove(root_id) {
            for graph_id in payloads.keys() {
                if let Some(mut roots) = self.by_graph.get_mut(graph_id) {
                    roots.remove(root_id);
                }
            }
            debug!(root_id, dropped = payloads.len(), "payload cache dropped by root");
        }
    }

    /// 按图失效（图文档被编辑后，所有引用它的树根条目一起失效）。
    pub fn drop_for_graph(&self, graph_id: &str) {
        if let Some((_, roots)) = self.by_graph.remove(graph_id) {
            for root_id in &roots {
                if let Some(mut payloads) = self.by_root.get_mut(root_id) {
                    payloads.remove(graph_id);
                }
            }
            debug!(graph_id, dropped = roots.len(), "payload cache dropped by graph");
        }
    }

    pub fn clear_all(&self) -> usize {
        let count: usize = self.by_root.iter().map(|e| e.value().len()).sum();
        self.by_root.clear();
        self.by_graph.clear();
        count
    }
}
