use std::fs;
use std::path::Path;

use anyhow::{Context as AnyhowContext, Result};

use crate::graph::GraphModel;

pub fn load_graph_from_yaml(file_path: &str) -> Result<GraphModel> {
    let yaml_content = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read graph file from {}", file_path))?;

    let model: GraphModel = serde_yaml::from_str(&yaml_content)
        .with_context(|| format!("Failed to deserialize graph document from {}", file_path))?;

    Ok(model)
}

/// 按扩展名选择反序列化格式（.json 走 serde_json，其余按 YAML 处理）。
pub fn load_graph_from_path(path: &Path) -> Result<GraphModel> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read graph file from {}", path.display()))?;

    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let model: GraphModel = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to deserialize graph document from {}", path.display()))?
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to deserialize graph document from {}", path.display()))?
    };

    Ok(model)
}
