//! 识别调试落盘：把最近一次原始检测结果输出为 JSON，便于离线复现与分析。
//! 只写不读，本核心从不回读这个文件。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

/// 固定的相对落盘路径（相对缓存根目录）。
pub const SNAPSHOT_RELATIVE_PATH: &str = "debug/last_detection.json";

/// 识别上游给出的一条检测：元素名与编辑器坐标框。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub title: String,
    pub raw_name: String,
    /// [x, y, w, h]
    pub bbox: [i64; 4],
}

/// 把检测快照写到 `<cache_root>/debug/last_detection.json`。
///
/// 键排序、2 空格缩进、UTF-8 且非 ASCII 字符原样保留
/// （serde_json 默认的 BTree 键序与 pretty 缩进恰好满足）。
pub fn write_detection_snapshot(
    cache_root: &Path,
    graph_id: &str,
    detections: &[Detection],
) -> Result<PathBuf> {
    let detections_payload: Vec<Value> = detections
        .iter()
        .map(|d| {
            json!({
                "title": d.title,
                "raw_name": d.raw_name,
                "bbox": d.bbox,
            })
        })
        .collect();
    let payload = json!({
        "graph_id": graph_id,
        "detected_count": detections.len(),
        "detections": detections_payload,
    });

    let path = cache_root.join(SNAPSHOT_RELATIVE_PATH);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create snapshot dir {}", parent.display()))?;
    }
    let text = serde_json::to_string_pretty(&payload)?;
    fs::write(&path, text.as_bytes())
        .with_context(|| format!("Failed to write snapshot to {}", path.display()))?;
    debug!(path = %path.display(), count = detections.len(), "detection snapshot written");
    Ok(path)
}
