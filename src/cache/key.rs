//! 内容寻址缓存键：对键排序后的 JSON 做 SHA-256，十六进制编码
//!
//! 两组逻辑相同的参数（仅构造顺序不同）总是得到同一个摘要。嵌套对象同样逐层排序。

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// 参数摘要
pub fn hash_params(params: &Value) -> String {
    let canonical = canonicalize(params);
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// 规范化：对象按键排序重建，数组保持原顺序
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// 规范化后的 JSON 文本（写入 query_params 列）
pub fn canonical_json(params: &Value) -> String {
    canonicalize(params).to_string()
}
