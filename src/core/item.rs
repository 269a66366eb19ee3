use serde::{Deserialize, Serialize};
use std::fmt;

/// 条目身份键：数值或字符串。去重与存在性判断的唯一依据。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Num(i64),
    Str(String),
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Num(n) => write!(f, "{}", n),
            ItemId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ItemId {
    fn from(v: i64) -> Self {
        ItemId::Num(v)
    }
}

impl From<i32> for ItemId {
    fn from(v: i32) -> Self {
        ItemId::Num(v as i64)
    }
}

impl From<u32> for ItemId {
    fn from(v: u32) -> Self {
        ItemId::Num(v as i64)
    }
}

impl From<&str> for ItemId {
    fn from(v: &str) -> Self {
        ItemId::Str(v.to_string())
    }
}

impl From<String> for ItemId {
    fn from(v: String) -> Self {
        ItemId::Str(v)
    }
}

/// Collection 管理的记录。
///
/// `field` 供 Router 的 ad hoc 过滤按字段名取值；默认实现走 serde 表示，
/// 热路径上的类型可以自行覆盖以避免整条序列化。
pub trait Item: Clone + Send + Sync + Serialize + 'static {
    fn id(&self) -> ItemId;

    fn field(&self, key: &str) -> Option<serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => map.remove(key),
            _ => None,
        }
    }
}
