use serde::Serialize;
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::variables::Variables;

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// 分页状态：offset = 当前条目数，limit = 页大小。
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PagingState {
    pub offset: usize,
    pub limit: usize,
    /// 分页纪元：reset / refresh 时重置
    pub paging_started: SystemTime,
    pub up_to: Option<SystemTime>,
}

/// 交给 fetch 函数的一次请求：查询变量 ∪ 分页变量。
#[derive(Clone, Debug, PartialEq)]
pub struct FetchRequest {
    pub variables: Variables,
    pub paging: PagingState,
}

impl FetchRequest {
    pub fn offset(&self) -> usize {
        self.paging.offset
    }

    pub fn limit(&self) -> usize {
        self.paging.limit
    }

    /// 扁平化为单个 JSON 对象（分页键覆盖同名查询变量），便于直接拼到远端请求里。
    pub fn to_json(&self) -> Value {
        let mut map = self.variables.as_map().clone();
        map.insert("offset".into(), Value::from(self.paging.offset));
        map.insert("limit".into(), Value::from(self.paging.limit));
        if let Some(up_to) = self.paging.up_to {
            map.insert("up_to".into(), Value::from(unix_millis(up_to)));
        }
        Value::Object(map)
    }
}

pub fn unix_millis(ts: SystemTime) -> u64 {
    match ts.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as u64,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fetch_request_flattens_paging_over_variables() {
        let req = FetchRequest {
            variables: Variables::new().with("status", "open").with("offset", 99),
            paging: PagingState {
                offset: 40,
                limit: 20,
                paging_started: SystemTime::now(),
                up_to: None,
            },
        };
        let v = req.to_json();
        assert_eq!(v["status"], json!("open"));
        assert_eq!(v["offset"], json!(40));
        assert_eq!(v["limit"], json!(20));
        assert!(v.get("up_to").is_none());
    }
}
