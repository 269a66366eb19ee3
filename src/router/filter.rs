use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::{is_truthy, Variables};

/// 没有任何激活过滤变量时的签名。
///
/// 注意：真实变量值渲染出来的签名理论上也可能恰好等于该字面量，此时两者共用一个 Collection。
pub const DEFAULT_SIGNATURE: &str = "default";

pub type LocalReduceFn<T> = Arc<dyn Fn(Vec<T>, &Value) -> Vec<T> + Send + Sync>;

/// 过滤描述：变量名 + 可选的条目字段（ad hoc 匹配用）+ 可选的本地归约函数。
pub struct FilterSpec<T> {
    pub var: String,
    pub key: Option<String>,
    pub local: Option<LocalReduceFn<T>>,
}

impl<T> Clone for FilterSpec<T> {
    fn clone(&self) -> Self {
        Self {
            var: self.var.clone(),
            key: self.key.clone(),
            local: self.local.clone(),
        }
    }
}

impl<T> fmt::Debug for FilterSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterSpec")
            .field("var", &self.var)
            .field("key", &self.key)
            .field("local", &self.local.is_some())
            .finish()
    }
}

impl<T> FilterSpec<T> {
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            key: None,
            local: None,
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn local(mut self, f: impl Fn(Vec<T>, &Value) -> Vec<T> + Send + Sync + 'static) -> Self {
        self.local = Some(Arc::new(f));
        self
    }

    pub fn is_local(&self) -> bool {
        self.local.is_some()
    }
}

/// 规范签名：只取过滤变量中 truthy 的那些，按名字排序，渲染为 `name=JSON(value)` 并以 `&` 连接。
pub fn filter_signature<T>(filters: &[FilterSpec<T>], vars: &Variables) -> String {
    let active: BTreeMap<&str, &Value> = filters
        .iter()
        .filter_map(|f| {
            vars.get(&f.var)
                .filter(|v| is_truthy(v))
                .map(|v| (f.var.as_str(), v))
        })
        .collect();

    if active.is_empty() {
        return DEFAULT_SIGNATURE.to_string();
    }

    active
        .into_iter()
        .map(|(name, v)| format!("{}={}", name, v))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filters(names: &[&str]) -> Vec<FilterSpec<()>> {
        names.iter().map(|n| FilterSpec::new(*n)).collect()
    }

    #[test]
    fn signature_quotes_json_values() {
        let f = filters(&["status"]);
        let vars = Variables::new().with("status", "done");
        assert_eq!(filter_signature(&f, &vars), r#"status="done""#);
    }

    #[test]
    fn falsy_or_missing_filters_give_default() {
        let f = filters(&["status", "owner"]);
        let vars = Variables::new().with("status", Value::Null).with("owner", "");
        assert_eq!(filter_signature(&f, &vars), DEFAULT_SIGNATURE);
        assert_eq!(filter_signature(&f, &Variables::new()), DEFAULT_SIGNATURE);
    }

    #[test]
    fn signature_is_sorted_and_ignores_non_filter_vars() {
        let f = filters(&["status", "owner"]);
        let vars = Variables::new()
            .with("status", "open")
            .with("owner", 7)
            .with("search", "ignored")
            .with("tags", json!(["a", "b"]));
        assert_eq!(
            filter_signature(&f, &vars),
            r#"owner=7&status="open""#
        );
    }

    #[test]
    fn duplicate_descriptors_render_once() {
        let f = filters(&["status", "status"]);
        let vars = Variables::new().with("status", true);
        assert_eq!(filter_signature(&f, &vars), "status=true");
    }
}
