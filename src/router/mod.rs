pub mod filter;

pub use filter::*;

use arc_swap::ArcSwap;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::collection::{Collection, CollectionConfig};
use crate::core::{is_truthy, Item, ItemId, Variables};
use crate::error::Result;
use crate::stats::{CollectionReport, RouterReport};

/// 按过滤签名复用 Collection：每个签名一个物理独立的集合，互不混合。
///
/// ## 契约
/// - `"default"` 集合在构造时创建，永不移除；其余集合首次访问时惰性创建，同样不回收。
/// - Router 只通过 `delete_item` 跨集合修改条目，从不触碰它们的分页/加载状态。
/// - 签名表无上限：长会话里过滤组合越多，常驻集合越多。
pub struct CollectionRouter<T: Item, R = T> {
    template: CollectionConfig<T, R>,
    filters: Vec<FilterSpec<T>>,
    variables: ArcSwap<Variables>,
    collections: DashMap<String, Arc<Collection<T, R>>>,
    default: Arc<Collection<T, R>>,
}

impl<T: Item, R: Clone + Send + Sync + 'static> CollectionRouter<T, R> {
    /// `config.variables` 为初始变量集；`no_paging` 对 Router 无效，强制关闭。
    pub fn new(config: CollectionConfig<T, R>, filters: Vec<FilterSpec<T>>) -> Result<Self> {
        let mut template = config;
        template.settings.no_paging = false;
        template.settings.validate()?;

        let variables = template.variables.clone();
        let signature = filter_signature(&filters, &variables);
        let collections = DashMap::new();

        let default = if signature == DEFAULT_SIGNATURE {
            Self::build(&template, variables.clone(), true)?
        } else {
            // 初始签名不是 default：default 集合去掉全部过滤变量，且不自动加载
            let mut unfiltered = variables.clone();
            for f in &filters {
                unfiltered.set(f.var.clone(), Value::Null);
            }
            let active = Self::build(&template, variables.clone(), true)?;
            collections.insert(signature, active);
            Self::build(&template, unfiltered, false)?
        };
        collections.insert(DEFAULT_SIGNATURE.to_string(), default.clone());

        Ok(Self {
            template,
            filters,
            variables: ArcSwap::from_pointee(variables),
            collections,
            default,
        })
    }

    fn build(
        template: &CollectionConfig<T, R>,
        variables: Variables,
        autoload: bool,
    ) -> Result<Arc<Collection<T, R>>> {
        let mut config = template.clone();
        config.variables = variables;
        config.settings.load = config.settings.load && autoload;
        Collection::new(config)
    }

    pub fn name(&self) -> &str {
        &self.template.settings.name
    }

    pub fn filters(&self) -> &[FilterSpec<T>] {
        &self.filters
    }

    pub fn variables(&self) -> Variables {
        Variables::clone(&self.variables.load())
    }

    pub fn filter_signature(&self) -> String {
        filter_signature(&self.filters, &self.variables.load())
    }

    pub fn is_default(&self) -> bool {
        self.filter_signature() == DEFAULT_SIGNATURE
    }

    fn lookup(&self, signature: &str) -> Arc<Collection<T, R>> {
        self.collections
            .get(signature)
            .map(|c| c.value().clone())
            .unwrap_or_else(|| self.default.clone())
    }

    /// 当前签名对应的集合。
    pub fn active_collection(&self) -> Arc<Collection<T, R>> {
        self.lookup(&self.filter_signature())
    }

    pub fn default_collection(&self) -> Arc<Collection<T, R>> {
        self.default.clone()
    }

    pub fn collection(&self, signature: &str) -> Option<Arc<Collection<T, R>>> {
        self.collections.get(signature).map(|c| c.value().clone())
    }

    pub fn signatures(&self) -> Vec<String> {
        let mut sigs: Vec<String> = self.collections.iter().map(|e| e.key().clone()).collect();
        sigs.sort();
        sigs
    }

    /// 合并变量；新签名首次出现时创建集合（继承全部非变量配置），随后对活动集合 `load_if_empty`。
    pub fn update_variables(&self, partial: &Variables) -> Result<Option<JoinHandle<()>>> {
        self.variables.rcu(|cur| {
            let mut next = Variables::clone(cur);
            next.merge(partial);
            next
        });
        let vars = self.variables.load_full();
        let signature = filter_signature(&self.filters, &vars);

        let existing = self.collections.get(&signature).map(|c| c.value().clone());
        let active = match existing {
            Some(c) => c,
            None => {
                // 在分片锁外构造且不自动加载；加载统一由下面的 load_if_empty 发起
                let fresh = Self::build(&self.template, Variables::clone(&vars), false)?;
                match self.collections.entry(signature) {
                    Entry::Occupied(e) => e.get().clone(),
                    Entry::Vacant(e) => {
                        tracing::debug!(
                            "CollectionRouter::{} new collection for {}",
                            self.template.settings.name,
                            e.key()
                        );
                        e.insert(fresh).value().clone()
                    }
                }
            }
        };
        Ok(active.load_if_empty())
    }

    /// 只有本地归约的过滤器处于激活状态（其余过滤器全部未激活）。
    fn is_local_only(&self, vars: &Variables) -> bool {
        self.filters
            .iter()
            .filter(|f| !f.is_local())
            .all(|f| !vars.is_active(&f.var))
    }

    /// 按声明顺序把每个本地归约函数作用到 default 集合的条目上。
    pub fn locally_filtered(&self) -> Vec<T> {
        let vars = self.variables.load();
        self.reduce_locally(&vars)
    }

    fn reduce_locally(&self, vars: &Variables) -> Vec<T> {
        let null = Value::Null;
        self.filters
            .iter()
            .filter_map(|f| f.local.as_ref().map(|reduce| (f, reduce)))
            .fold(self.default.items(), |acc, (f, reduce)| {
                reduce(acc, vars.get(&f.var).unwrap_or(&null))
            })
    }

    /// 活动集合非空时直接返回；否则在非 default 且可完全本地满足时，退化为对 default 集合的本地归约。
    pub fn items(&self) -> Vec<T> {
        let vars = self.variables.load();
        let signature = filter_signature(&self.filters, &vars);
        let items = self.lookup(&signature).items();
        if !items.is_empty() || signature == DEFAULT_SIGNATURE || !self.is_local_only(&vars) {
            return items;
        }
        self.reduce_locally(&vars)
    }

    /// ad hoc 过滤：某个带 `key` 的激活过滤器与条目字段不相等时剔除该条目。
    /// 没有 `key` 的描述不参与匹配。与缓存集合无关，用于过滤外部传入的列表。
    ///
    /// 比较是严格的 `serde_json::Value` 相等：`10` 与 `10.0`、`"10"` 与 `10` 都视为不相等，
    /// 不做任何类型转换。调用方需保证变量与条目字段使用同一种 JSON 表示。
    pub fn apply_filter(&self, items: Vec<T>) -> Vec<T> {
        let vars = self.variables.load();
        items
            .into_iter()
            .filter(|item| {
                !self.filters.iter().any(|f| {
                    let Some(key) = &f.key else {
                        return false;
                    };
                    match vars.get(&f.var) {
                        Some(v) if is_truthy(v) => item.field(key).as_ref() != Some(v),
                        _ => false,
                    }
                })
            })
            .collect()
    }

    /// 从每个已缓存的集合中删除该身份，返回实际删除的集合数。
    pub fn delete_item(&self, id: &ItemId) -> usize {
        self.collections
            .iter()
            .filter(|c| c.value().remove_item(id))
            .count()
    }

    pub fn report(&self) -> RouterReport {
        let active = self.filter_signature();
        let mut collections: Vec<CollectionReport> = self
            .collections
            .iter()
            .map(|e| {
                let c = e.value();
                let status = c.status();
                CollectionReport {
                    signature: e.key().clone(),
                    active: *e.key() == active,
                    items: status.len,
                    groups: status.groups,
                    loading: status.loading,
                    refreshing: status.refreshing,
                    has_more: status.has_more,
                    search_entries: c.search_cache_len(),
                }
            })
            .collect();
        collections.sort_by(|a, b| a.signature.cmp(&b.signature));
        RouterReport {
            name: self.template.settings.name.clone(),
            collections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FetchRequest;
    use futures::FutureExt;
    use serde::Serialize;
    use serde_json::json;
    use std::sync::{OnceLock, Weak};

    #[derive(Clone, Debug, PartialEq, Serialize)]
    struct Ticket {
        id: i64,
        status: &'static str,
        owner: i64,
        starred: bool,
    }

    impl Item for Ticket {
        fn id(&self) -> ItemId {
            self.id.into()
        }
    }

    fn tickets() -> Vec<Ticket> {
        let rows = [
            (1, "open", 10, true),
            (2, "done", 10, false),
            (3, "open", 11, false),
            (4, "done", 11, true),
            (5, "open", 10, true),
            (6, "done", 12, false),
        ];
        rows.iter()
            .map(|&(id, status, owner, starred)| Ticket {
                id,
                status,
                owner,
                starred,
            })
            .collect()
    }

    fn ids_of(items: &[Ticket]) -> Vec<i64> {
        items.iter().map(|t| t.id).collect()
    }

    /// 服务端只认识 `status` 过滤；带 `starred` 的请求永远挂起，模拟慢远端。
    fn server() -> CollectionConfig<Ticket> {
        CollectionConfig::new("tickets", |req: FetchRequest| {
            if req.variables.is_active("starred") {
                return futures::future::pending::<anyhow::Result<Vec<Ticket>>>().boxed();
            }
            let status = req.variables.get("status").cloned().unwrap_or(Value::Null);
            let rows: Vec<Ticket> = tickets()
                .into_iter()
                .filter(|t| !is_truthy(&status) || json!(t.status) == status)
                .skip(req.offset())
                .take(req.limit())
                .collect();
            futures::future::ready(Ok(rows)).boxed()
        })
        .page_size(10)
    }

    fn status_filter() -> FilterSpec<Ticket> {
        FilterSpec::new("status").key("status")
    }

    fn starred_filter() -> FilterSpec<Ticket> {
        FilterSpec::new("starred").local(|items: Vec<Ticket>, v: &Value| {
            if is_truthy(v) {
                items.into_iter().filter(|t| t.starred).collect()
            } else {
                items
            }
        })
    }

    #[test]
    fn signature_tracks_filter_variables() {
        let router =
            CollectionRouter::new(server(), vec![status_filter()]).unwrap();
        assert!(router.is_default());

        router
            .variables
            .store(Arc::new(Variables::new().with("status", "done")));
        assert_eq!(router.filter_signature(), r#"status="done""#);
        assert!(!router.is_default());

        router
            .variables
            .store(Arc::new(Variables::new().with("status", Value::Null)));
        assert_eq!(router.filter_signature(), DEFAULT_SIGNATURE);
    }

    #[tokio::test]
    async fn update_variables_creates_one_collection_per_signature() {
        let router = CollectionRouter::new(server(), vec![status_filter()]).unwrap();
        assert_eq!(router.signatures(), vec![DEFAULT_SIGNATURE.to_string()]);

        router
            .update_variables(&Variables::new().with("status", "done"))
            .unwrap()
            .expect("new collection loads")
            .await
            .unwrap();
        assert_eq!(ids_of(&router.items()), vec![2, 4, 6]);
        let done = router.active_collection();

        // 回到 default：复用已有集合并补一次空加载
        router
            .update_variables(&Variables::new().with("status", Value::Null))
            .unwrap()
            .expect("default is still empty")
            .await
            .unwrap();
        assert_eq!(router.items().len(), 6);

        // 再次切到 done：同一个实例，不再发起加载
        assert!(router
            .update_variables(&Variables::new().with("status", "done"))
            .unwrap()
            .is_none());
        assert!(Arc::ptr_eq(&done, &router.active_collection()));
        assert_eq!(router.signatures().len(), 2);
    }

    #[tokio::test]
    async fn fetch_may_inspect_the_router_while_a_collection_is_created() {
        let slot: Arc<OnceLock<Weak<CollectionRouter<Ticket>>>> = Arc::default();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (s, n) = (slot.clone(), seen.clone());
        let config = CollectionConfig::new("tickets", move |req: FetchRequest| {
            if let Some(router) = s.get().and_then(Weak::upgrade) {
                n.lock().push(router.report().collections.len());
            }
            let status = req.variables.get("status").cloned().unwrap_or(Value::Null);
            let rows: Vec<Ticket> = tickets()
                .into_iter()
                .filter(|t| status.is_null() || status == json!(t.status))
                .collect();
            futures::future::ready(Ok(rows))
        });
        let router = Arc::new(CollectionRouter::new(config, vec![status_filter()]).unwrap());
        slot.set(Arc::downgrade(&router)).unwrap();

        router
            .update_variables(&Variables::new().with("status", "open"))
            .unwrap()
            .expect("new collection loads")
            .await
            .unwrap();
        assert_eq!(*seen.lock(), vec![2]);
        assert_eq!(ids_of(&router.items()), vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn local_only_filter_falls_back_to_default_items() {
        let router =
            CollectionRouter::new(server(), vec![status_filter(), starred_filter()]).unwrap();
        router
            .default_collection()
            .load()
            .unwrap()
            .await
            .unwrap();

        let pending = router
            .update_variables(&Variables::new().with("starred", true))
            .unwrap();
        assert!(pending.is_some());
        assert!(router.active_collection().is_empty());

        let expected: Vec<Ticket> = tickets().into_iter().filter(|t| t.starred).collect();
        assert_eq!(router.items(), expected);
        assert_eq!(router.locally_filtered(), expected);

        // 服务端过滤同时激活：不能本地满足，返回（空的）活动集合
        router
            .update_variables(&Variables::new().with("status", "open"))
            .unwrap();
        assert!(router.items().is_empty());
    }

    #[tokio::test]
    async fn delete_item_reaches_every_collection() {
        let router = CollectionRouter::new(server(), vec![status_filter()]).unwrap();
        router
            .update_variables(&Variables::new())
            .unwrap()
            .unwrap()
            .await
            .unwrap();
        router
            .update_variables(&Variables::new().with("status", "done"))
            .unwrap()
            .unwrap()
            .await
            .unwrap();

        let id = ItemId::from(4);
        let done = router.collection(r#"status="done""#).unwrap();
        assert!(router.default_collection().contains(&id));
        assert!(done.contains(&id));

        assert_eq!(router.delete_item(&id), 2);
        assert!(!router.default_collection().contains(&id));
        assert!(!done.contains(&id));
        assert_eq!(router.delete_item(&id), 0);
    }

    #[test]
    fn apply_filter_matches_active_keyed_filters() {
        let mut config = server();
        config.variables = Variables::new().with("status", "open").with("owner", 10);
        let router = CollectionRouter::new(
            config,
            vec![
                status_filter(),
                FilterSpec::new("owner").key("owner"),
                // 没有 key：不参与 ad hoc 匹配
                FilterSpec::new("starred"),
            ],
        )
        .unwrap();

        let kept = router.apply_filter(tickets());
        assert_eq!(ids_of(&kept), vec![1, 5]);
    }

    #[test]
    fn apply_filter_compares_json_values_strictly() {
        let mut config = server();
        config.variables = Variables::new().with("owner", json!(10.0));
        let router =
            CollectionRouter::new(config, vec![FilterSpec::new("owner").key("owner")]).unwrap();
        assert!(router.apply_filter(tickets()).is_empty());

        router
            .variables
            .store(Arc::new(Variables::new().with("owner", "10")));
        assert!(router.apply_filter(tickets()).is_empty());

        router
            .variables
            .store(Arc::new(Variables::new().with("owner", 10)));
        assert_eq!(ids_of(&router.apply_filter(tickets())), vec![1, 2, 5]);
    }

    #[test]
    fn initial_filtered_signature_still_has_default() {
        let mut config = server();
        config.variables = Variables::new().with("status", "open").with("team", 3);
        let router = CollectionRouter::new(config, vec![status_filter()]).unwrap();

        assert_eq!(
            router.signatures(),
            vec![DEFAULT_SIGNATURE.to_string(), r#"status="open""#.to_string()]
        );
        let default_vars = router.default_collection().variables();
        assert_eq!(default_vars.get("status"), Some(&Value::Null));
        assert_eq!(default_vars.get("team"), Some(&json!(3)));
        assert_eq!(
            router.active_collection().variables().get("status"),
            Some(&json!("open"))
        );
    }

    #[test]
    fn router_ignores_no_paging() {
        let router = CollectionRouter::new(server().no_paging(true), vec![status_filter()]).unwrap();
        assert!(!router.default_collection().settings().no_paging);
        assert!(router.default_collection().has_more());
    }

    #[tokio::test]
    async fn report_lists_every_signature() {
        let router = CollectionRouter::new(server(), vec![status_filter()]).unwrap();
        router
            .update_variables(&Variables::new().with("status", "done"))
            .unwrap()
            .unwrap()
            .await
            .unwrap();

        let report = router.report();
        assert_eq!(report.collections.len(), 2);
        let done = &report.collections[1];
        assert_eq!(done.signature, r#"status="done""#);
        assert!(done.active);
        assert_eq!(done.items, 3);

        let text = report.to_string();
        assert!(text.contains("tickets"));
        assert!(text.contains(r#"status="done""#));
    }
}
