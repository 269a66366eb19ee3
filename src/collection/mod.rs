pub mod chunk;
pub mod config;
mod state;

pub use chunk::chunk_items;
pub use config::*;
pub use state::{dedup_by_id, CollectionStatus};

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::collection::chunk::chunk_from;
use crate::collection::state::CollectionState;
use crate::config::CollectionSettings;
use crate::core::{FetchRequest, Item, ItemId, PagingState, Variables};
use crate::error::{CacheError, Result};
use crate::search::{SearchEntry, SearchSpec};

/// 分页、去重、可本地修改的条目集合（一组固定查询变量对应一个 Collection）。
///
/// ## 并发约定
/// - `load` / `refresh` 的守卫在发起 fetch 之前同步检查并置位：同一时刻最多一个追加、一个刷新。
/// - `load` 会检查 `refreshing`，`refresh` 不检查 `loading`：刷新可以插在追加中途。
/// - 没有取消：晚到的 fetch 结果无条件应用。
/// - 状态锁从不跨 await 持有，也不在持锁时调用用户钩子（`sort` 除外，要求纯函数）。
///
/// fetch 以 Tokio 任务执行，触发 fetch 的方法必须在 Tokio runtime 内调用。
pub struct Collection<T: Item, R = T> {
    settings: CollectionSettings,
    fetch: FetchFn<T>,
    sort: Option<SortFn<T>>,
    on_fetch: Option<OnFetchFn<T>>,
    before_refresh: Option<BeforeRefreshFn>,
    after_refresh: Option<AfterRefreshFn>,
    search: Option<SearchSpec<T, R>>,
    state: Mutex<CollectionState<T>>,
    status_tx: watch::Sender<CollectionStatus>,
    search_cache: DashMap<String, Arc<SearchEntry<T, R>>>,
}

impl<T: Item, R: Clone + Send + Sync + 'static> Collection<T, R> {
    pub fn new(config: CollectionConfig<T, R>) -> Result<Arc<Self>> {
        config.settings.validate()?;
        let CollectionConfig {
            settings,
            fetch,
            variables,
            sort,
            on_fetch,
            before_refresh,
            after_refresh,
            initial_items,
            search,
        } = config;

        let state = CollectionState::new(variables, !settings.no_paging);
        let (status_tx, _) = watch::channel(state.status());
        let collection = Arc::new(Self {
            settings,
            fetch,
            sort,
            on_fetch,
            before_refresh,
            after_refresh,
            search,
            state: Mutex::new(state),
            status_tx,
            search_cache: DashMap::new(),
        });

        if let Some(items) = initial_items {
            collection.set_items(items, true);
        }
        if collection.settings.load {
            let _ = collection.load();
        }
        Ok(collection)
    }

    /// 唯一提交点：所有可观察字段的修改都以此结束。
    fn publish(&self, st: &mut CollectionState<T>) {
        st.revision += 1;
        self.status_tx.send_replace(st.status());
    }

    fn trace_fetch(&self, label: &str, batch: &[T]) {
        if self.settings.log {
            tracing::info!(
                "Collection::{} {}: {} items",
                self.settings.name,
                label,
                batch.len()
            );
        }
    }

    // ---------------------------------------------------------------------
    // fetch 生命周期
    // ---------------------------------------------------------------------

    /// 追加下一页。正在加载/刷新、`no_paging` 或已无更多时返回 `None`（不发起 fetch）。
    pub fn load(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let req = {
            let mut st = self.state.lock();
            if st.loading || st.refreshing || self.settings.no_paging || !st.has_more {
                return None;
            }
            st.loading = true;
            let req = FetchRequest {
                variables: st.variables.clone(),
                paging: st.paging_vars(self.settings.page_size),
            };
            self.publish(&mut st);
            req
        };

        tracing::debug!(
            "Collection::{} load offset={} limit={}",
            self.settings.name,
            req.offset(),
            req.limit()
        );
        let fut = (self.fetch)(req);
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            match fut.await {
                Ok(items) => this.finish_load(items),
                Err(e) => this.fail_load(e),
            }
        }))
    }

    fn finish_load(&self, batch: Vec<T>) {
        self.trace_fetch("Fetch result", &batch);
        if let Some(on_fetch) = &self.on_fetch {
            on_fetch(&batch);
        }
        let mut st = self.state.lock();
        let fresh = st.take_new(batch);
        // 按去重后的条数判断：远端反复返回已见过的整页时停止追加
        st.has_more = fresh.len() >= self.settings.page_size;
        if let Some(ring) = &self.settings.chunking {
            let (groups, next) = chunk_from(fresh.iter().cloned(), ring, st.chunk_cursor);
            st.chunked.extend(groups);
            st.chunk_cursor = next;
        }
        st.push_back(fresh);
        st.loading = false;
        st.last_error = None;
        self.publish(&mut st);
    }

    fn fail_load(&self, err: anyhow::Error) {
        tracing::warn!("Collection::{} LoadError: {:#}", self.settings.name, err);
        let mut st = self.state.lock();
        st.loading = false;
        st.last_error = Some(format!("{:#}", err));
        self.publish(&mut st);
    }

    /// 从头重新拉取并整体替换。已在刷新中时返回 `None`；不检查 `loading`。
    pub fn refresh(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let req = {
            let mut st = self.state.lock();
            if st.refreshing {
                return None;
            }
            if self.settings.clear_on_refresh {
                st.clear_items();
                st.clear_chunks();
            }
            st.paging_started = SystemTime::now();
            st.refreshing = true;
            st.has_more = !self.settings.no_paging;
            let req = FetchRequest {
                variables: st.variables.clone(),
                paging: PagingState {
                    offset: 0,
                    limit: self.settings.page_size,
                    paging_started: st.paging_started,
                    up_to: None,
                },
            };
            self.publish(&mut st);
            req
        };

        let before = self.before_refresh.as_ref().map(|hook| hook());
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            if let Some(before) = before {
                if let Err(e) = before.await {
                    this.fail_before_refresh(e);
                    return;
                }
            }
            let fetched = (this.fetch)(req).await;
            match fetched {
                Ok(items) => this.finish_refresh(items),
                Err(e) => this.fail_refresh(e),
            }
        }))
    }

    fn finish_refresh(&self, batch: Vec<T>) {
        self.trace_fetch("Fetch result", &batch);
        if let Some(on_fetch) = &self.on_fetch {
            on_fetch(&batch);
        }
        let batch = match &self.sort {
            Some(sort) => sort(batch),
            None => batch,
        };

        {
            let mut st = self.state.lock();
            st.replace_items(batch);
            st.refreshing = false;
            st.has_more = !self.settings.no_paging && st.items.len() >= self.settings.page_size;
            st.clear_chunks();
            if let Some(ring) = &self.settings.chunking {
                let (groups, next) = chunk_from(st.items.iter().cloned(), ring, 0);
                st.chunked = groups;
                st.chunk_cursor = next;
            }
            st.last_error = None;
            self.publish(&mut st);
        }

        if let Some(after) = &self.after_refresh {
            after();
        }
    }

    fn fail_refresh(&self, err: anyhow::Error) {
        tracing::warn!("Collection::{} RefreshError: {:#}", self.settings.name, err);
        let mut st = self.state.lock();
        st.refreshing = false;
        st.last_error = Some(format!("{:#}", err));
        self.publish(&mut st);
    }

    fn fail_before_refresh(&self, err: anyhow::Error) {
        tracing::warn!("Collection::{} PrefetchError: {:#}", self.settings.name, err);
        let mut st = self.state.lock();
        st.refreshing = false;
        st.last_error = Some(format!("{:#}", err));
        self.publish(&mut st);
    }

    /// 空集合时：`no_paging` 走 refresh，否则走 load。
    pub fn load_if_empty(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.is_empty() {
            return None;
        }
        if self.settings.no_paging {
            self.refresh()
        } else {
            self.load()
        }
    }

    pub fn load_if_empty_else_refresh(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.is_empty() {
            self.load()
        } else {
            self.refresh()
        }
    }

    /// 浅合并查询变量；除非 `no_refresh`，随后触发 refresh。
    pub fn update_variables(
        self: &Arc<Self>,
        partial: &Variables,
        no_refresh: bool,
    ) -> Option<JoinHandle<()>> {
        self.state.lock().variables.merge(partial);
        if no_refresh {
            None
        } else {
            self.refresh()
        }
    }

    // ---------------------------------------------------------------------
    // 本地修改
    // ---------------------------------------------------------------------

    pub fn add_item(&self, item: T, prepend: bool) -> bool {
        self.add_items(vec![item], prepend) == 1
    }

    /// 插入身份尚不存在的条目，返回实际插入数。配置了 `sort` 时整体重排，忽略 `prepend`。
    pub fn add_items(&self, items: Vec<T>, prepend: bool) -> usize {
        let mut st = self.state.lock();
        let fresh = st.take_new(items);
        let added = fresh.len();
        if added == 0 {
            return 0;
        }
        match &self.sort {
            Some(sort) => {
                let mut all = std::mem::take(&mut st.items);
                all.extend(fresh);
                st.replace_items(sort(all));
            }
            None if prepend => st.push_front(fresh),
            None => st.push_back(fresh),
        }
        self.publish(&mut st);
        added
    }

    pub fn remove_item(&self, id: &ItemId) -> bool {
        let mut st = self.state.lock();
        let removed = st.remove(id);
        if removed {
            self.publish(&mut st);
        }
        removed
    }

    pub fn remove_items(&self, ids: &[ItemId]) -> usize {
        let mut st = self.state.lock();
        let removed = ids.iter().filter(|id| st.remove(id)).count();
        if removed > 0 {
            self.publish(&mut st);
        }
        removed
    }

    /// 把已存在的条目移到 `to_index`（超出范围时放到末尾）；不存在且 `add` 时插入。
    pub fn move_item(&self, item: T, to_index: usize, add: bool) -> bool {
        let id = item.id();
        let mut st = self.state.lock();
        match st.position(&id) {
            Some(i) => {
                st.items.remove(i);
            }
            None if add => {
                st.ids.insert(id);
            }
            None => return false,
        }
        let at = to_index.min(st.items.len());
        st.items.insert(at, item);
        self.publish(&mut st);
        true
    }

    /// 整体替换；`was_loaded` 且替换为空时视为已无更多。
    pub fn set_items(&self, items: Vec<T>, was_loaded: bool) {
        let items = match &self.sort {
            Some(sort) => sort(items),
            None => items,
        };
        let mut st = self.state.lock();
        st.replace_items(items);
        if was_loaded && st.items.is_empty() {
            st.has_more = false;
        }
        self.publish(&mut st);
    }

    /// 清空条目与分组、开启新的分页纪元，不发起 fetch。
    pub fn reset(&self) {
        let mut st = self.state.lock();
        st.paging_started = SystemTime::now();
        st.has_more = !self.settings.no_paging;
        st.clear_items();
        st.clear_chunks();
        self.publish(&mut st);
    }

    // ---------------------------------------------------------------------
    // 搜索缓存
    // ---------------------------------------------------------------------

    /// 返回 `term` 的缓存项；首次访问时调用本地与远端搜索函数创建。
    pub fn search(&self, term: &str) -> Result<Arc<SearchEntry<T, R>>> {
        let spec = self
            .search
            .as_ref()
            .ok_or_else(|| CacheError::SearchNotConfigured {
                name: self.settings.name.clone(),
            })?;
        if let Some(entry) = self.search_cache.get(term) {
            return Ok(entry.value().clone());
        }
        // 用户回调在分片锁之外执行；并发未命中时落败方的 future 未被 poll，直接丢弃
        let remote = (spec.remote)(term);
        let local = (spec.local)(term);
        let entry = self
            .search_cache
            .entry(term.to_string())
            .or_insert_with(|| SearchEntry::spawn(remote, local))
            .value()
            .clone();
        Ok(entry)
    }

    pub fn clear_search_cache(&self) {
        self.search_cache.clear();
    }

    pub fn search_cache_len(&self) -> usize {
        self.search_cache.len()
    }

    // ---------------------------------------------------------------------
    // 读取
    // ---------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &CollectionSettings {
        &self.settings
    }

    pub fn page_size(&self) -> usize {
        self.settings.page_size
    }

    pub fn items(&self) -> Vec<T> {
        self.state.lock().items.clone()
    }

    pub fn chunked(&self) -> Vec<Vec<T>> {
        self.state.lock().chunked.clone()
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.state.lock().items.iter().map(Item::id).collect()
    }

    pub fn get_item(&self, id: &ItemId) -> Option<T> {
        let st = self.state.lock();
        st.position(id).map(|i| st.items[i].clone())
    }

    pub fn item_index(&self, id: &ItemId) -> Option<usize> {
        self.state.lock().position(id)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.state.lock().ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn refreshing(&self) -> bool {
        self.state.lock().refreshing
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().has_more
    }

    /// 下一次追加会使用的分页参数。
    pub fn paging_vars(&self) -> PagingState {
        self.state.lock().paging_vars(self.settings.page_size)
    }

    pub fn variables(&self) -> Variables {
        self.state.lock().variables.clone()
    }

    pub fn status(&self) -> CollectionStatus {
        self.status_tx.borrow().clone()
    }

    /// 订阅状态变化；读到新 revision 后再调用 `items()` / `chunked()` 取数据。
    pub fn subscribe(&self) -> watch::Receiver<CollectionStatus> {
        self.status_tx.subscribe()
    }
}
