use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;

use crate::config::CollectionSettings;
use crate::core::{FetchRequest, Item, Variables};
use crate::search::SearchSpec;

pub type FetchFn<T> =
    Arc<dyn Fn(FetchRequest) -> BoxFuture<'static, anyhow::Result<Vec<T>>> + Send + Sync>;
pub type SortFn<T> = Arc<dyn Fn(Vec<T>) -> Vec<T> + Send + Sync>;
pub type OnFetchFn<T> = Arc<dyn Fn(&[T]) + Send + Sync>;
pub type BeforeRefreshFn = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
pub type AfterRefreshFn = Arc<dyn Fn() + Send + Sync>;

/// Collection 构造配置：可序列化部分（`settings`）+ 回调。
pub struct CollectionConfig<T: Item, R = T> {
    pub settings: CollectionSettings,
    pub fetch: FetchFn<T>,
    pub variables: Variables,
    pub sort: Option<SortFn<T>>,
    pub on_fetch: Option<OnFetchFn<T>>,
    pub before_refresh: Option<BeforeRefreshFn>,
    pub after_refresh: Option<AfterRefreshFn>,
    /// `Some(vec![])` 与 `None` 不同：前者视为“已加载且为空”
    pub initial_items: Option<Vec<T>>,
    pub search: Option<SearchSpec<T, R>>,
}

impl<T: Item, R> Clone for CollectionConfig<T, R> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            fetch: self.fetch.clone(),
            variables: self.variables.clone(),
            sort: self.sort.clone(),
            on_fetch: self.on_fetch.clone(),
            before_refresh: self.before_refresh.clone(),
            after_refresh: self.after_refresh.clone(),
            initial_items: self.initial_items.clone(),
            search: self.search.clone(),
        }
    }
}

impl<T: Item, R> CollectionConfig<T, R> {
    pub fn new<F, Fut>(name: impl Into<String>, fetch: F) -> Self
    where
        F: Fn(FetchRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<T>>> + Send + 'static,
    {
        Self {
            settings: CollectionSettings::named(name),
            fetch: Arc::new(move |req| fetch(req).boxed()),
            variables: Variables::new(),
            sort: None,
            on_fetch: None,
            before_refresh: None,
            after_refresh: None,
            initial_items: None,
            search: None,
        }
    }

    /// 整体替换可序列化部分（通常来自 TOML）。
    pub fn with_settings(mut self, settings: CollectionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.settings.page_size = page_size;
        self
    }

    pub fn no_paging(mut self, no_paging: bool) -> Self {
        self.settings.no_paging = no_paging;
        self
    }

    pub fn chunking(mut self, ring: Vec<usize>) -> Self {
        self.settings.chunking = Some(ring);
        self
    }

    pub fn clear_on_refresh(mut self, clear: bool) -> Self {
        self.settings.clear_on_refresh = clear;
        self
    }

    pub fn load(mut self, load: bool) -> Self {
        self.settings.load = load;
        self
    }

    pub fn log(mut self, log: bool) -> Self {
        self.settings.log = log;
        self
    }

    pub fn initial_items(mut self, items: Vec<T>) -> Self {
        self.initial_items = Some(items);
        self
    }

    pub fn sort(mut self, sort: impl Fn(Vec<T>) -> Vec<T> + Send + Sync + 'static) -> Self {
        self.sort = Some(Arc::new(sort));
        self
    }

    pub fn on_fetch(mut self, f: impl Fn(&[T]) + Send + Sync + 'static) -> Self {
        self.on_fetch = Some(Arc::new(f));
        self
    }

    pub fn before_refresh<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.before_refresh = Some(Arc::new(move || f().boxed()));
        self
    }

    pub fn after_refresh(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.after_refresh = Some(Arc::new(f));
        self
    }

    pub fn search(mut self, spec: SearchSpec<T, R>) -> Self {
        self.search = Some(spec);
        self
    }
}
