pub mod entry;

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;

pub use entry::SearchEntry;

pub type LocalSearchFn<L> = Arc<dyn Fn(&str) -> Vec<L> + Send + Sync>;
pub type RemoteSearchFn<R> =
    Arc<dyn Fn(&str) -> BoxFuture<'static, anyhow::Result<Vec<R>>> + Send + Sync>;

/// 搜索契约：同步的本地候选 + 异步的远端结果。
pub struct SearchSpec<L, R> {
    pub local: LocalSearchFn<L>,
    pub remote: RemoteSearchFn<R>,
}

impl<L, R> Clone for SearchSpec<L, R> {
    fn clone(&self) -> Self {
        Self {
            local: self.local.clone(),
            remote: self.remote.clone(),
        }
    }
}

impl<L, R> SearchSpec<L, R> {
    pub fn new<FL, FR, Fut>(local: FL, remote: FR) -> Self
    where
        FL: Fn(&str) -> Vec<L> + Send + Sync + 'static,
        FR: Fn(&str) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<R>>> + Send + 'static,
    {
        Self {
            local: Arc::new(local),
            remote: Arc::new(move |term: &str| remote(term).boxed()),
        }
    }
}
