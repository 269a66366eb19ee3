use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

/// 单个搜索词的缓存项：构造时即可同步读取本地种子，远端结果到达后整体替换一次。
///
/// 远端失败时 `fetched` 永远为 false、`results` 永远为空，调用方只能通过“迟迟没有结果”感知。
pub struct SearchEntry<L, R> {
    local: Vec<L>,
    results: Mutex<Vec<R>>,
    fetched_tx: watch::Sender<bool>,
}

impl<L, R> SearchEntry<L, R>
where
    L: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// 创建并在后台等待远端结果。后台任务只持有弱引用：缓存被清空后结果直接丢弃。
    pub fn spawn(remote: BoxFuture<'static, anyhow::Result<Vec<R>>>, local: Vec<L>) -> Arc<Self> {
        let (fetched_tx, _) = watch::channel(false);
        let entry = Arc::new(Self {
            local,
            results: Mutex::new(Vec::new()),
            fetched_tx,
        });

        let weak = Arc::downgrade(&entry);
        tokio::spawn(async move {
            match remote.await {
                Ok(results) => {
                    if let Some(entry) = weak.upgrade() {
                        entry.resolve(results);
                    }
                }
                Err(e) => tracing::debug!("Remote search failed, entry stays unresolved: {:#}", e),
            }
        });

        entry
    }

    fn resolve(&self, results: Vec<R>) {
        let mut guard = self.results.lock();
        if *self.fetched_tx.borrow() {
            return;
        }
        *guard = results;
        // 在持锁期间翻转，保证读者看到 fetched=true 时 results 已就位
        self.fetched_tx.send_replace(true);
    }

    pub fn local(&self) -> &[L] {
        &self.local
    }

    pub fn fetched(&self) -> bool {
        *self.fetched_tx.borrow()
    }

    pub fn results(&self) -> Vec<R> {
        self.results.lock().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.fetched_tx.subscribe()
    }

    /// 等到远端结果就位。远端失败时永不返回，调用方需要自行加超时。
    pub async fn wait_fetched(&self) {
        let mut rx = self.fetched_tx.subscribe();
        let _ = rx.wait_for(|fetched| *fetched).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn local_seed_is_immediate_and_results_arrive_once() {
        let (tx, rx) = oneshot::channel::<Vec<&'static str>>();
        let remote = async move { rx.await.map_err(anyhow::Error::from) }.boxed();
        let entry = SearchEntry::spawn(remote, vec!["x"]);

        assert_eq!(entry.local(), &["x"]);
        assert!(!entry.fetched());
        assert!(entry.results().is_empty());

        tx.send(vec!["y", "z"]).unwrap();
        tokio::time::timeout(Duration::from_secs(1), entry.wait_fetched())
            .await
            .unwrap();

        assert!(entry.fetched());
        assert_eq!(entry.results(), vec!["y", "z"]);
    }

    #[tokio::test]
    async fn rejected_remote_never_resolves() {
        let remote = async { Err::<Vec<u32>, _>(anyhow::anyhow!("offline")) }.boxed();
        let entry = SearchEntry::spawn(remote, vec![1u32]);

        let waited = tokio::time::timeout(Duration::from_millis(50), entry.wait_fetched()).await;
        assert!(waited.is_err());
        assert!(!entry.fetched());
        assert!(entry.results().is_empty());
        assert_eq!(entry.local(), &[1]);
    }
}
