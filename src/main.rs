use clap::Parser;
use paged_cache::core::is_truthy;
use paged_cache::{
    CollectionConfig, CollectionRouter, CollectionSettings, FetchRequest, FilterSpec, Item, ItemId,
    SearchSpec, Variables,
};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 用合成远端驱动一个 CollectionRouter：刷新、翻页、切换过滤、搜索，最后打印统计。
#[derive(Parser, Debug)]
#[command(name = "paged-cache", version)]
struct Args {
    /// Collection settings (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Rows held by the synthetic remote
    #[arg(long, default_value_t = 57)]
    total: i64,
    /// Pages to append after the first refresh
    #[arg(long, default_value_t = 2)]
    pages: usize,
    /// Server-side status filter to switch to (open / done / blocked)
    #[arg(long)]
    status: Option<String>,
    /// Show starred rows through the local filter
    #[arg(long)]
    starred: bool,
    /// Search term
    #[arg(long)]
    search: Option<String>,
    /// Simulated remote latency in milliseconds
    #[arg(long, default_value_t = 20)]
    latency_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
struct Row {
    id: i64,
    title: String,
    status: &'static str,
    starred: bool,
}

impl Item for Row {
    fn id(&self) -> ItemId {
        self.id.into()
    }
}

const STATUSES: [&str; 3] = ["open", "done", "blocked"];

fn synthetic(total: i64) -> Vec<Row> {
    (0..total)
        .map(|id| Row {
            id,
            title: format!("row {:03}", id),
            status: STATUSES[(id % 3) as usize],
            starred: id % 4 == 0,
        })
        .collect()
}

fn default_settings() -> CollectionSettings {
    CollectionSettings {
        name: "rows".to_string(),
        page_size: 10,
        chunking: Some(vec![2, 1]),
        log: true,
        ..CollectionSettings::default()
    }
}

fn build_router(
    rows: Arc<Vec<Row>>,
    settings: CollectionSettings,
    latency: Duration,
) -> anyhow::Result<CollectionRouter<Row>> {
    let remote_rows = rows.clone();
    let search_rows = rows.clone();
    let local_rows = rows;

    let config = CollectionConfig::<Row, Row>::new(settings.name.clone(), move |req: FetchRequest| {
        let rows = remote_rows.clone();
        async move {
            tokio::time::sleep(latency).await;
            // 合成远端只支持 status 过滤
            let status = req.variables.get("status").filter(|v| is_truthy(v)).cloned();
            let page = rows
                .iter()
                .filter(|r| status.as_ref().map_or(true, |s| s.as_str() == Some(r.status)))
                .skip(req.offset())
                .take(req.limit())
                .cloned()
                .collect();
            Ok(page)
        }
    })
    .with_settings(settings)
    .after_refresh(|| info!("refresh complete"))
    .search(SearchSpec::new(
        move |term: &str| {
            local_rows
                .iter()
                .filter(|r| r.title.contains(term))
                .take(3)
                .cloned()
                .collect()
        },
        move |term: &str| {
            let rows = search_rows.clone();
            let term = term.to_string();
            async move {
                tokio::time::sleep(latency).await;
                Ok(rows.iter().filter(|r| r.title.contains(&term)).cloned().collect())
            }
        },
    ));

    let filters = vec![
        FilterSpec::new("status").key("status"),
        FilterSpec::new("starred").local(|items: Vec<Row>, v: &Value| {
            if is_truthy(v) {
                items.into_iter().filter(|r| r.starred).collect()
            } else {
                items
            }
        }),
    ];
    Ok(CollectionRouter::new(config, filters)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let settings = match &args.config {
        Some(path) => CollectionSettings::from_file(path)?,
        None => default_settings(),
    };
    info!("Starting paged-cache demo: {} synthetic rows", args.total);

    let rows = Arc::new(synthetic(args.total));
    let router = build_router(rows, settings, Duration::from_millis(args.latency_ms))?;

    let active = router.active_collection();
    if let Some(h) = active.refresh() {
        h.await?;
    }
    for _ in 0..args.pages {
        match active.load() {
            Some(h) => h.await?,
            None => break,
        }
    }
    info!(
        "default collection: {} rows, {} groups, has_more={}",
        active.len(),
        active.chunked().len(),
        active.has_more()
    );
    for (i, group) in active.chunked().iter().enumerate().take(6) {
        let ids: Vec<i64> = group.iter().map(|r| r.id).collect();
        println!("group {:>2}: {:?}", i, ids);
    }

    if let Some(status) = &args.status {
        if let Some(h) = router.update_variables(&Variables::new().with("status", status.as_str()))? {
            h.await?;
        }
        info!("{} -> {} rows", router.filter_signature(), router.items().len());
    }

    if args.starred {
        // 新集合的 fetch 尚未返回时，items() 由 default 集合本地归约得到
        let _pending = router.update_variables(&Variables::new().with("starred", true))?;
        let view = router.items();
        info!("{} (local view) -> {} rows", router.filter_signature(), view.len());
    }

    if let Some(term) = &args.search {
        let entry = active.search(term)?;
        println!("search {:?}: {} local candidates", term, entry.local().len());
        match tokio::time::timeout(Duration::from_secs(2), entry.wait_fetched()).await {
            Ok(()) => println!("search {:?}: {} remote results", term, entry.results().len()),
            Err(_) => println!("search {:?}: remote did not answer", term),
        }
    }

    println!("{}", router.report());
    Ok(())
}
