use std::fmt;

/// Router 统计：每个签名一行。
#[derive(Clone, Debug, Default)]
pub struct RouterReport {
    pub name: String,
    /// 按签名排序
    pub collections: Vec<CollectionReport>,
}

#[derive(Clone, Debug, Default)]
pub struct CollectionReport {
    pub signature: String,
    /// 是否为当前变量对应的集合
    pub active: bool,
    pub items: usize,
    /// chunked 分组数
    pub groups: usize,
    pub loading: bool,
    pub refreshing: bool,
    pub has_more: bool,
    /// 搜索缓存条目数（无上限）
    pub search_entries: usize,
}

impl RouterReport {
    pub fn total_items(&self) -> usize {
        self.collections.iter().map(|c| c.items).sum()
    }
}

impl CollectionReport {
    fn state_label(&self) -> &'static str {
        match (self.loading, self.refreshing) {
            (true, true) => "load+refresh",
            (true, false) => "loading",
            (false, true) => "refreshing",
            (false, false) if self.has_more => "idle",
            (false, false) => "exhausted",
        }
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

impl fmt::Display for RouterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════════════════╗")?;
        writeln!(f, "║ paged-cache router: {:<41}║", truncate(&self.name, 40))?;
        writeln!(f, "╠══════════════════════════════════════════════════════════════╣")?;
        writeln!(
            f,
            "║   {:<28} {:>6} {:>6} {:>12} {:>4} ║",
            "signature", "items", "groups", "state", "srch"
        )?;
        writeln!(f, "╠──────────────────────────────────────────────────────────────╣")?;
        for c in &self.collections {
            writeln!(
                f,
                "║ {} {:<28} {:>6} {:>6} {:>12} {:>4} ║",
                if c.active { '*' } else { ' ' },
                truncate(&c.signature, 28),
                c.items,
                c.groups,
                c.state_label(),
                c.search_entries
            )?;
        }
        writeln!(f, "╠──────────────────────────────────────────────────────────────╣")?;
        writeln!(
            f,
            "║   collections: {:>6}   items: {:>10}                     ║",
            self.collections.len(),
            self.total_items()
        )?;
        writeln!(f, "╚══════════════════════════════════════════════════════════════╝")?;
        Ok(())
    }
}
