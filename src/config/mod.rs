use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::DEFAULT_PAGE_SIZE;
use crate::error::{CacheError, Result};

/// Collection 配置中可序列化的部分（不含回调）。可从 TOML 读取：
///
/// ```toml
/// name = "tasks"
/// page_size = 25
/// chunking = [2, 1]
/// clear_on_refresh = true
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionSettings {
    pub name: String,
    pub page_size: usize,
    pub no_paging: bool,
    pub chunking: Option<Vec<usize>>,
    pub clear_on_refresh: bool,
    /// 构造后立即开始加载
    pub load: bool,
    /// 打印每次 fetch 的结果
    pub log: bool,
}

impl Default for CollectionSettings {
    fn default() -> Self {
        Self {
            name: "collection".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            no_paging: false,
            chunking: None,
            clear_on_refresh: false,
            load: false,
            log: false,
        }
    }
}

impl CollectionSettings {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let settings: Self = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&text)?)
    }

    /// page_size 必须 > 0；chunk ring 中出现 0 会让分组永不闭合，同样拒绝。
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(CacheError::InvalidConfig(format!(
                "`{}`: page_size must be greater than zero",
                self.name
            )));
        }
        if let Some(ring) = &self.chunking {
            if ring.is_empty() {
                return Err(CacheError::InvalidConfig(format!(
                    "`{}`: chunking ring is empty",
                    self.name
                )));
            }
            if ring.contains(&0) {
                return Err(CacheError::InvalidConfig(format!(
                    "`{}`: chunking ring contains a zero size",
                    self.name
                )));
            }
        }
        Ok(())
    }
}
