use thiserror::Error;

/// 同步调用路径上的错误。后台 fetch 的失败不走这里（记日志 + 状态通道）。
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid collection config: {0}")]
    InvalidConfig(String),

    #[error("collection `{name}` has no search configured")]
    SearchNotConfigured { name: String },

    #[error("failed to parse settings: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;
