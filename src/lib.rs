pub mod collection;
pub mod config;
pub mod core;
pub mod error;
pub mod router;
pub mod search;
pub mod stats;

pub use collection::{Collection, CollectionConfig, CollectionStatus};
pub use config::CollectionSettings;
pub use crate::core::{FetchRequest, Item, ItemId, PagingState, Variables};
pub use error::CacheError;
pub use router::{CollectionRouter, FilterSpec};
pub use search::{SearchEntry, SearchSpec};
