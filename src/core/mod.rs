pub mod item;
pub mod paging;
pub mod variables;

pub use item::*;
pub use paging::*;
pub use variables::*;
