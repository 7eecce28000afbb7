pub mod batch;
pub mod item;
pub mod seen;

pub use batch::{RunBatch, SourceGroup};
pub use item::{collapse_whitespace, resolve_link, NewsItem};
pub use seen::SeenRecord;
