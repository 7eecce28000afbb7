pub mod sqlite;

use crate::app::Result;
use crate::domain::SeenRecord;

pub use sqlite::SqliteStore;

/// Durable record of item ids that have already been delivered.
pub trait SeenStore: Send + Sync {
    /// Ensure the backing schema exists. Safe to call on every startup.
    fn init(&self) -> Result<()>;

    fn is_sent(&self, id: &str) -> Result<bool>;

    /// Idempotent insert. Returns `true` when the id was not yet recorded.
    fn mark_sent(&self, id: &str) -> Result<bool>;

    fn count(&self) -> Result<i64>;
    fn recent(&self, limit: usize) -> Result<Vec<SeenRecord>>;
}
