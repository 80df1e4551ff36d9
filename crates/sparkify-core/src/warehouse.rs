use anyhow::Result;
use async_trait::async_trait;

use crate::statement::{Dialect, Statement};

/// SQL execution interface the pipeline runs against.
///
/// One implementation per warehouse. A connection is established by the
/// implementation's own constructor and held for the whole run. Work is
/// implicitly transactional: the first `execute` after a `commit` opens a new
/// unit of work, and `close` discards anything not yet committed.
#[async_trait]
pub trait Warehouse: Send {
    /// Dialect statements must be rendered in for this warehouse.
    fn dialect(&self) -> Dialect;

    /// Run one statement. Returns the number of affected rows when the
    /// driver reports one, else 0.
    async fn execute(&mut self, statement: &Statement) -> Result<u64>;

    async fn commit(&mut self) -> Result<()>;

    /// Release the connection. Calling it twice is a no-op.
    async fn close(&mut self) -> Result<()>;
}
