//! # Connection Pool
//!
//! A bounded set of SQLite connections shared by every request.
//!
//! ## Lifecycle
//!
//! ```text
//!  acquire().await                                   drop(guard)
//!       │                                                 │
//!       ▼                                                 ▼
//!  Semaphore permit ──► idle.pop() or factory() ──► rollback if mid-transaction
//!  (waits when all                                   push back to idle
//!   `size` are out)                                  permit released
//! ```
//!
//! The permit count bounds how many connections exist at once. Connections are
//! created lazily by the factory and reused afterwards.
//!
//! ## Rust Pattern: RAII Guard
//!
//! [`PooledConnection`] returns its connection in `Drop`. Every exit path,
//! including `?` early returns and panics inside a blocking task, releases the
//! connection exactly once without any explicit release call.
//!
//! ## Why spawn_blocking?
//!
//! `rusqlite::Connection` is synchronous. [`Pool::run`] moves the guard into a
//! `tokio::task::spawn_blocking` closure so statement execution never stalls
//! the async workers, and the guard drops on the blocking thread when the work
//! is done.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::schema::configure_connection;

/// Creates a new connection when the pool has no idle one.
pub type ConnectionFactory = Box<dyn Fn() -> Result<Connection> + Send + Sync>;

/// A point-in-time view of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub size: usize,
    pub in_use: usize,
    pub idle: usize,
}

struct PoolInner {
    size: usize,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Connection>>,
    factory: ConnectionFactory,
}

impl PoolInner {
    fn idle(&self) -> std::sync::MutexGuard<'_, Vec<Connection>> {
        // A panic while holding the lock cannot leave the Vec half-updated.
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bounded connection pool. Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").field("status", &self.status()).finish()
    }
}

impl Pool {
    /// Opens up to `size` connections to the database file at `path`.
    ///
    /// The file must already be initialized (see `Database::open`).
    pub fn open(path: impl Into<PathBuf>, size: usize, busy_timeout: Duration) -> Result<Self> {
        let path = path.into();
        Self::with_factory(
            size,
            Box::new(move || {
                let conn = Connection::open(&path)?;
                configure_connection(&conn, busy_timeout)?;
                Ok(conn)
            }),
        )
    }

    /// Builds a pool around a caller-supplied connection source.
    ///
    /// # Errors
    ///
    /// `Error::Pool` if `size` is zero.
    pub fn with_factory(size: usize, factory: ConnectionFactory) -> Result<Self> {
        if size == 0 {
            return Err(Error::Pool("pool size must be at least 1".to_string()));
        }
        Ok(Self {
            inner: Arc::new(PoolInner {
                size,
                permits: Arc::new(Semaphore::new(size)),
                idle: Mutex::new(Vec::with_capacity(size)),
                factory,
            }),
        })
    }

    /// Waits for a free slot and checks out a connection.
    ///
    /// # Errors
    ///
    /// - `Error::Pool` if the pool was closed
    /// - whatever the factory returns when a new connection can't be opened
    ///   (the slot is released again)
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Pool("pool is closed".to_string()))?;

        let reused = self.inner.idle().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => (self.inner.factory)()?,
        };

        debug!(in_use = self.in_use(), size = self.inner.size, "connection acquired");
        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Runs `work` on a pooled connection on the blocking thread pool.
    ///
    /// The connection is released when `work` returns, whether it succeeded,
    /// failed, or panicked.
    pub async fn run<F, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut conn = self.acquire().await?;
        tokio::task::spawn_blocking(move || work(&mut *conn))
            .await
            .map_err(|e| Error::Pool(format!("blocking task failed: {e}")))?
    }

    /// Stops handing out connections. Waiters and later callers get
    /// `Error::Pool`; connections already checked out stay usable.
    pub fn close(&self) {
        self.inner.permits.close();
        self.inner.idle().clear();
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            size: self.inner.size,
            in_use: self.in_use(),
            idle: self.inner.idle().len(),
        }
    }

    fn in_use(&self) -> usize {
        self.inner
            .size
            .saturating_sub(self.inner.permits.available_permits())
    }
}

// =============================================================================
// Guard
// =============================================================================

/// A checked-out connection. Derefs to `rusqlite::Connection`.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
    // Dropped after `Drop::drop` has returned the connection.
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection").finish_non_exhaustive()
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only `Drop` takes the connection out.
        self.conn.as_ref().unwrap_or_else(|| unreachable!("connection already released"))
    }
}

impl std::ops::DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().unwrap_or_else(|| unreachable!("connection already released"))
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        if !conn.is_autocommit() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "discarding connection that could not roll back");
                return;
            }
            debug!("rolled back transaction left open on released connection");
        }

        if self.pool.permits.is_closed() {
            return;
        }
        self.pool.idle().push(conn);
        debug!("connection released");
    }
}

// =============================================================================
// Tests
// =============================================================================
