// SQLite-backed store: transactional writes, consistent reads, and live queries.
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::core::error::{Error, ErrorKind, from_sqlite};
use crate::core::live::{Generations, Live, QueryRegistry, Snapshot, SnapshotSender, Table};
use crate::core::schema;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// How long a live query keeps running after its last observer is dropped.
    pub grace_period: Duration,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the local database. Cheap to clone; clones share one connection.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

struct Inner {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
    options: StoreOptions,
    changes: watch::Sender<Generations>,
    queries: QueryRegistry,
}

impl Store {
    pub fn open(path: &Path, options: StoreOptions) -> Result<Self, Error> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                Error::new(map_io_error_kind(&err))
                    .with_message("failed to create data directory")
                    .with_path(parent)
                    .with_source(err)
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|err| from_sqlite(err, "failed to open database").with_path(path))?;
        // WAL is unavailable on some filesystems; the default journal still works.
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            tracing::debug!(error = %err, "WAL journal mode unavailable");
        }
        Self::from_connection(conn, Some(path.to_path_buf()), options)
            .map_err(|err| err.with_path(path))
    }

    pub fn in_memory(options: StoreOptions) -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .map_err(|err| from_sqlite(err, "failed to open in-memory database"))?;
        Self::from_connection(conn, None, options)
    }

    fn from_connection(
        conn: Connection,
        path: Option<PathBuf>,
        options: StoreOptions,
    ) -> Result<Self, Error> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|err| from_sqlite(err, "failed to configure database"))?;
        schema::apply(&conn)?;

        let (changes, _) = watch::channel(Generations::default());
        Ok(Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                path,
                options,
                changes,
                queries: QueryRegistry::default(),
            }),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.inner.conn.lock().map_err(|_| {
            Error::new(ErrorKind::Internal).with_message("database connection lock poisoned")
        })
    }

    /// Run `f` against one point-in-time view of the database.
    pub fn read<R>(&self, f: impl FnOnce(&Connection) -> Result<R, Error>) -> Result<R, Error> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|err| from_sqlite(err, "failed to begin read"))?;
        f(&tx)
    }

    /// Run `f` in one transaction. Commits on `Ok`, rolls back on `Err`, and
    /// wakes every live query that depends on one of `touched`.
    pub fn write<R>(
        &self,
        touched: &[Table],
        f: impl FnOnce(&Transaction<'_>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let result = {
            let mut conn = self.lock()?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|err| from_sqlite(err, "failed to begin write"))?;
            let result = f(&tx)?;
            tx.commit()
                .map_err(|err| from_sqlite(err, "failed to commit write"))?;
            result
        };
        self.inner.changes.send_modify(|generations| generations.bump(touched));
        tracing::debug!(tables = ?touched, "write committed");
        Ok(result)
    }

    /// Run blocking store work on tokio's blocking pool.
    pub async fn run_blocking<R, F>(&self, f: F) -> Result<R, Error>
    where
        R: Send + 'static,
        F: FnOnce(&Store) -> Result<R, Error> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("store task failed")
                    .with_source(err)
            })?
    }

    /// Subscribe to `query`, re-run after every committed write to `tables`.
    ///
    /// Observers passing the same `key` share one running query. Must be called
    /// from within a tokio runtime.
    pub fn observe<T, F>(&self, key: impl Into<String>, tables: &[Table], query: F) -> Live<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&Connection) -> Result<T, Error> + Send + Sync + 'static,
    {
        let key = key.into();
        let fresh_from = *self.inner.changes.borrow();
        let (live, created) = self.inner.queries.join_or_insert::<T>(&key, fresh_from, tables);
        if let Some(sender) = created {
            tracing::debug!(query = %key, "live query started");
            tokio::spawn(self.clone().drive(key, tables.to_vec(), Arc::new(query), sender));
        }
        live
    }

    async fn drive<T, F>(
        self,
        key: String,
        tables: Vec<Table>,
        query: Arc<F>,
        sender: Arc<SnapshotSender<T>>,
    ) where
        T: Clone + Send + Sync + 'static,
        F: Fn(&Connection) -> Result<T, Error> + Send + Sync + 'static,
    {
        let mut changes = self.inner.changes.subscribe();
        let mut retire_at = None;
        loop {
            let seen = *changes.borrow_and_update();
            let run = Arc::clone(&query);
            let value = self.run_blocking(move |store| store.read(|conn| run(conn))).await;
            match &value {
                Ok(_) => tracing::debug!(query = %key, "live query refreshed"),
                Err(err) => tracing::warn!(query = %key, error = %err, "live query refresh failed"),
            }
            sender.send_replace(Some(Snapshot {
                seen,
                value: value.map_err(Arc::new),
            }));
            if !self
                .wait_for_change(&key, &tables, seen, &mut changes, &sender, &mut retire_at)
                .await
            {
                tracing::debug!(query = %key, "live query retired");
                return;
            }
        }
    }

    /// Returns `true` when a relevant write landed, `false` when the query
    /// should stop. Relevant writes still re-run the query during the grace
    /// period.
    async fn wait_for_change<T>(
        &self,
        key: &str,
        tables: &[Table],
        seen: Generations,
        changes: &mut watch::Receiver<Generations>,
        sender: &Arc<SnapshotSender<T>>,
        retire_at: &mut Option<Instant>,
    ) -> bool
    where
        T: Send + Sync + 'static,
    {
        loop {
            let deadline = *retire_at;
            let idle = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => sender.closed().await,
                }
            };
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                    if changes.borrow_and_update().moved_since(&seen, tables) {
                        return true;
                    }
                }
                _ = idle => match deadline {
                    None => *retire_at = Some(Instant::now() + self.inner.options.grace_period),
                    Some(_) => {
                        if self.inner.queries.retire(key, sender) {
                            return false;
                        }
                        *retire_at = None;
                    }
                },
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn running_queries(&self) -> usize {
        self.inner.queries.len()
    }
}

pub(crate) fn map_io_error_kind(err: &std::io::Error) -> ErrorKind {
    match err.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound,
        std::io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}
