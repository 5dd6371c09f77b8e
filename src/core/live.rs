//! Purpose: Live query plumbing shared by the store and its observers.
//! Exports: `Table`, `Live`, plus crate-internal `Generations` and `QueryRegistry`.
//! Role: Turns committed writes into re-emissions for every dependent query.
//! Invariants: A `Live` always yields the newest snapshot; intermediate snapshots may be skipped.
//! Invariants: A `Live` never yields a snapshot older than the writes committed before it was made.
//! Invariants: One running query per registry key; observers of a key share its snapshots.
//! Invariants: A failed refresh is published like a result, so waiters wake instead of hanging.
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Table {
    Pokemon,
    Parties,
    PartyMembers,
}

impl Table {
    const COUNT: usize = 3;

    fn index(self) -> usize {
        match self {
            Table::Pokemon => 0,
            Table::Parties => 1,
            Table::PartyMembers => 2,
        }
    }
}

/// Per-table write counters. Compared against a remembered copy so that
/// coalesced notifications never lose which tables moved.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct Generations([u64; Table::COUNT]);

impl Generations {
    pub(crate) fn bump(&mut self, tables: &[Table]) {
        for table in tables {
            self.0[table.index()] += 1;
        }
    }

    pub(crate) fn moved_since(&self, earlier: &Generations, tables: &[Table]) -> bool {
        tables
            .iter()
            .any(|table| self.0[table.index()] != earlier.0[table.index()])
    }

    /// Whether every counter in `tables` has reached `required`.
    pub(crate) fn covers(&self, required: &Generations, tables: &[Table]) -> bool {
        tables
            .iter()
            .all(|table| self.0[table.index()] >= required.0[table.index()])
    }
}

/// A query outcome tagged with the generations current when the query started.
#[derive(Clone, Debug)]
pub(crate) struct Snapshot<T> {
    pub(crate) seen: Generations,
    pub(crate) value: Result<T, Arc<Error>>,
}

pub(crate) type SnapshotSender<T> = watch::Sender<Option<Snapshot<T>>>;

/// A subscription to a live query.
///
/// The first call to [`Live::next`] yields the current snapshot as soon as one
/// exists that reflects every write committed before the subscription was
/// made; later calls wait for the query to re-run after a relevant write.
/// [`Live::try_next`] also reports why a query produced nothing.
pub struct Live<T> {
    rx: watch::Receiver<Option<Snapshot<T>>>,
    fresh_from: Generations,
    tables: Arc<[Table]>,
    primed: bool,
}

impl<T: Clone> Live<T> {
    pub(crate) fn new(
        rx: watch::Receiver<Option<Snapshot<T>>>,
        fresh_from: Generations,
        tables: &[Table],
    ) -> Self {
        Self {
            rx,
            fresh_from,
            tables: tables.into(),
            primed: false,
        }
    }

    /// Latest snapshot, or `None` if the query has not produced a fresh one yet.
    pub fn current(&self) -> Option<T> {
        let snapshot = self.rx.borrow().clone();
        self.accept(snapshot).and_then(Result::ok)
    }

    /// Wait for the next snapshot. Returns `None` once the query has shut down
    /// or its latest refresh failed.
    pub async fn next(&mut self) -> Option<T> {
        self.try_next().await.ok()
    }

    /// Like [`Live::next`], but says why no snapshot arrived.
    pub async fn try_next(&mut self) -> Result<T, Error> {
        loop {
            if !self.primed {
                let snapshot = self.rx.borrow_and_update().clone();
                if let Some(outcome) = self.accept(snapshot) {
                    self.primed = true;
                    return outcome.map_err(|err| relay(&err));
                }
            }
            if self.rx.changed().await.is_err() {
                return Err(Error::new(ErrorKind::Internal).with_message("live query stopped"));
            }
            self.primed = false;
        }
    }

    fn accept(&self, snapshot: Option<Snapshot<T>>) -> Option<Result<T, Arc<Error>>> {
        snapshot
            .filter(|snapshot| snapshot.seen.covers(&self.fresh_from, &self.tables))
            .map(|snapshot| snapshot.value)
    }
}

/// Copy a shared query failure into an owned error of the same kind.
fn relay(err: &Arc<Error>) -> Error {
    let mut relayed = Error::new(err.kind()).with_source(Arc::clone(err));
    if let Some(message) = err.message() {
        relayed = relayed.with_message(message);
    }
    if let Some(hint) = err.hint() {
        relayed = relayed.with_hint(hint);
    }
    if let Some(path) = err.path() {
        relayed = relayed.with_path(path);
    }
    relayed
}

impl<T> Clone for Live<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
            fresh_from: self.fresh_from,
            tables: Arc::clone(&self.tables),
            primed: false,
        }
    }
}

type Slot = Arc<dyn Any + Send + Sync>;

/// Running queries keyed by query shape.
#[derive(Default)]
pub(crate) struct QueryRegistry {
    entries: Mutex<HashMap<String, Slot>>,
}

impl QueryRegistry {
    /// Join the running query for `key`, or register a fresh sender for it.
    /// The sender is returned only when the caller must start the query.
    pub(crate) fn join_or_insert<T>(
        &self,
        key: &str,
        fresh_from: Generations,
        tables: &[Table],
    ) -> (Live<T>, Option<Arc<SnapshotSender<T>>>)
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(slot) = entries.get(key) {
            if let Ok(sender) = Arc::clone(slot).downcast::<SnapshotSender<T>>() {
                return (Live::new(sender.subscribe(), fresh_from, tables), None);
            }
        }
        let (tx, rx) = watch::channel(None);
        let sender = Arc::new(tx);
        entries.insert(key.to_string(), Arc::clone(&sender) as Slot);
        (Live::new(rx, fresh_from, tables), Some(sender))
    }

    /// Drop the entry for `key` if nobody observes it. Returns `true` when the
    /// query should stop.
    pub(crate) fn retire<T>(&self, key: &str, sender: &Arc<SnapshotSender<T>>) -> bool
    where
        T: Send + Sync + 'static,
    {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if sender.receiver_count() > 0 {
            return false;
        }
        let owned = entries.get(key).is_some_and(|slot| {
            std::ptr::eq(
                Arc::as_ptr(slot) as *const (),
                Arc::as_ptr(sender) as *const (),
            )
        });
        if owned {
            entries.remove(key);
        }
        true
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
