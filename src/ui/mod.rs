//! Purpose: View-models that turn live store queries into display-ready state.
//! Exports: the parties list, party details, and create/edit party view-models.
//! Role: Boundary with the rendering layer; each exposes state plus intent methods.
//! Invariants: View-models never write SQL; all writes go through `PartiesRepository`.
//! Invariants: Dropping a view-model stops its driver task.
use std::collections::HashMap;
use std::future::Future;

use tokio::task::JoinHandle;

use crate::catalog::{Pokemon, PokemonId};

pub mod create;
pub mod details;
pub mod parties;

/// Aborts the wrapped task when dropped.
pub(crate) struct Driver(JoinHandle<()>);

impl Driver {
    pub(crate) fn spawn(task: impl Future<Output = ()> + Send + 'static) -> Self {
        Self(tokio::spawn(task))
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Resolve `ids` against `entries`, keeping the order of `ids` and skipping
/// ids the catalog no longer has.
pub(crate) fn resolve_in_order(ids: &[PokemonId], entries: &[Pokemon]) -> Vec<Pokemon> {
    let by_id: HashMap<PokemonId, &Pokemon> =
        entries.iter().map(|entry| (entry.id, entry)).collect();
    ids.iter()
        .filter_map(|id| by_id.get(id).map(|entry| (*entry).clone()))
        .collect()
}


#[cfg(test)]
mod tests {
    use super::resolve_in_order;
    use super::testing::{ids, pokemon};

    #[test]
    fn resolve_keeps_id_order_and_drops_orphans() {
        let entries = vec![pokemon(1, "Bulbasaur"), pokemon(4, "Charmander")];
        let resolved = resolve_in_order(&ids(&[4, 99, 1]), &entries);
        let names: Vec<_> = resolved.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["Charmander", "Bulbasaur"]);
    }
}
