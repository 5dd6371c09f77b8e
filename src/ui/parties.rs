// Parties list: every saved party with its members resolved against the catalog.
use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::catalog::{Catalog, Pokemon, PokemonId};
use crate::core::error::Error;
use crate::core::live::Live;
use crate::parties::model::{Party, PartyWithMembers};
use crate::parties::repository::PartiesRepository;
use crate::ui::Driver;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PartyWithPokemon {
    pub party: Party,
    pub pokemon: Vec<Pokemon>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PartiesUiState {
    Loading,
    Ready(Vec<PartyWithPokemon>),
}

pub struct PartiesViewModel {
    repository: PartiesRepository,
    state: watch::Receiver<PartiesUiState>,
    _driver: Driver,
}

impl PartiesViewModel {
    pub fn new(repository: PartiesRepository, catalog: Arc<dyn Catalog>) -> Self {
        let parties = repository.list_parties_with_members();
        let pokemon = catalog.entries();
        let (tx, state) = watch::channel(PartiesUiState::Loading);
        Self {
            repository,
            state,
            _driver: Driver::spawn(drive(parties, pokemon, tx)),
        }
    }

    pub fn state(&self) -> PartiesUiState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PartiesUiState> {
        self.state.clone()
    }

    /// The list updates through its live query once the delete commits.
    pub async fn delete_party(&self, party: &Party) -> Result<(), Error> {
        self.repository.delete_party(party).await
    }
}

async fn drive(
    mut parties: Live<Vec<PartyWithMembers>>,
    mut pokemon: Live<Vec<Pokemon>>,
    tx: watch::Sender<PartiesUiState>,
) {
    let mut latest_parties = None;
    let mut latest_pokemon = None;
    loop {
        tokio::select! {
            next = parties.next() => match next {
                Some(snapshot) => latest_parties = Some(snapshot),
                None => return,
            },
            next = pokemon.next() => match next {
                Some(snapshot) => latest_pokemon = Some(snapshot),
                None => return,
            },
        }
        if let (Some(parties), Some(pokemon)) = (&latest_parties, &latest_pokemon) {
            tx.send_replace(PartiesUiState::Ready(resolve_parties(parties, pokemon)));
        }
    }
}

fn resolve_parties(parties: &[PartyWithMembers], pokemon: &[Pokemon]) -> Vec<PartyWithPokemon> {
    let by_id: HashMap<PokemonId, &Pokemon> =
        pokemon.iter().map(|entry| (entry.id, entry)).collect();
    parties
        .iter()
        .map(|entry| PartyWithPokemon {
            party: entry.party.clone(),
            pokemon: entry
                .pokemon_ids()
                .iter()
                .filter_map(|id| by_id.get(id).map(|found| (*found).clone()))
                .collect(),
        })
        .collect()
}
