// Party details: one party and its members resolved in position order.
use std::sync::Arc;

use tokio::sync::watch;

use crate::catalog::{Catalog, Pokemon, PokemonId};
use crate::core::error::Error;
use crate::core::live::Live;
use crate::parties::model::{Party, PartyId, PartyWithMembers};
use crate::parties::repository::PartiesRepository;
use crate::ui::{Driver, resolve_in_order};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PartyDetailsUiState {
    Loading,
    Ready { party: Party, pokemon: Vec<Pokemon> },
    /// The party does not exist, or was deleted while observed.
    Error,
}

pub struct PartyDetailsViewModel {
    party_id: PartyId,
    repository: PartiesRepository,
    state: watch::Receiver<PartyDetailsUiState>,
    _driver: Driver,
}

impl PartyDetailsViewModel {
    pub fn new(repository: PartiesRepository, catalog: Arc<dyn Catalog>, party_id: PartyId) -> Self {
        let party = repository.get_party_with_members(party_id);
        let (tx, state) = watch::channel(PartyDetailsUiState::Loading);
        Self {
            party_id,
            repository,
            state,
            _driver: Driver::spawn(drive(catalog, party, tx)),
        }
    }

    pub fn party_id(&self) -> PartyId {
        self.party_id
    }

    pub fn state(&self) -> PartyDetailsUiState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PartyDetailsUiState> {
        self.state.clone()
    }

    /// Delete the shown party. Returns `false` without writing unless the
    /// state is `Ready`.
    pub async fn delete_party(&self) -> Result<bool, Error> {
        let party = match &*self.state.borrow() {
            PartyDetailsUiState::Ready { party, .. } => party.clone(),
            _ => return Ok(false),
        };
        self.repository.delete_party(&party).await?;
        Ok(true)
    }
}

async fn drive(
    catalog: Arc<dyn Catalog>,
    mut party: Live<Option<PartyWithMembers>>,
    tx: watch::Sender<PartyDetailsUiState>,
) {
    let mut shown: Option<Party> = None;
    let mut member_ids: Vec<PokemonId> = Vec::new();
    let mut members: Option<Live<Vec<Pokemon>>> = None;
    let mut entries: Option<Vec<Pokemon>> = None;
    loop {
        tokio::select! {
            next = party.next() => {
                let Some(snapshot) = next else { return };
                let Some(found) = snapshot else {
                    shown = None;
                    members = None;
                    entries = None;
                    tx.send_replace(PartyDetailsUiState::Error);
                    continue;
                };
                let ids = found.pokemon_ids();
                if members.is_none() || ids != member_ids {
                    // Switch to the new member set; drop the old resolution.
                    members = Some(catalog.entries_by_ids(&ids));
                    member_ids = ids;
                    entries = None;
                }
                shown = Some(found.party);
            }
            next = next_entries(&mut members) => {
                let Some(resolved) = next else { return };
                entries = Some(resolved);
            }
        }
        if let (Some(party), Some(entries)) = (&shown, &entries) {
            tx.send_replace(PartyDetailsUiState::Ready {
                party: party.clone(),
                pokemon: resolve_in_order(&member_ids, entries),
            });
        }
    }
}

async fn next_entries(members: &mut Option<Live<Vec<Pokemon>>>) -> Option<Vec<Pokemon>> {
    match members {
        Some(live) => live.next().await,
        None => std::future::pending().await,
    }
}
