//! Purpose: Draft a new party, or edit an existing one, and save it.
//! Exports: `CreatePartyViewModel`, `PartyDraft`, `SaveOutcome`.
//! Role: Owns the in-progress selection; persists only on `save_party`.
//! Invariants: The draft holds at most `MAX_PARTY_SIZE` members, unique by id.
//! Invariants: The draft is a copy; edits never touch the stored party until saved.
use std::sync::Arc;

use tokio::sync::watch;

use crate::catalog::{Catalog, Pokemon, PokemonId, filter_by_name};
use crate::core::error::{Error, ErrorKind};
use crate::core::live::Live;
use crate::parties::model::{MAX_PARTY_SIZE, PartyId};
use crate::parties::repository::PartiesRepository;
use crate::ui::{Driver, resolve_in_order};

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PartyDraft {
    pub name: String,
    /// Selection order becomes member position on save.
    pub selected: Vec<Pokemon>,
}

impl PartyDraft {
    pub fn is_full(&self) -> bool {
        self.selected.len() >= MAX_PARTY_SIZE
    }

    pub fn contains(&self, id: PokemonId) -> bool {
        self.selected.iter().any(|entry| entry.id == id)
    }

    pub fn can_save(&self) -> bool {
        !self.name.trim().is_empty() && !self.selected.is_empty()
    }

    pub fn pokemon_ids(&self) -> Vec<PokemonId> {
        self.selected.iter().map(|entry| entry.id).collect()
    }

    fn add(&mut self, pokemon: &Pokemon) -> bool {
        if self.is_full() || self.contains(pokemon.id) {
            return false;
        }
        self.selected.push(pokemon.clone());
        true
    }

    fn remove(&mut self, id: PokemonId) -> bool {
        let before = self.selected.len();
        self.selected.retain(|entry| entry.id != id);
        self.selected.len() != before
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SaveOutcome {
    Created(PartyId),
    Updated(PartyId),
    /// Blank name or empty selection; nothing was written.
    Incomplete,
}

pub struct CreatePartyViewModel {
    repository: PartiesRepository,
    editing: Option<PartyId>,
    draft: watch::Sender<PartyDraft>,
    search_text: watch::Sender<String>,
    pokemon_list: watch::Receiver<Vec<Pokemon>>,
    _driver: Driver,
}

impl CreatePartyViewModel {
    /// A view-model drafting a brand new party.
    pub fn new(repository: PartiesRepository, catalog: Arc<dyn Catalog>) -> Self {
        Self::with_draft(repository, catalog, None, PartyDraft::default())
    }

    /// Open in create mode (`None`) or edit mode (`Some(id)`). Edit mode copies
    /// the stored name and members into the draft and fails with `NotFound`
    /// when the party does not exist.
    pub async fn open(
        repository: PartiesRepository,
        catalog: Arc<dyn Catalog>,
        party_id: Option<PartyId>,
    ) -> Result<Self, Error> {
        let Some(id) = party_id else {
            return Ok(Self::new(repository, catalog));
        };
        let draft = hydrate(&repository, catalog.as_ref(), id).await?;
        tracing::debug!(party = id.0, members = draft.selected.len(), "editing party");
        Ok(Self::with_draft(repository, catalog, Some(id), draft))
    }

    fn with_draft(
        repository: PartiesRepository,
        catalog: Arc<dyn Catalog>,
        editing: Option<PartyId>,
        draft: PartyDraft,
    ) -> Self {
        let (search_text, search_rx) = watch::channel(String::new());
        let (list_tx, pokemon_list) = watch::channel(Vec::new());
        let (draft, _) = watch::channel(draft);
        let driver = Driver::spawn(drive_pokemon_list(catalog.entries(), search_rx, list_tx));
        Self {
            repository,
            editing,
            draft,
            search_text,
            pokemon_list,
            _driver: driver,
        }
    }

    /// The party being edited, if any.
    pub fn editing(&self) -> Option<PartyId> {
        self.editing
    }

    pub fn draft(&self) -> PartyDraft {
        self.draft.borrow().clone()
    }

    pub fn subscribe_draft(&self) -> watch::Receiver<PartyDraft> {
        self.draft.subscribe()
    }

    pub fn search_text(&self) -> String {
        self.search_text.borrow().clone()
    }

    /// Catalog entries matching the search text; empty until the catalog loads.
    pub fn pokemon_list(&self) -> Vec<Pokemon> {
        self.pokemon_list.borrow().clone()
    }

    pub fn subscribe_pokemon_list(&self) -> watch::Receiver<Vec<Pokemon>> {
        self.pokemon_list.clone()
    }

    pub fn update_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.draft.send_if_modified(|draft| {
            if draft.name == name {
                return false;
            }
            draft.name = name;
            true
        });
    }

    pub fn update_search_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.search_text.send_if_modified(|current| {
            if *current == text {
                return false;
            }
            *current = text;
            true
        });
    }

    /// Returns `false` when the draft is full or already holds `pokemon`.
    pub fn add_pokemon(&self, pokemon: &Pokemon) -> bool {
        self.draft.send_if_modified(|draft| draft.add(pokemon))
    }

    pub fn remove_pokemon(&self, pokemon: &Pokemon) -> bool {
        self.draft.send_if_modified(|draft| draft.remove(pokemon.id))
    }

    /// Clear the draft and search text unless an existing party is being edited.
    pub fn reset_if_new(&self) {
        if self.editing.is_some() {
            return;
        }
        self.draft.send_replace(PartyDraft::default());
        self.update_search_text(String::new());
    }

    pub fn can_save(&self) -> bool {
        self.draft.borrow().can_save()
    }

    pub async fn save_party(&self) -> Result<SaveOutcome, Error> {
        let draft = self.draft();
        if !draft.can_save() {
            return Ok(SaveOutcome::Incomplete);
        }
        let ids = draft.pokemon_ids();
        match self.editing {
            Some(id) => {
                self.repository.update_party(id, &draft.name, &ids).await?;
                Ok(SaveOutcome::Updated(id))
            }
            None => {
                let id = self.repository.create_party(&draft.name, &ids).await?;
                Ok(SaveOutcome::Created(id))
            }
        }
    }
}

async fn hydrate(
    repository: &PartiesRepository,
    catalog: &dyn Catalog,
    id: PartyId,
) -> Result<PartyDraft, Error> {
    let stored = repository
        .get_party_with_members(id)
        .try_next()
        .await?
        .ok_or_else(|| {
            Error::new(ErrorKind::NotFound)
                .with_message("party not found")
                .with_party_id(id.0)
        })?;
    let ids = stored.pokemon_ids();
    let entries = catalog
        .entries_by_ids(&ids)
        .try_next()
        .await?;
    Ok(PartyDraft {
        name: stored.party.name,
        selected: resolve_in_order(&ids, &entries),
    })
}

async fn drive_pokemon_list(
    mut pokemon: Live<Vec<Pokemon>>,
    mut search: watch::Receiver<String>,
    tx: watch::Sender<Vec<Pokemon>>,
) {
    let mut entries: Option<Vec<Pokemon>> = None;
    loop {
        tokio::select! {
            next = pokemon.next() => match next {
                Some(snapshot) => entries = Some(snapshot),
                None => return,
            },
            changed = search.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
        if let Some(entries) = &entries {
            let query = search.borrow_and_update().clone();
            tx.send_replace(filter_by_name(entries, &query));
        }
    }
}
