//! Purpose: Open a local pokedexer database and hand out repositories and view-models.
//! Exports: `Client`.
//! Role: Stable entry point for the CLI and embedders; mirrors CLI path rules.
//! Invariants: One `Client` owns one `Store`; everything it returns shares it.
//! Invariants: The bundled catalog is seeded at most once, into an empty table.
use std::path::Path;
use std::sync::Arc;

use crate::catalog::{Catalog, StoreCatalog};
use crate::config::Config;
use crate::core::error::Error;
use crate::core::store::Store;
use crate::parties::model::PartyId;
use crate::parties::repository::PartiesRepository;
use crate::ui::create::CreatePartyViewModel;
use crate::ui::details::PartyDetailsViewModel;
use crate::ui::parties::PartiesViewModel;

#[derive(Clone)]
pub struct Client {
    store: Store,
    catalog: StoreCatalog,
    parties: PartiesRepository,
}

impl Client {
    /// Open (or create) the database described by `config`.
    pub async fn open(config: &Config) -> Result<Self, Error> {
        let store = Store::open(&config.db_path(), config.store_options.clone())?;
        let client = Self::from_store(store);
        if config.seed_catalog {
            client.catalog.seed_if_empty().await?;
        }
        Ok(client)
    }

    pub fn from_store(store: Store) -> Self {
        Self {
            catalog: StoreCatalog::new(store.clone()),
            parties: PartiesRepository::new(store.clone()),
            store,
        }
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.store.path()
    }

    pub fn catalog(&self) -> &StoreCatalog {
        &self.catalog
    }

    pub fn parties(&self) -> &PartiesRepository {
        &self.parties
    }

    pub fn parties_view(&self) -> PartiesViewModel {
        PartiesViewModel::new(self.parties.clone(), self.shared_catalog())
    }

    pub fn party_details_view(&self, party_id: PartyId) -> PartyDetailsViewModel {
        PartyDetailsViewModel::new(self.parties.clone(), self.shared_catalog(), party_id)
    }

    /// Create mode for `None`, edit mode for `Some(id)`.
    pub async fn create_party_view(
        &self,
        party_id: Option<PartyId>,
    ) -> Result<CreatePartyViewModel, Error> {
        CreatePartyViewModel::open(self.parties.clone(), self.shared_catalog(), party_id).await
    }

    fn shared_catalog(&self) -> Arc<dyn Catalog> {
        Arc::new(self.catalog.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::Client;
    use crate::catalog::{Catalog, PokemonId};
    use crate::config::Config;
    use crate::ui::create::SaveOutcome;
    use crate::ui::parties::PartiesUiState;

    #[tokio::test]
    async fn open_seeds_once_and_persists_parties() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::with_data_dir(dir.path());
        let client = Client::open(&config).await.expect("open");
        assert_eq!(client.db_path(), Some(config.db_path().as_path()));
        assert_eq!(
            client.catalog().entries().next().await.expect("catalog").len(),
            151
        );

        let editor = client.create_party_view(None).await.expect("editor");
        editor.update_name("Kanto");
        let bulbasaur = editor
            .subscribe_pokemon_list()
            .wait_for(|list| !list.is_empty())
            .await
            .expect("list")[0]
            .clone();
        assert_eq!(bulbasaur.id, PokemonId(1));
        assert!(editor.add_pokemon(&bulbasaur));
        let SaveOutcome::Created(id) = editor.save_party().await.expect("save") else {
            panic!("expected created");
        };
        drop(editor);
        drop(client);

        let reopened = Client::open(&config).await.expect("reopen");
        let view = reopened.parties_view();
        let mut state = view.subscribe();
        let ready = state
            .wait_for(|state| matches!(state, PartiesUiState::Ready(parties) if !parties.is_empty()))
            .await
            .expect("ready")
            .clone();
        let PartiesUiState::Ready(parties) = ready else {
            panic!("expected ready");
        };
        assert_eq!(parties[0].party.id, id);
        assert_eq!(parties[0].pokemon[0].name, "Bulbasaur");
    }
}
