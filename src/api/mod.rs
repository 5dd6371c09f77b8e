//! Purpose: Define the stable public Rust API boundary for pokedexer.
//! Exports: Client, domain types, view-models, and the error model.
//! Role: Public, additive-only surface used by the CLI and integration tests.
//! Invariants: Everything re-exported here is safe to depend on across releases.

mod client;

pub use crate::catalog::{Catalog, Pokemon, PokemonId, StoreCatalog, filter_by_name};
pub use crate::config::Config;
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::live::{Live, Table};
pub use crate::core::store::{Store, StoreOptions};
pub use crate::parties::model::{MAX_PARTY_SIZE, Party, PartyId, PartyMember, PartyWithMembers};
pub use crate::parties::repository::PartiesRepository;
pub use crate::ui::create::{CreatePartyViewModel, PartyDraft, SaveOutcome};
pub use crate::ui::details::{PartyDetailsUiState, PartyDetailsViewModel};
pub use crate::ui::parties::{PartiesUiState, PartiesViewModel, PartyWithPokemon};
pub use client::Client;
