// Party rows, member rows, and the party-with-members composite.
use serde::{Deserialize, Serialize};

use crate::catalog::PokemonId;

/// Most members a saved party may hold.
pub const MAX_PARTY_SIZE: usize = 6;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(pub i64);

impl PartyId {
    /// Id of a party that has not been persisted yet.
    pub const UNSAVED: PartyId = PartyId(0);

    pub fn is_unsaved(self) -> bool {
        self == Self::UNSAVED
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub name: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PartyMember {
    pub party_id: PartyId,
    pub pokemon_id: PokemonId,
    pub position: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PartyWithMembers {
    pub party: Party,
    /// Sorted by `position`.
    pub members: Vec<PartyMember>,
}

impl PartyWithMembers {
    /// Member ids in position order.
    pub fn pokemon_ids(&self) -> Vec<PokemonId> {
        let mut members = self.members.clone();
        members.sort_by_key(|member| member.position);
        members.into_iter().map(|member| member.pokemon_id).collect()
    }
}

/// Member rows for `ids`, positioned by their index.
pub(crate) fn members_for(party_id: PartyId, ids: &[PokemonId]) -> Vec<PartyMember> {
    ids.iter()
        .enumerate()
        .map(|(index, pokemon_id)| PartyMember {
            party_id,
            pokemon_id: *pokemon_id,
            position: index as u32,
        })
        .collect()
}
