//! Purpose: Live reads and transactional writes for parties and their members.
//! Exports: `PartiesRepository`.
//! Role: Sole owner of party transaction boundaries; view-models never touch SQL.
//! Invariants: Every write is one transaction; members are replaced wholesale, never merged.
//! Invariants: Member positions are the dense index of the id list passed in.
#![allow(clippy::result_large_err)]

use std::collections::{HashMap, HashSet};

use rusqlite::{Connection, OptionalExtension, Transaction, params};

use crate::catalog::PokemonId;
use crate::core::error::{Error, ErrorKind, from_sqlite};
use crate::core::live::{Live, Table};
use crate::core::store::Store;
use crate::parties::model::{
    MAX_PARTY_SIZE, Party, PartyId, PartyMember, PartyWithMembers, members_for,
};

const PARTY_TABLES: &[Table] = &[Table::Parties, Table::PartyMembers];

#[derive(Clone)]
pub struct PartiesRepository {
    store: Store,
}

impl PartiesRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn list_parties(&self) -> Live<Vec<Party>> {
        self.store.observe("parties", &[Table::Parties], load_parties)
    }

    pub fn list_parties_with_members(&self) -> Live<Vec<PartyWithMembers>> {
        self.store
            .observe("parties_with_members", PARTY_TABLES, |conn| {
                let parties = load_parties(conn)?;
                let mut members = load_all_members(conn)?;
                Ok(parties
                    .into_iter()
                    .map(|party| PartyWithMembers {
                        members: members.remove(&party.id).unwrap_or_default(),
                        party,
                    })
                    .collect())
            })
    }

    /// Emits `None` while no party with `id` exists.
    pub fn get_party_with_members(&self, id: PartyId) -> Live<Option<PartyWithMembers>> {
        self.store
            .observe(format!("party_with_members:{}", id.0), PARTY_TABLES, move |conn| {
                let Some(party) = load_party(conn, id)? else {
                    return Ok(None);
                };
                let members = load_members(conn, id)?;
                Ok(Some(PartyWithMembers { party, members }))
            })
    }

    /// Insert a new party whose members follow the order of `pokemon_ids`.
    pub async fn create_party(
        &self,
        name: &str,
        pokemon_ids: &[PokemonId],
    ) -> Result<PartyId, Error> {
        validate_selection(name, pokemon_ids)?;
        let name = name.to_string();
        let pokemon_ids = pokemon_ids.to_vec();
        let party_id = self
            .store
            .run_blocking(move |store| {
                store.write(PARTY_TABLES, |tx| {
                    tx.execute("INSERT INTO parties (name) VALUES (?1)", params![name])
                        .map_err(|err| from_sqlite(err, "failed to insert party"))?;
                    let party_id = PartyId(tx.last_insert_rowid());
                    insert_members(tx, &members_for(party_id, &pokemon_ids))?;
                    Ok(party_id)
                })
            })
            .await?;
        tracing::debug!(party = party_id.0, "party created");
        Ok(party_id)
    }

    /// Replace the party row and its entire member set.
    pub async fn update_party(
        &self,
        id: PartyId,
        name: &str,
        pokemon_ids: &[PokemonId],
    ) -> Result<(), Error> {
        if id.is_unsaved() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("cannot update a party that was never saved")
                .with_hint("Create the party first."));
        }
        validate_selection(name, pokemon_ids).map_err(|err| err.with_party_id(id.0))?;
        let name = name.to_string();
        let pokemon_ids = pokemon_ids.to_vec();
        self.store
            .run_blocking(move |store| {
                store.write(PARTY_TABLES, |tx| {
                    tx.execute(
                        "INSERT INTO parties (id, name) VALUES (?1, ?2)
                         ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                        params![id.0, name],
                    )
                    .map_err(|err| from_sqlite(err, "failed to upsert party").with_party_id(id.0))?;
                    tx.execute(
                        "DELETE FROM party_members WHERE party_id = ?1",
                        params![id.0],
                    )
                    .map_err(|err| {
                        from_sqlite(err, "failed to clear party members").with_party_id(id.0)
                    })?;
                    insert_members(tx, &members_for(id, &pokemon_ids))
                })
            })
            .await?;
        tracing::debug!(party = id.0, "party updated");
        Ok(())
    }

    /// Delete the party; its member rows cascade away.
    pub async fn delete_party(&self, party: &Party) -> Result<(), Error> {
        let id = party.id;
        let removed = self
            .store
            .run_blocking(move |store| {
                store.write(PARTY_TABLES, |tx| {
                    tx.execute("DELETE FROM parties WHERE id = ?1", params![id.0])
                        .map_err(|err| from_sqlite(err, "failed to delete party").with_party_id(id.0))
                })
            })
            .await?;
        tracing::debug!(party = id.0, removed, "party deleted");
        Ok(())
    }
}

fn validate_selection(name: &str, pokemon_ids: &[PokemonId]) -> Result<(), Error> {
    if name.trim().is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("party name must not be blank"));
    }
    if pokemon_ids.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("party needs at least one member"));
    }
    if pokemon_ids.len() > MAX_PARTY_SIZE {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!(
                "party has {} members; at most {MAX_PARTY_SIZE} are allowed",
                pokemon_ids.len()
            )));
    }
    let mut seen = HashSet::new();
    if let Some(duplicate) = pokemon_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("pokemon {} appears more than once", duplicate.0)));
    }
    Ok(())
}

fn insert_members(tx: &Transaction<'_>, members: &[PartyMember]) -> Result<(), Error> {
    let mut stmt = tx
        .prepare(
            "INSERT OR REPLACE INTO party_members (party_id, pokemon_id, position)
             VALUES (?1, ?2, ?3)",
        )
        .map_err(|err| from_sqlite(err, "failed to prepare member insert"))?;
    for member in members {
        stmt.execute(params![member.party_id.0, member.pokemon_id.0, member.position])
            .map_err(|err| {
                from_sqlite(err, format!("failed to insert member {}", member.pokemon_id.0))
                    .with_party_id(member.party_id.0)
                    .with_hint("Check that every pokemon id exists in the catalog.")
            })?;
    }
    Ok(())
}

fn load_parties(conn: &Connection) -> Result<Vec<Party>, Error> {
    let mut stmt = conn
        .prepare("SELECT id, name FROM parties ORDER BY id")
        .map_err(|err| from_sqlite(err, "failed to prepare party query"))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Party {
                id: PartyId(row.get(0)?),
                name: row.get(1)?,
            })
        })
        .map_err(|err| from_sqlite(err, "failed to query parties"))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|err| from_sqlite(err, "failed to read party row"))
}

fn load_party(conn: &Connection, id: PartyId) -> Result<Option<Party>, Error> {
    conn.query_row(
        "SELECT id, name FROM parties WHERE id = ?1",
        params![id.0],
        |row| {
            Ok(Party {
                id: PartyId(row.get(0)?),
                name: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(|err| from_sqlite(err, "failed to query party").with_party_id(id.0))
}

fn member_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PartyMember> {
    Ok(PartyMember {
        party_id: PartyId(row.get(0)?),
        pokemon_id: PokemonId(row.get(1)?),
        position: row.get(2)?,
    })
}

fn load_members(conn: &Connection, id: PartyId) -> Result<Vec<PartyMember>, Error> {
    let mut stmt = conn
        .prepare(
            "SELECT party_id, pokemon_id, position FROM party_members
             WHERE party_id = ?1 ORDER BY position",
        )
        .map_err(|err| from_sqlite(err, "failed to prepare member query"))?;
    let rows = stmt
        .query_map(params![id.0], member_from_row)
        .map_err(|err| from_sqlite(err, "failed to query members").with_party_id(id.0))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|err| from_sqlite(err, "failed to read member row").with_party_id(id.0))
}

fn load_all_members(conn: &Connection) -> Result<HashMap<PartyId, Vec<PartyMember>>, Error> {
    let mut stmt = conn
        .prepare(
            "SELECT party_id, pokemon_id, position FROM party_members
             ORDER BY party_id, position",
        )
        .map_err(|err| from_sqlite(err, "failed to prepare member query"))?;
    let rows = stmt
        .query_map([], member_from_row)
        .map_err(|err| from_sqlite(err, "failed to query members"))?;
    let mut grouped: HashMap<PartyId, Vec<PartyMember>> = HashMap::new();
    for row in rows {
        let member = row.map_err(|err| from_sqlite(err, "failed to read member row"))?;
        grouped.entry(member.party_id).or_default().push(member);
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::PartiesRepository;
    use crate::catalog::{PokemonId, StoreCatalog};
    use crate::core::error::{ErrorKind, from_sqlite};
    use crate::core::store::{Store, StoreOptions};
    use crate::parties::model::{Party, PartyId, PartyMember};

    async fn fixture() -> (Store, PartiesRepository, StoreCatalog) {
        let store = Store::in_memory(StoreOptions::default()).expect("store");
        let catalog = StoreCatalog::new(store.clone());
        catalog.seed_if_empty().await.expect("seed");
        (store.clone(), PartiesRepository::new(store), catalog)
    }

    fn ids(raw: &[i64]) -> Vec<PokemonId> {
        raw.iter().map(|id| PokemonId(*id)).collect()
    }

    fn member_rows(store: &Store, party_id: PartyId) -> i64 {
        store
            .read(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM party_members WHERE party_id = ?1",
                    [party_id.0],
                    |row| row.get(0),
                )
                .map_err(|err| from_sqlite(err, "count"))
            })
            .expect("count")
    }

    #[tokio::test]
    async fn create_positions_members_by_input_order() {
        let (_store, repo, _catalog) = fixture().await;
        let id = repo
            .create_party("Starters", &ids(&[1, 4, 7]))
            .await
            .expect("create");

        let found = repo
            .get_party_with_members(id)
            .next()
            .await
            .expect("emission")
            .expect("party exists");
        assert_eq!(
            found.party,
            Party {
                id,
                name: "Starters".to_string()
            }
        );
        assert_eq!(
            found.members,
            vec![
                PartyMember {
                    party_id: id,
                    pokemon_id: PokemonId(1),
                    position: 0
                },
                PartyMember {
                    party_id: id,
                    pokemon_id: PokemonId(4),
                    position: 1
                },
                PartyMember {
                    party_id: id,
                    pokemon_id: PokemonId(7),
                    position: 2
                },
            ]
        );
    }

    #[tokio::test]
    async fn update_replaces_members_wholesale() {
        let (_store, repo, _catalog) = fixture().await;
        let id = repo
            .create_party("Starters", &ids(&[1, 4, 7]))
            .await
            .expect("create");
        repo.update_party(id, "Evolved", &ids(&[9, 1]))
            .await
            .expect("update");

        let found = repo
            .get_party_with_members(id)
            .next()
            .await
            .expect("emission")
            .expect("party exists");
        assert_eq!(found.party.name, "Evolved");
        assert_eq!(found.pokemon_ids(), ids(&[9, 1]));
        let positions: Vec<_> = found.members.iter().map(|member| member.position).collect();
        assert_eq!(positions, vec![0, 1]);
    }

    #[tokio::test]
    async fn delete_cascades_to_members() {
        let (store, repo, _catalog) = fixture().await;
        let id = repo
            .create_party("Doomed", &ids(&[25, 133]))
            .await
            .expect("create");
        assert_eq!(member_rows(&store, id), 2);

        let party = Party {
            id,
            name: "Doomed".to_string(),
        };
        repo.delete_party(&party).await.expect("delete");
        assert_eq!(member_rows(&store, id), 0);
        assert_eq!(
            repo.get_party_with_members(id).next().await,
            Some(None)
        );
    }

    #[tokio::test]
    async fn removing_a_catalog_entry_cascades_to_members() {
        let (store, repo, catalog) = fixture().await;
        let id = repo
            .create_party("Trio", &ids(&[1, 4, 7]))
            .await
            .expect("create");
        catalog.remove(PokemonId(4)).await.expect("remove");
        assert_eq!(member_rows(&store, id), 2);
    }

    #[tokio::test]
    async fn unknown_pokemon_fails_the_whole_write() {
        let (store, repo, _catalog) = fixture().await;
        let err = repo
            .create_party("Ghosts", &ids(&[1, 9999]))
            .await
            .expect_err("foreign key");
        assert_eq!(err.kind(), ErrorKind::Constraint);
        let parties: i64 = store
            .read(|conn| {
                conn.query_row("SELECT COUNT(*) FROM parties", [], |row| row.get(0))
                    .map_err(|err| from_sqlite(err, "count"))
            })
            .expect("count");
        assert_eq!(parties, 0);

        let id = repo
            .create_party("Kept", &ids(&[1, 4]))
            .await
            .expect("create");
        let err = repo
            .update_party(id, "Kept", &ids(&[7, 9999]))
            .await
            .expect_err("foreign key");
        assert_eq!(err.kind(), ErrorKind::Constraint);
        let found = repo
            .get_party_with_members(id)
            .next()
            .await
            .expect("emission")
            .expect("party exists");
        assert_eq!(found.pokemon_ids(), ids(&[1, 4]));
    }

    #[tokio::test]
    async fn invalid_selections_are_rejected_before_writing() {
        let (_store, repo, _catalog) = fixture().await;
        let cases: Vec<(&str, Vec<PokemonId>)> = vec![
            ("  ", ids(&[1])),
            ("Empty", Vec::new()),
            ("Crowded", ids(&[1, 2, 3, 4, 5, 6, 7])),
            ("Twins", ids(&[25, 25])),
        ];
        for (name, members) in cases {
            let err = repo
                .create_party(name, &members)
                .await
                .expect_err("invalid selection");
            assert_eq!(err.kind(), ErrorKind::Usage, "case {name:?}");
        }
        let err = repo
            .update_party(PartyId::UNSAVED, "Nope", &ids(&[1]))
            .await
            .expect_err("unsaved");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[tokio::test]
    async fn live_reads_follow_later_writes() {
        let (_store, repo, _catalog) = fixture().await;
        let mut all = repo.list_parties_with_members();
        let mut names = repo.list_parties();
        assert_eq!(all.next().await, Some(Vec::new()));
        assert_eq!(names.next().await, Some(Vec::new()));

        let id = repo
            .create_party("Starters", &ids(&[1, 4, 7]))
            .await
            .expect("create");
        let snapshot = all.next().await.expect("after create");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].party.id, id);
        assert_eq!(snapshot[0].pokemon_ids(), ids(&[1, 4, 7]));
        assert_eq!(names.next().await.expect("names").len(), 1);

        let mut single = repo.get_party_with_members(id);
        assert!(single.next().await.expect("first").is_some());
        repo.update_party(id, "Starters", &ids(&[7]))
            .await
            .expect("update");
        let updated = single.next().await.expect("after update").expect("exists");
        assert_eq!(updated.pokemon_ids(), ids(&[7]));
    }
}
