//! Purpose: Read-only reference catalog of Pokemon entries consumed by the parties slice.
//! Exports: `Pokemon`, `PokemonId`, `Catalog`, `StoreCatalog`, `filter_by_name`, `bundled_entries`.
//! Role: Reference Data Provider; parties read from it but never write to it.
//! Invariants: Entry ids are stable; member rows cascade away when an entry is removed.
//! Invariants: The bundled catalog is seeded only into an empty `pokemon` table.
use rusqlite::{Connection, params, params_from_iter};
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind, from_sqlite};
use crate::core::live::{Live, Table};
use crate::core::store::Store;

const BUNDLED_CATALOG: &str = include_str!("../data/catalog.json");

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PokemonId(pub i64);

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Pokemon {
    pub id: PokemonId,
    pub name: String,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub category: String,
}

/// Live access to the reference catalog.
pub trait Catalog: Send + Sync {
    /// Every entry, ordered by id.
    fn entries(&self) -> Live<Vec<Pokemon>>;

    /// The entries whose ids are in `ids`, in no particular order. Unknown ids
    /// are skipped.
    fn entries_by_ids(&self, ids: &[PokemonId]) -> Live<Vec<Pokemon>>;
}

/// Entries whose name contains `query`, ignoring case. A blank query keeps
/// everything; otherwise the query is matched as typed, spaces included.
pub fn filter_by_name(entries: &[Pokemon], query: &str) -> Vec<Pokemon> {
    if query.trim().is_empty() {
        return entries.to_vec();
    }
    let needle = query.to_lowercase();
    entries
        .iter()
        .filter(|entry| entry.name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

pub fn parse_entries(json: &str) -> Result<Vec<Pokemon>, Error> {
    let entries: Vec<Pokemon> = serde_json::from_str(json).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid catalog json")
            .with_hint("Expect a JSON array of {\"id\", \"name\", \"types\", \"category\"} objects.")
            .with_source(err)
    })?;
    if let Some(entry) = entries.iter().find(|entry| entry.name.trim().is_empty()) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("catalog entry {} has a blank name", entry.id.0)));
    }
    Ok(entries)
}

/// The Generation I catalog shipped with the crate.
pub fn bundled_entries() -> Result<Vec<Pokemon>, Error> {
    parse_entries(BUNDLED_CATALOG).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("bundled catalog is malformed")
            .with_source(err)
    })
}

/// Catalog backed by the `pokemon` table of a [`Store`].
#[derive(Clone)]
pub struct StoreCatalog {
    store: Store,
}

impl StoreCatalog {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Upsert `entries` by id. Returns the number of entries written.
    pub async fn import(&self, entries: Vec<Pokemon>) -> Result<usize, Error> {
        self.store
            .run_blocking(move |store| {
                store.write(&[Table::Pokemon], |tx| {
                    let mut stmt = tx
                        .prepare(
                            "INSERT INTO pokemon (id, name, types, category)
                             VALUES (?1, ?2, ?3, ?4)
                             ON CONFLICT(id) DO UPDATE SET
                                name = excluded.name,
                                types = excluded.types,
                                category = excluded.category",
                        )
                        .map_err(|err| from_sqlite(err, "failed to prepare catalog import"))?;
                    for entry in &entries {
                        let types = serde_json::to_string(&entry.types).map_err(|err| {
                            Error::new(ErrorKind::Internal)
                                .with_message("failed to encode types")
                                .with_source(err)
                        })?;
                        stmt.execute(params![entry.id.0, entry.name, types, entry.category])
                            .map_err(|err| from_sqlite(err, "failed to import catalog entry"))?;
                    }
                    Ok(entries.len())
                })
            })
            .await
    }

    /// Seed the bundled catalog when the table is empty. Returns whether it seeded.
    pub async fn seed_if_empty(&self) -> Result<bool, Error> {
        let count = self
            .store
            .run_blocking(|store| {
                store.read(|conn| {
                    conn.query_row("SELECT COUNT(*) FROM pokemon", [], |row| row.get::<_, i64>(0))
                        .map_err(|err| from_sqlite(err, "failed to count catalog entries"))
                })
            })
            .await?;
        if count > 0 {
            return Ok(false);
        }
        let written = self.import(bundled_entries()?).await?;
        tracing::info!(entries = written, "seeded bundled catalog");
        Ok(true)
    }

    /// Remove one entry; party members referencing it cascade away.
    pub async fn remove(&self, id: PokemonId) -> Result<bool, Error> {
        self.store
            .run_blocking(move |store| {
                store.write(&[Table::Pokemon, Table::PartyMembers], |tx| {
                    let removed = tx
                        .execute("DELETE FROM pokemon WHERE id = ?1", params![id.0])
                        .map_err(|err| from_sqlite(err, "failed to remove catalog entry"))?;
                    Ok(removed > 0)
                })
            })
            .await
    }
}

impl Catalog for StoreCatalog {
    fn entries(&self) -> Live<Vec<Pokemon>> {
        self.store.observe("pokemon", &[Table::Pokemon], |conn| {
            query_entries(conn, "SELECT id, name, types, category FROM pokemon ORDER BY id", &[])
        })
    }

    fn entries_by_ids(&self, ids: &[PokemonId]) -> Live<Vec<Pokemon>> {
        let mut ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        ids.sort_unstable();
        ids.dedup();
        let key = format!("pokemon_by_ids:{ids:?}");
        self.store.observe(key, &[Table::Pokemon], move |conn| {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; ids.len()].join(", ");
            let sql = format!(
                "SELECT id, name, types, category FROM pokemon WHERE id IN ({placeholders}) ORDER BY id"
            );
            query_entries(conn, &sql, &ids)
        })
    }
}

fn query_entries(conn: &Connection, sql: &str, ids: &[i64]) -> Result<Vec<Pokemon>, Error> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|err| from_sqlite(err, "failed to prepare catalog query"))?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter()), |row| {
            let types: String = row.get(2)?;
            let types: Vec<String> = serde_json::from_str(&types).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            })?;
            Ok(Pokemon {
                id: PokemonId(row.get(0)?),
                name: row.get(1)?,
                types,
                category: row.get(3)?,
            })
        })
        .map_err(|err| from_sqlite(err, "failed to query catalog"))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|err| from_sqlite(err, "failed to read catalog row"))
}

#[cfg(test)]
mod tests {
    use super::{
        Catalog, Pokemon, PokemonId, StoreCatalog, bundled_entries, filter_by_name, parse_entries,
    };
    use crate::core::error::{ErrorKind, from_sqlite};
    use crate::core::live::Table;
    use crate::core::store::{Store, StoreOptions};
    use std::time::Duration;

    fn entry(id: i64, name: &str) -> Pokemon {
        Pokemon {
            id: PokemonId(id),
            name: name.to_string(),
            types: Vec::new(),
            category: String::new(),
        }
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let entries = vec![
            entry(1, "Bulbasaur"),
            entry(4, "Charmander"),
            entry(7, "Squirtle"),
        ];
        let names = |found: Vec<Pokemon>| {
            found.into_iter().map(|entry| entry.name).collect::<Vec<_>>()
        };

        assert_eq!(names(filter_by_name(&entries, "ar")), vec!["Charmander"]);
        assert_eq!(names(filter_by_name(&entries, "SQUIR")), vec!["Squirtle"]);
        assert_eq!(
            names(filter_by_name(&entries, "")),
            vec!["Bulbasaur", "Charmander", "Squirtle"]
        );
        assert_eq!(names(filter_by_name(&entries, "   ")).len(), 3);
        assert!(filter_by_name(&entries, " ar").is_empty());
    }

    #[test]
    fn bundled_catalog_covers_generation_one() {
        let entries = bundled_entries().expect("bundled");
        assert_eq!(entries.len(), 151);
        assert_eq!(entries[0].name, "Bulbasaur");
        assert_eq!(entries[150].id, PokemonId(151));
    }

    #[test]
    fn parse_rejects_blank_names() {
        let err = parse_entries(r#"[{"id": 1, "name": " "}]"#).expect_err("blank");
        assert_eq!(err.kind(), ErrorKind::Usage);
        let err = parse_entries("{").expect_err("malformed");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[tokio::test]
    async fn seed_then_lookup_by_ids() {
        let store = Store::in_memory(StoreOptions::default()).expect("store");
        let catalog = StoreCatalog::new(store);
        assert!(catalog.seed_if_empty().await.expect("seed"));
        assert!(!catalog.seed_if_empty().await.expect("second seed"));

        let mut all = catalog.entries();
        assert_eq!(all.next().await.expect("entries").len(), 151);

        let mut some = catalog.entries_by_ids(&[PokemonId(7), PokemonId(1), PokemonId(999)]);
        let found = some.next().await.expect("by ids");
        let ids: Vec<_> = found.iter().map(|entry| entry.id).collect();
        assert_eq!(ids, vec![PokemonId(1), PokemonId(7)]);
        assert_eq!(found[0].types, vec!["Grass", "Poison"]);
    }

    #[tokio::test]
    async fn import_upserts_and_remove_reemits() {
        let store = Store::in_memory(StoreOptions::default()).expect("store");
        let catalog = StoreCatalog::new(store);
        catalog
            .import(vec![entry(1, "Bulbasaur"), entry(4, "Charmander")])
            .await
            .expect("import");
        catalog
            .import(vec![entry(4, "Charizard")])
            .await
            .expect("upsert");

        let mut live = catalog.entries();
        let names: Vec<_> = live
            .next()
            .await
            .expect("entries")
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        assert_eq!(names, vec!["Bulbasaur", "Charizard"]);

        assert!(catalog.remove(PokemonId(1)).await.expect("remove"));
        assert!(!catalog.remove(PokemonId(1)).await.expect("remove again"));
        assert_eq!(live.next().await.expect("after remove").len(), 1);
    }

    #[tokio::test]
    async fn unreadable_rows_fail_the_query() {
        let store = Store::in_memory(StoreOptions::default()).expect("store");
        store
            .write(&[Table::Pokemon], |tx| {
                tx.execute(
                    "INSERT INTO pokemon (id, name, types) VALUES (1, 'Bulbasaur', 'not json')",
                    [],
                )
                .map_err(|err| from_sqlite(err, "insert"))?;
                Ok(())
            })
            .expect("insert");
        let catalog = StoreCatalog::new(store);

        let err = tokio::time::timeout(Duration::from_secs(3), catalog.entries().try_next())
            .await
            .expect("resolved")
            .expect_err("corrupt row");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }
}
