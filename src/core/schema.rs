// Relational schema for the catalog and the parties tables.
use rusqlite::Connection;

use crate::core::error::{Error, ErrorKind, from_sqlite};

/// Bumped whenever the DDL below changes shape; stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

pub const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS pokemon (
    id       INTEGER PRIMARY KEY,
    name     TEXT NOT NULL,
    types    TEXT NOT NULL DEFAULT '[]',
    category TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS parties (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS party_members (
    party_id   INTEGER NOT NULL REFERENCES parties(id) ON DELETE CASCADE,
    pokemon_id INTEGER NOT NULL REFERENCES pokemon(id) ON DELETE CASCADE,
    position   INTEGER NOT NULL,
    PRIMARY KEY (party_id, pokemon_id)
);

CREATE INDEX IF NOT EXISTS index_party_members_party_id ON party_members(party_id);
CREATE INDEX IF NOT EXISTS index_party_members_pokemon_id ON party_members(pokemon_id);
";

pub(crate) fn apply(conn: &Connection) -> Result<(), Error> {
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|err| from_sqlite(err, "failed to read schema version"))?;
    if version > SCHEMA_VERSION {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_message(format!(
                "database schema version {version} is newer than supported {SCHEMA_VERSION}"
            ))
            .with_hint("Upgrade pokedexer or point --dir at a different data directory."));
    }

    conn.execute_batch(SCHEMA_SQL)
        .map_err(|err| from_sqlite(err, "failed to apply schema"))?;

    if version < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(|err| from_sqlite(err, "failed to record schema version"))?;
        tracing::info!(from = version, to = SCHEMA_VERSION, "schema initialised");
    }
    Ok(())
}
