//! Purpose: Shared library crate used by the `pokedexer` CLI and tests.
//! Exports: `api` (stable surface), plus `core`, `catalog`, `parties`, `ui`, `config`.
//! Role: Party-building backend: SQLite store, live queries, and view-models.
//! Invariants: All persistence goes through `core::store::Store`.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod catalog;
pub mod config;
pub mod core;
pub mod parties;
pub mod ui;
