// Parties slice: data model and repository.
pub mod model;
pub mod repository;
