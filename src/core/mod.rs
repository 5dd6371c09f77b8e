// Core modules implementing storage, live queries, and error modeling.
pub mod error;
pub mod live;
pub mod schema;
pub mod store;
