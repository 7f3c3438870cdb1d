//! # fv-db
//!
//! Film catalog access. The streaming path only ever asks one question,
//! "where is the file for this program id?", answered by a [`Catalog`]
//! backed either by a static JSON export or a SQLite database.

pub mod catalog;
pub mod models;
pub mod pool;
pub mod queries;

pub use catalog::{open_catalog, Catalog, JsonCatalog, SqliteCatalog};
pub use models::FilmRecord;
