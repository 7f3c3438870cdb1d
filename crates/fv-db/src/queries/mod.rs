//! Query functions, grouped by table. Each takes a borrowed [`rusqlite::Connection`].

pub mod films;
