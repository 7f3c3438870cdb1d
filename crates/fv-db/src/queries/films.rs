//! Film lookups.

use fv_core::{Error, ProgramId, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::models::FilmRecord;

/// Fetch a film by program id. Ids stored as integers match their decimal text.
pub fn get_film_by_programid(conn: &Connection, id: &ProgramId) -> Result<Option<FilmRecord>> {
    conn.query_row(
        "SELECT full_path, title, movieyear FROM films
         WHERE CAST(programid AS TEXT) = ?1
         LIMIT 1",
        [id.as_str()],
        |row| {
            Ok(FilmRecord {
                programid: id.clone(),
                full_path: row.get(0)?,
                title: row.get(1)?,
                movieyear: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}
