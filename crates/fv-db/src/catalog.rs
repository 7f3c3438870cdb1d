//! The lookup-by-id seam the stream orchestrator consumes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use fv_core::config::{CatalogConfig, CatalogSource};
use fv_core::{Error, ProgramId, Result};

use crate::models::FilmRecord;
use crate::pool::{self, DbPool};
use crate::queries;

/// Source of film records.
///
/// `Ok(None)` means the id is unknown; `Err` means the backend itself failed.
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    async fn lookup(&self, id: &ProgramId) -> Result<Option<FilmRecord>>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Open the catalog backend named by the configuration.
pub fn open_catalog(config: &CatalogConfig) -> Result<Arc<dyn Catalog>> {
    let catalog: Arc<dyn Catalog> = match config.source {
        CatalogSource::Json => Arc::new(JsonCatalog::load(&config.path)?),
        CatalogSource::Sqlite => Arc::new(SqliteCatalog::new(pool::init_pool(&config.path)?)),
    };
    tracing::info!(
        backend = catalog.name(),
        path = %config.path.display(),
        "Catalog opened"
    );
    Ok(catalog)
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// An in-memory catalog loaded from a JSON array of film objects.
#[derive(Debug, Default)]
pub struct JsonCatalog {
    films: HashMap<String, FilmRecord>,
}

impl JsonCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::from_open(e, path.display()))?;
        Self::from_json(&contents)
    }

    /// Parse a JSON array. Entries that are not valid film records are
    /// skipped with a warning; the first record wins on duplicate ids.
    pub fn from_json(json: &str) -> Result<Self> {
        let rows: Vec<serde_json::Value> = serde_json::from_str(json)
            .map_err(|e| Error::database(format!("catalog JSON parse error: {e}")))?;

        let mut films = HashMap::with_capacity(rows.len());
        for (idx, row) in rows.into_iter().enumerate() {
            match serde_json::from_value::<FilmRecord>(row) {
                Ok(film) => {
                    films
                        .entry(film.programid.as_str().to_string())
                        .or_insert(film);
                }
                Err(e) => tracing::warn!(index = idx, "Skipping catalog entry: {e}"),
            }
        }
        tracing::debug!(count = films.len(), "JSON catalog loaded");
        Ok(Self { films })
    }

    pub fn len(&self) -> usize {
        self.films.len()
    }

    pub fn is_empty(&self) -> bool {
        self.films.is_empty()
    }
}

#[async_trait::async_trait]
impl Catalog for JsonCatalog {
    async fn lookup(&self, id: &ProgramId) -> Result<Option<FilmRecord>> {
        Ok(self.films.get(id.as_str()).cloned())
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// A catalog backed by a `films` table in SQLite.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    pool: DbPool,
}

impl SqliteCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Catalog for SqliteCatalog {
    async fn lookup(&self, id: &ProgramId) -> Result<Option<FilmRecord>> {
        let pool = self.pool.clone();
        let id = id.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool::get_conn(&pool)?;
            queries::films::get_film_by_programid(&conn, &id)
        })
        .await
        .map_err(|e| Error::Internal(format!("catalog lookup task failed: {e}")))?
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILMS: &str = r#"[
        {"programid": "MV000111", "full_path": "/films/Heat/Heat.mkv.txt", "title": "Heat", "movieyear": 1995},
        {"programid": 42, "full_path": "/films/Alien/Alien.mp4", "image": "ignored.jpg"},
        {"programid": "MV000111", "full_path": "/dup.mp4"},
        {"title": "no id"}
    ]"#;

    #[tokio::test]
    async fn json_lookup() {
        let cat = JsonCatalog::from_json(FILMS).unwrap();
        assert_eq!(cat.len(), 2);

        let heat = cat.lookup(&"MV000111".parse().unwrap()).await.unwrap().unwrap();
        assert_eq!(heat.full_path, "/films/Heat/Heat.mkv.txt");
        assert_eq!(heat.movieyear, Some(1995));

        let alien = cat.lookup(&"42".parse().unwrap()).await.unwrap().unwrap();
        assert_eq!(alien.full_path, "/films/Alien/Alien.mp4");

        assert!(cat.lookup(&"404".parse().unwrap()).await.unwrap().is_none());
    }

    #[test]
    fn json_must_be_an_array() {
        assert!(matches!(
            JsonCatalog::from_json(r#"{"films": []}"#),
            Err(Error::Database { .. })
        ));
    }

    #[tokio::test]
    async fn sqlite_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("films.db");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE films (programid TEXT, full_path TEXT, title TEXT, movieyear INTEGER);
                 INSERT INTO films VALUES ('7', '/films/Brazil/Brazil.avi', 'Brazil', 1985);",
            )
            .unwrap();

        let cat = open_catalog(&CatalogConfig {
            source: CatalogSource::Sqlite,
            path,
        })
        .unwrap();
        assert_eq!(cat.name(), "sqlite");

        let film = cat.lookup(&"7".parse().unwrap()).await.unwrap().unwrap();
        assert_eq!(film.full_path, "/films/Brazil/Brazil.avi");
        assert!(cat.lookup(&"8".parse().unwrap()).await.unwrap().is_none());
    }

    #[test]
    fn open_missing_json_is_not_found() {
        let err = open_catalog(&CatalogConfig {
            source: CatalogSource::Json,
            path: "/nonexistent/films_data.json".into(),
        })
        .err()
        .unwrap();
        assert_eq!(err.http_status(), 404);
    }
}
