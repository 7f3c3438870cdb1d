//! Catalog row types.

use fv_core::ProgramId;
use serde::{Deserialize, Serialize};

/// One film as the catalog stores it. Only `full_path` matters for streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilmRecord {
    pub programid: ProgramId,
    pub full_path: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub movieyear: Option<i32>,
}
