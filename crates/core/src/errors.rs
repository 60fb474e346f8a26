use std::path::PathBuf;

use thiserror::Error;

use crate::domain::product::ProductId;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not read catalogue file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse catalogue: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("catalogue is empty")]
    Empty,
    #[error("catalogue contains duplicate product id {0}")]
    DuplicateId(ProductId),
}

/// Failure of a single recovery tier. The pipeline falls through to the next
/// tier on any of these.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("text is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("JSON value is not an object")]
    NotAnObject,
    #[error("missing or mistyped key `{0}`")]
    MissingKey(&'static str),
    #[error("no object containing both `reply` and `recommended_ids` was found")]
    NoEmbeddedObject,
    #[error("neither a reply nor recommended ids could be salvaged")]
    Unrecoverable,
}
