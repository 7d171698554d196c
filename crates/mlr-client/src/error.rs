//! Error types for the compile-protocol driver.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can end a compile session without SQL.
///
/// All of these are handled inside the session: none escape as panics,
/// and `get_sql` maps each to a single failure surface for the caller.
/// Retrying with a fresh session is the caller's decision.
#[derive(Error, Debug)]
pub enum Error {
    #[error("compiler service did not become ready in time")]
    ServiceUnavailable,

    #[error("compile stream transport failure: {0}")]
    Transport(#[from] tonic::Status),

    #[error("compiler service repeated a response, aborting compile loop")]
    LoopDetected,

    #[error("compiler service could not proceed: {0}")]
    Unresolved(String),

    #[error("referenced document not found: {0}")]
    DocumentNotFound(PathBuf),

    #[error("schema resolution failed: {0}")]
    SchemaResolution(String),

    #[error("query execution failed: {0}")]
    QueryExecution(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
