//! Compile-protocol driver for the mlr compiler service.
//!
//! Turning a model plus a query into SQL takes a multi-round conversation
//! with the compiler over a bidirectional stream: the service may ask for
//! imported documents or table schemas before it can finish. This crate
//! owns that conversation. [`CompileSession`] drives the stream turn by
//! turn, resolving documents and schemas lazily, detecting looping
//! responses, and terminating with either generated SQL or a classified
//! [`Error`].
//!
//! Schema and query connections are external collaborators: anything that
//! implements [`SchemaProvider`] (and optionally [`QueryRunner`]) can back
//! a session. The compiler process itself is reached through a
//! [`ServiceConfig`], either a running endpoint or a locally spawned
//! subprocess.

mod classifier;
mod connection;
mod document;
mod error;
mod producer;
mod readiness;
mod session;

pub use connection::{
    FieldDef, QueryRunner, SchemaProvider, SchemaResponse, StructDef, StructRelationship,
    StructSource,
};
pub use document::{ModelSource, URL_SCHEME};
pub use error::{Error, Result};
pub use producer::{QuerySpec, RequestProducer};
pub use readiness::{ServiceConfig, DEFAULT_READY_TIMEOUT};
pub use session::{drive, CompileSession, CompileTransport, SessionState};
