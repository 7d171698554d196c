//! Outbound request production.
//!
//! The producer is a function of the session state and the last
//! classified response: first turn emits `COMPILE`, an `IMPORT` response
//! turns into `REFERENCES`, a `TABLE_SCHEMAS` response turns into a
//! schema payload, and terminal responses produce nothing, which ends the
//! stream from the client side.

use mlr_protocol::{compile_request, compiler_request, CompileRequest};

use crate::connection::{SchemaProvider, SchemaResponse};
use crate::document::ModelSource;
use crate::error::{Error, Result};
use crate::session::SessionState;

/// Which query of the model to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySpec {
    /// Raw query text, compiled against the model.
    Inline(String),
    /// Name of a query defined in the model.
    Named(String),
}

/// Produces the next outbound request for a session.
///
/// Borrows the model source, the query selector, and the schema provider;
/// all session-varying data lives in [`SessionState`].
pub struct RequestProducer<'a, P> {
    model: &'a ModelSource,
    query: &'a QuerySpec,
    schemas: &'a P,
}

impl<'a, P: SchemaProvider> RequestProducer<'a, P> {
    pub fn new(model: &'a ModelSource, query: &'a QuerySpec, schemas: &'a P) -> Self {
        Self {
            model,
            query,
            schemas,
        }
    }

    /// Next request to send, or `None` when the conversation is over.
    ///
    /// A resolution failure (missing document, schema fetch error) is a
    /// producer error; the session maps it to a failed compile without
    /// issuing further requests.
    pub async fn next_request(&self, state: &mut SessionState) -> Result<Option<CompileRequest>> {
        if state.completed {
            return Ok(None);
        }
        if !state.first_request_sent {
            state.first_request_sent = true;
            return Ok(Some(self.initial_request()?));
        }
        let Some(response) = state.last_response.take() else {
            return Ok(None);
        };
        match response.r#type() {
            compiler_request::Type::Import => {
                let mut references = Vec::with_capacity(response.import_urls.len());
                for url in &response.import_urls {
                    references.push(self.model.resolve(url)?);
                }
                tracing::debug!(count = references.len(), "sending resolved references");
                Ok(Some(CompileRequest {
                    r#type: compile_request::Type::References as i32,
                    references,
                    ..Default::default()
                }))
            }
            compiler_request::Type::TableSchemas => {
                let schemas = self
                    .schemas
                    .fetch_schemas(&response.table_schemas)
                    .await
                    .map_err(|e| Error::SchemaResolution(e.to_string()))?;
                let payload = SchemaResponse { schemas };
                let schema = serde_json::to_string(&payload)
                    .map_err(|e| Error::SchemaResolution(e.to_string()))?;
                tracing::debug!(
                    tables = response.table_schemas.len(),
                    "sending table schemas"
                );
                Ok(Some(CompileRequest {
                    r#type: compile_request::Type::TableSchemas as i32,
                    schema,
                    ..Default::default()
                }))
            }
            // Terminal responses never reach here in practice (the
            // classifier ends the session first), but producing nothing
            // for them keeps this total.
            compiler_request::Type::Complete | compiler_request::Type::Unknown => Ok(None),
        }
    }

    fn initial_request(&self) -> Result<CompileRequest> {
        let document = self.model.root_document()?;
        let mut request = CompileRequest {
            r#type: compile_request::Type::Compile as i32,
            document: Some(document),
            ..Default::default()
        };
        match self.query {
            QuerySpec::Inline(text) => request.query = text.clone(),
            QuerySpec::Named(name) => request.named_query = name.clone(),
        }
        Ok(request)
    }
}
