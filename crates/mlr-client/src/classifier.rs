//! Inbound response classification and the loop guard.
//!
//! A compiler that cannot resolve a request may keep repeating it
//! forever. Every response is digested before processing; a digest seen
//! before ends the session as a detected loop rather than letting the
//! conversation spin.

use prost::Message;
use sha2::{Digest, Sha256};

use mlr_protocol::{compiler_request, CompilerRequest};

use crate::error::{Error, Result};
use crate::session::SessionState;

/// Record one inbound response against the session state.
///
/// Terminal outcomes: `COMPLETE` stores the SQL and marks the session
/// completed; `UNKNOWN` is the service saying it cannot proceed and
/// surfaces the diagnostic. `IMPORT` and `TABLE_SCHEMAS` park the
/// response for the producer's next turn.
pub(crate) fn observe(state: &mut SessionState, response: CompilerRequest) -> Result<()> {
    if !state.seen_responses.insert(digest(&response)) {
        tracing::warn!("duplicate compiler response, treating as a request loop");
        return Err(Error::LoopDetected);
    }

    match response.r#type() {
        compiler_request::Type::Complete => {
            tracing::debug!("compile completed");
            state.completed = true;
            state.result_sql = Some(response.content);
            Ok(())
        }
        compiler_request::Type::Unknown => {
            state.completed = true;
            Err(Error::Unresolved(response.content))
        }
        compiler_request::Type::Import | compiler_request::Type::TableSchemas => {
            state.last_response = Some(response);
            Ok(())
        }
    }
}

/// Content digest for loop detection.
///
/// Hashes our own prost encoding of the decoded message, not the bytes
/// the server happened to send, so two structurally equal responses
/// always digest identically.
fn digest(response: &CompilerRequest) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(response.encode_to_vec());
    hasher.finalize().into()
}
