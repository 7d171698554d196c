//! The compile session state machine.
//!
//! One session drives one compile attempt over one stream. The flow is a
//! single cooperative loop with two suspension points: waiting for the
//! readiness gate and waiting for the next inbound response. Requests and
//! responses strictly alternate; the driver never has two requests in
//! flight and never processes two responses back to back.
//!
//! The session is deliberately not an iterator feeding the RPC layer.
//! The stream is modeled as explicit `send`/`recv` over the
//! [`CompileTransport`] seam, which also makes the whole protocol
//! drivable by scripted transports in tests.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;

use mlr_protocol::{CompileRequest, CompilerClient, CompilerRequest};

use crate::classifier;
use crate::connection::{QueryRunner, SchemaProvider};
use crate::document::ModelSource;
use crate::error::{Error, Result};
use crate::producer::{QuerySpec, RequestProducer};
use crate::readiness::{self, ServiceConfig};

/// Mutable state of one compile attempt.
///
/// Owned exclusively by one session; concurrent compiles each get their
/// own state, stream, and readiness wait.
#[derive(Debug, Default)]
pub struct SessionState {
    pub(crate) first_request_sent: bool,
    pub(crate) last_response: Option<CompilerRequest>,
    pub(crate) seen_responses: HashSet<[u8; 32]>,
    pub(crate) completed: bool,
    pub(crate) result_sql: Option<String>,
}

impl SessionState {
    pub fn completed(&self) -> bool {
        self.completed
    }

    pub fn result_sql(&self) -> Option<&str> {
        self.result_sql.as_deref()
    }

    pub fn into_sql(self) -> Option<String> {
        self.result_sql
    }
}

/// One direction-pair of the compile stream.
///
/// `recv` returning `Ok(None)` means the service closed the stream.
/// Implementations release the underlying stream when dropped.
#[allow(async_fn_in_trait)]
pub trait CompileTransport {
    async fn send(&mut self, request: CompileRequest) -> Result<()>;
    async fn recv(&mut self) -> Result<Option<CompilerRequest>>;
}

/// gRPC flavor of the transport: an mpsc sender feeding the outbound
/// request stream and the tonic inbound stream. Dropping it closes the
/// outbound half (ending the stream client-side) and releases the
/// inbound half.
struct GrpcTransport {
    outbound: mpsc::Sender<CompileRequest>,
    inbound: tonic::codec::Streaming<CompilerRequest>,
}

impl CompileTransport for GrpcTransport {
    async fn send(&mut self, request: CompileRequest) -> Result<()> {
        self.outbound
            .send(request)
            .await
            .map_err(|_| Error::Transport(Status::aborted("compile stream closed by service")))
    }

    async fn recv(&mut self) -> Result<Option<CompilerRequest>> {
        self.inbound.message().await.map_err(Error::Transport)
    }
}

/// Alternate producing requests and classifying responses until a
/// terminal response, a closed stream, or an error.
///
/// Every turn is send-then-receive, so each digest in the loop guard
/// corresponds to exactly one round.
pub async fn drive<T, P>(
    transport: &mut T,
    producer: &RequestProducer<'_, P>,
    state: &mut SessionState,
) -> Result<()>
where
    T: CompileTransport,
    P: SchemaProvider,
{
    while let Some(request) = producer.next_request(state).await? {
        transport.send(request).await?;
        match transport.recv().await? {
            Some(response) => classifier::observe(state, response)?,
            None => {
                tracing::debug!("service closed the compile stream");
                break;
            }
        }
    }
    Ok(())
}

/// A compile session: model source, service location, and the connection
/// that resolves schemas (and optionally runs the generated SQL).
///
/// Created per compile attempt and cheap to rebuild; it holds no state
/// across calls, and each `get_sql` call opens and releases its own
/// stream.
pub struct CompileSession<'a, C> {
    model: ModelSource,
    service: ServiceConfig,
    connection: &'a C,
}

impl<'a, C> CompileSession<'a, C> {
    pub fn new(model: ModelSource, service: ServiceConfig, connection: &'a C) -> Self {
        Self {
            model,
            service,
            connection,
        }
    }
}

impl<'a, C: SchemaProvider> CompileSession<'a, C> {
    /// Compile `query` against the model and return the generated SQL.
    ///
    /// Blocks on the readiness gate first; a service that never becomes
    /// ready fails with [`Error::ServiceUnavailable`] without opening the
    /// stream. The stream, channel, and any spawned compiler subprocess
    /// are released on every exit path, success or failure.
    pub async fn get_sql(&self, query: &QuerySpec) -> Result<String> {
        let ready = readiness::wait_ready(&self.service).await?;
        let mut client = CompilerClient::new(ready.channel.clone());

        // Capacity 1 is all strict alternation ever needs.
        let (outbound, rx) = mpsc::channel(1);
        let inbound = client
            .compile_stream(ReceiverStream::new(rx))
            .await?
            .into_inner();
        let mut transport = GrpcTransport { outbound, inbound };

        let producer = RequestProducer::new(&self.model, query, self.connection);
        let mut state = SessionState::default();
        let outcome = drive(&mut transport, &producer, &mut state).await;

        // Dropping the transport closes the outbound stream; dropping
        // `ready` terminates a spawned compiler subprocess.
        drop(transport);
        drop(ready);

        outcome?;
        state.into_sql().ok_or_else(|| {
            Error::Transport(Status::aborted(
                "compile stream ended before a COMPLETE response",
            ))
        })
    }
}

impl<'a, C: SchemaProvider + QueryRunner> CompileSession<'a, C> {
    /// Compile `query` and execute the resulting SQL on the connection.
    ///
    /// Short-circuits without touching the query runner when compilation
    /// fails.
    pub async fn run_query(&self, query: &QuerySpec) -> Result<C::Results> {
        let sql = self.get_sql(query).await?;
        tracing::info!("running generated query");
        self.connection
            .run_query(&sql)
            .await
            .map_err(|e| Error::QueryExecution(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::BTreeMap;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::connection::StructDef;

    /// Connection whose runner records whether it was ever invoked.
    struct TrackingConnection {
        ran: Cell<bool>,
    }

    impl SchemaProvider for TrackingConnection {
        type Error = String;

        async fn fetch_schemas(
            &self,
            _tables: &[String],
        ) -> std::result::Result<BTreeMap<String, StructDef>, String> {
            Ok(BTreeMap::new())
        }
    }

    impl QueryRunner for TrackingConnection {
        type Results = usize;
        type Error = String;

        async fn run_query(&self, _sql: &str) -> std::result::Result<usize, String> {
            self.ran.set(true);
            Ok(0)
        }
    }

    #[tokio::test]
    async fn run_query_short_circuits_when_compile_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("model.mlr"), "source: m\n").unwrap();
        let model = ModelSource::new(dir.path().join("model.mlr")).unwrap();

        // Gate never opens: the stream is never created and the runner is
        // never called.
        let service = ServiceConfig::external("http://127.0.0.1:1")
            .with_timeout(Duration::from_millis(200));
        let connection = TrackingConnection {
            ran: Cell::new(false),
        };
        let session = CompileSession::new(model, service, &connection);

        match session
            .run_query(&QuerySpec::Named("q".to_string()))
            .await
        {
            Err(Error::ServiceUnavailable) => {}
            other => panic!("expected ServiceUnavailable, got {other:?}"),
        }
        assert!(!connection.ran.get());
    }
}
