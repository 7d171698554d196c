//! gRPC client for the `services.v1.Compiler` service.
//!
//! Hand-rolled equivalent of what `tonic-build` would generate for the
//! `CompileStream` method, specialized to [`tonic::transport::Channel`].

use tonic::codec::{ProstCodec, Streaming};
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;
use tonic::{IntoStreamingRequest, Response, Status};

use crate::{CompileRequest, CompilerRequest};

const COMPILE_STREAM_PATH: &str = "/services.v1.Compiler/CompileStream";

/// Client for the compiler service.
#[derive(Debug, Clone)]
pub struct CompilerClient {
    inner: tonic::client::Grpc<Channel>,
}

impl CompilerClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Open the bidirectional compile stream.
    ///
    /// The caller owns both halves: it feeds `request` (usually backed by
    /// an mpsc channel) and reads responses from the returned stream.
    pub async fn compile_stream(
        &mut self,
        request: impl IntoStreamingRequest<Message = CompileRequest>,
    ) -> Result<Response<Streaming<CompilerRequest>>, Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unknown(format!("service was not ready: {e}")))?;
        let codec: ProstCodec<CompileRequest, CompilerRequest> = ProstCodec::default();
        let path = PathAndQuery::from_static(COMPILE_STREAM_PATH);
        self.inner
            .streaming(request.into_streaming_request(), path, codec)
            .await
    }
}
