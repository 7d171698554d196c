//! Wire contract for the mlr compiler service.
//!
//! One compile is a single bidirectional gRPC stream: the client sends
//! [`CompileRequest`] messages and the service answers with
//! [`CompilerRequest`] messages ("requests" from the compiler back to the
//! client, asking for imports or table schemas) until it produces SQL or
//! gives up.
//!
//! The message types are written by hand with `prost` derives so the
//! workspace carries no build-time protoc dependency; the layout matches
//! the `services.v1` protobuf definitions the service speaks.

pub mod client;

pub use client::CompilerClient;

/// A source document carried over the wire.
///
/// `url` uses the `mlr://` display scheme; `content` is the full text of
/// the document. Immutable once created.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompileDocument {
    #[prost(string, tag = "1")]
    pub url: String,
    #[prost(string, tag = "2")]
    pub content: String,
}

/// Client-to-service message. Exactly one variant is active per message,
/// selected by `type`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompileRequest {
    #[prost(enumeration = "compile_request::Type", tag = "1")]
    pub r#type: i32,
    /// Root model document (COMPILE only).
    #[prost(message, optional, tag = "2")]
    pub document: Option<CompileDocument>,
    /// Resolved import documents (REFERENCES only).
    #[prost(message, repeated, tag = "3")]
    pub references: Vec<CompileDocument>,
    /// JSON `{"schemas": {tableId: structDef}}` (TABLE_SCHEMAS only).
    #[prost(string, tag = "4")]
    pub schema: String,
    /// Inline query text (COMPILE only, exclusive with `named_query`).
    #[prost(string, tag = "5")]
    pub query: String,
    /// Named query selector (COMPILE only, exclusive with `query`).
    #[prost(string, tag = "6")]
    pub named_query: String,
}

pub mod compile_request {
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum Type {
        Compile = 0,
        References = 1,
        TableSchemas = 2,
    }
}

/// Service-to-client message. `IMPORT` and `TABLE_SCHEMAS` ask the client
/// to supply more input; `COMPLETE` and `UNKNOWN` are terminal.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompilerRequest {
    #[prost(enumeration = "compiler_request::Type", tag = "1")]
    pub r#type: i32,
    /// Documents the service still needs (IMPORT only).
    #[prost(string, repeated, tag = "2")]
    pub import_urls: Vec<String>,
    /// Table identifiers to resolve (TABLE_SCHEMAS only).
    #[prost(string, repeated, tag = "3")]
    pub table_schemas: Vec<String>,
    /// Generated SQL (COMPLETE) or diagnostic text (UNKNOWN).
    #[prost(string, tag = "4")]
    pub content: String,
}

pub mod compiler_request {
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum Type {
        Unknown = 0,
        Import = 1,
        TableSchemas = 2,
        Complete = 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn request_roundtrip() {
        let mut request = CompileRequest {
            document: Some(CompileDocument {
                url: "mlr://flights.mlr".to_string(),
                content: "source: flights is table('db.flights')".to_string(),
            }),
            named_query: "by_carrier".to_string(),
            ..Default::default()
        };
        request.set_type(compile_request::Type::Compile);

        let bytes = request.encode_to_vec();
        let decoded = CompileRequest::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, request);
        assert_eq!(decoded.r#type(), compile_request::Type::Compile);
    }

    #[test]
    fn unknown_enum_value_classifies_as_unknown() {
        let response = CompilerRequest {
            r#type: 42,
            ..Default::default()
        };
        assert_eq!(response.r#type(), compiler_request::Type::Unknown);
    }

    #[test]
    fn encoding_is_deterministic_for_equal_messages() {
        let make = || CompilerRequest {
            r#type: compiler_request::Type::Import as i32,
            import_urls: vec!["a.mlr".to_string(), "b.mlr".to_string()],
            ..Default::default()
        };
        assert_eq!(make().encode_to_vec(), make().encode_to_vec());
    }
}
