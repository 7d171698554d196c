//! Contract for schema/query connections.
//!
//! This module defines the seam between the protocol driver and whatever
//! warehouse adapter backs a session. The driver only ever calls the two
//! capabilities below; it knows nothing about the adapter's
//! implementation.
//!
//! ## Schema JSON
//!
//! Table schemas travel to the compiler as a JSON string shaped
//! `{"schemas": {tableId: structDef}}`. [`StructDef`] and friends model
//! the normalized struct description the compiler expects, with camelCase
//! keys on the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Fetches structural schema for a set of table identifiers.
///
/// One call covers exactly the identifiers the compiler asked for in a
/// single `TABLE_SCHEMAS` round.
#[allow(async_fn_in_trait)]
pub trait SchemaProvider {
    type Error: std::fmt::Display;

    async fn fetch_schemas(
        &self,
        tables: &[String],
    ) -> std::result::Result<BTreeMap<String, StructDef>, Self::Error>;
}

/// Executes generated SQL and returns a result set.
///
/// The result type is opaque to the driver; a columnar adapter might
/// return record batches, an embedded engine its own row type.
#[allow(async_fn_in_trait)]
pub trait QueryRunner {
    type Results;
    type Error: std::fmt::Display;

    async fn run_query(&self, sql: &str) -> std::result::Result<Self::Results, Self::Error>;
}

/// The `{"schemas": ...}` envelope serialized into a TABLE_SCHEMAS
/// request. `BTreeMap` keeps key order deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaResponse {
    pub schemas: BTreeMap<String, StructDef>,
}

/// Normalized description of one table's structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructDef {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub dialect: String,
    pub struct_source: StructSource,
    pub struct_relationship: StructRelationship,
    pub fields: Vec<FieldDef>,
}

impl StructDef {
    /// A base-table struct definition, the only shape the compiler asks
    /// this client to produce.
    pub fn table(
        name: impl Into<String>,
        dialect: impl Into<String>,
        table_path: impl Into<String>,
        connection_name: impl Into<String>,
        fields: Vec<FieldDef>,
    ) -> Self {
        Self {
            kind: "struct".to_string(),
            name: name.into(),
            dialect: dialect.into(),
            struct_source: StructSource {
                kind: "table".to_string(),
                table_path: table_path.into(),
            },
            struct_relationship: StructRelationship {
                kind: "basetable".to_string(),
                connection_name: connection_name.into(),
            },
            fields,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub table_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructRelationship {
    #[serde(rename = "type")]
    pub kind: String,
    pub connection_name: String,
}

/// One column of a table schema.
///
/// A column whose source type the adapter could not map is emitted with
/// no `type` key at all; the adapter reports the gap (it is not fatal).
/// Dialect-specific keys ride along in `attributes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub field_type: Option<String>,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: Some(field_type.into()),
            attributes: serde_json::Map::new(),
        }
    }

    /// A column with an unmapped source type.
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: None,
            attributes: serde_json::Map::new(),
        }
    }
}
