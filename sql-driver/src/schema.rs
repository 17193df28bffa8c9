//! Schema types for dynamic database introspection
//!
//! These types describe query results, table columns and the schema layout
//! discovered at runtime. They are backend independent: every adapter shapes
//! its raw rows into these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single result row: column values in header order
pub type Row = Vec<serde_json::Value>;

/// Information about a single table column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Column name
    pub name: String,

    /// SQL data type as reported by the backend (e.g., "integer", "TEXT")
    pub data_type: String,
}

/// Identifies a table for column introspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableOptions {
    /// Table name
    pub table: String,

    /// Schema the table lives in
    pub schema: String,
}

impl TableOptions {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: schema.into(),
        }
    }
}

/// Kind of a node in the structure forest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StructureType {
    /// Table, or any other leaf that is browsed like one (routines)
    Table,

    /// View
    View,

    /// Grouping node (a schema)
    None,
}

/// A node in the two-level schema forest
///
/// Group nodes have [`StructureType::None`] and carry the members of a schema
/// as children. Leaf nodes always have another type and no children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Structure {
    /// Display name (table name for leaves, schema name for groups)
    pub name: String,

    /// Schema the node belongs to
    pub schema: String,

    /// Node kind
    #[serde(rename = "type")]
    pub kind: StructureType,

    /// Members of a group node; always empty for leaves
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Structure>,
}

impl Structure {
    /// Create a leaf node
    pub fn leaf(schema: impl Into<String>, name: impl Into<String>, kind: StructureType) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            kind,
            children: Vec::new(),
        }
    }

    /// Create a group node for a schema
    pub fn group(schema: impl Into<String>, children: Vec<Structure>) -> Self {
        let schema = schema.into();
        Self {
            name: schema.clone(),
            schema,
            kind: StructureType::None,
            children,
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind == StructureType::None
    }
}

/// Execution metadata attached to every result stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    /// Query text that produced the stream (the fallback probe if one was used)
    pub query: String,

    /// When the query was executed
    pub timestamp: DateTime<Utc>,
}

impl Meta {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Databases reachable through a driver that supports switching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseList {
    /// The currently selected database
    pub current: String,

    /// Other databases that can be selected
    pub available: Vec<String>,
}

/// Request to execute a raw SQL query
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// SQL query to execute
    pub sql: String,

    /// Per-request timeout overriding the configured one
    pub timeout_milliseconds: Option<u64>,
}

/// Result from executing a query
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// Column names in the result
    pub columns: Vec<String>,

    /// Rows returned, each in column order
    pub rows: Vec<Row>,

    /// Execution metadata
    pub meta: Meta,

    /// Whether rows were dropped because the configured row limit was hit
    pub truncated: bool,
}

/// Request to switch the active database
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectDatabaseRequest {
    /// Name of the database to connect to
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structure_serialization() {
        let group = Structure::group(
            "public",
            vec![Structure::leaf("public", "users", StructureType::Table)],
        );

        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(json["type"], "none");
        assert_eq!(json["children"][0]["type"], "table");
        assert!(json["children"][0].get("children").is_none());
    }

    #[test]
    fn test_group_node_uses_schema_as_name() {
        let group = Structure::group("sales", Vec::new());
        assert_eq!(group.name, "sales");
        assert_eq!(group.schema, "sales");
        assert!(group.is_group());
    }
}
