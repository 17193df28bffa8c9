//! Structure forest builder
//!
//! Introspection queries return flat `(schema, name[, kind])` rows. This
//! module groups them into one node per schema. Groups are keyed in a
//! `BTreeMap` and leaves are sorted, so identical input always produces the
//! identical forest.

use crate::database::client::expect_text;
use crate::database::traits::DriverError;
use crate::schema::{Row, Structure, StructureType};
use crate::stream::ResultStream;
use std::collections::BTreeMap;

/// Drain an introspection stream into a structure forest
pub fn build_forest(rows: &mut ResultStream) -> Result<Vec<Structure>, DriverError> {
    let mut leaves = Vec::new();
    let mut index = 0;
    while rows.has_next() {
        leaves.push(leaf_from_row(index, rows.next_row()?)?);
        index += 1;
    }
    Ok(group_by_schema(leaves))
}

/// Decode one `(schema, name[, kind])` row into a leaf
pub fn leaf_from_row(index: usize, row: Row) -> Result<Structure, DriverError> {
    if row.len() != 2 && row.len() != 3 {
        return Err(DriverError::MalformedRow {
            index,
            reason: format!("expected (schema, name[, kind]), got {} columns", row.len()),
        });
    }

    let mut values = row.into_iter().enumerate();
    let mut next_text = || match values.next() {
        Some((position, value)) => expect_text(index, position, value).map(Some),
        None => Ok(None),
    };

    let schema = next_text()?.unwrap_or_default();
    let name = next_text()?.unwrap_or_default();
    let kind = match next_text()? {
        Some(kind) if kind.eq_ignore_ascii_case("view") => StructureType::View,
        _ => StructureType::Table,
    };

    Ok(Structure::leaf(schema, name, kind))
}

/// Group leaves into one node per schema, sorted by schema and leaf name
pub fn group_by_schema(leaves: impl IntoIterator<Item = Structure>) -> Vec<Structure> {
    let mut schemas: BTreeMap<String, Vec<Structure>> = BTreeMap::new();
    for leaf in leaves {
        schemas.entry(leaf.schema.clone()).or_default().push(leaf);
    }

    schemas
        .into_iter()
        .map(|(schema, mut children)| {
            children.sort_by(|left, right| {
                left.name
                    .cmp(&right.name)
                    .then_with(|| left.kind.cmp(&right.kind))
            });
            Structure::group(schema, children)
        })
        .collect()
}
