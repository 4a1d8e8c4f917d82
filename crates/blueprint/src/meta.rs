//! Out-of-band metadata kept in Postgres object comments.
//!
//! Column, table and foreign-key comments carry a small JSON object. Comments
//! that aren't such an object are treated as carrying no metadata.

use blueprint_schema::{Capability, Column, Relation, Table};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// Decode a comment, `None` when it isn't ours.
fn decode<T: DeserializeOwned>(comment: Option<&str>) -> Option<T> {
    let value: Value = serde_json::from_str(comment?).ok()?;
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value).ok()
}

fn encode<T: Serialize>(meta: &T) -> Option<String> {
    serde_json::to_string(meta).ok()
}

/// Metadata attached to a column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Capability bitmask.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub capabilities: u32,
    /// Value-transformer bitmask, owned by the ORM layer and passed through untouched.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub transformers: u32,
}

impl ColumnMeta {
    pub fn for_column(column: &Column) -> Self {
        Self {
            alias: column.alias.clone(),
            capabilities: column.capability.map(|c| c.bit()).unwrap_or(0),
            transformers: column.transformers.unwrap_or(0),
        }
    }

    pub fn decode(comment: Option<&str>) -> Option<Self> {
        decode(comment)
    }

    /// The comment text, `None` when there is nothing to store.
    pub fn encode(&self) -> Option<String> {
        if self.alias.is_none() && self.capabilities == 0 && self.transformers == 0 {
            return None;
        }
        encode(self)
    }

    /// The single capability in the mask.
    pub fn capability(&self) -> Result<Option<Capability>> {
        if self.capabilities == 0 {
            return Ok(None);
        }
        match Capability::ALL
            .iter()
            .find(|c| c.bit() == self.capabilities)
        {
            Some(c) => Ok(Some(*c)),
            None => Err(Error::Metadata(format!(
                "capability mask {:#x} must name exactly one known capability",
                self.capabilities
            ))),
        }
    }
}

/// Metadata attached to a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl TableMeta {
    pub fn for_table(table: &Table) -> Self {
        Self {
            meta: table.meta.clone(),
        }
    }

    pub fn decode(comment: Option<&str>) -> Option<Self> {
        decode(comment)
    }

    pub fn encode(&self) -> Option<String> {
        self.meta.as_ref()?;
        encode(self)
    }
}

/// Metadata attached to a foreign key constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl RelationMeta {
    pub fn for_relation(relation: &Relation) -> Self {
        Self {
            alias: relation.alias.clone(),
        }
    }

    pub fn decode(comment: Option<&str>) -> Option<Self> {
        decode(comment)
    }

    pub fn encode(&self) -> Option<String> {
        self.alias.as_ref()?;
        encode(self)
    }
}
