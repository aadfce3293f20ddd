use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Connection, Node, SheetId, VersionId};

/// Frozen copy of a sheet's node list. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSnapshot {
    pub id: VersionId,
    pub sheet_id: SheetId,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

/// List form of a version (no node list).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub id: VersionId,
    pub sheet_id: SheetId,
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Advisory only: never applied to existing references automatically.
    #[serde(default)]
    pub is_default: bool,
}

impl VersionSnapshot {
    pub fn summary(&self, is_default: bool) -> VersionSummary {
        VersionSummary {
            id: self.id.clone(),
            sheet_id: self.sheet_id.clone(),
            tag: self.tag.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
            is_default,
        }
    }
}

/// A sheet's live draft as served by the backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetDefinition {
    pub id: SheetId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}
