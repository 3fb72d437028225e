#![forbid(unsafe_code)]

use async_trait::async_trait;
use cota_sync_core::{Measurement, Space, SpaceId, UserId};
use serde::{Deserialize, Serialize};

mod memory;
mod rest;

pub use memory::MemorySpaceStore;
pub use rest::{RestSpaceStore, RestStoreConfig, StaticTokenProvider};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("space not found")]
    SpaceNotFound,
    #[error("revision conflict: store is at revision {current}")]
    RevisionConflict { current: i64 },
    #[error("unauthorized")]
    Unauthorized,
    #[error("document store unreachable: {0}")]
    Transport(String),
    #[error("document store error: {0}")]
    Backend(String),
    #[error("document store returned an unexpected payload")]
    InvalidResponse,
}

impl StoreError {
    /// Transient failures are worth retrying; everything else is permanent
    /// from the client's point of view.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transport(_))
    }
}

// ---------------------------------------------------------------------------
// Write inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSpace {
    pub name: String,
    pub icon: String,
}

/// Partial update for a space document. Nested edits always carry the entire
/// replacement measurement array: measurements and boxes are embedded fields,
/// so the store never patches inside them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpacePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measurements: Option<Vec<Measurement>>,
}

impl SpacePatch {
    #[must_use]
    pub fn measurements(measurements: Vec<Measurement>) -> Self {
        Self {
            measurements: Some(measurements),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Store boundary
// ---------------------------------------------------------------------------

/// Per-user collection of space documents. The store is authoritative for
/// `created_at`, `updated_at`, and `revision`: every write returns the stored
/// document, and callers replace their local copy with it wholesale.
#[async_trait]
pub trait SpaceStore: Send + Sync {
    /// All spaces for the owner, ordered by `created_at` descending.
    async fn list_spaces(&self, owner: UserId) -> Result<Vec<Space>, StoreError>;
    async fn get_space(&self, owner: UserId, id: SpaceId) -> Result<Space, StoreError>;
    async fn create_space(&self, owner: UserId, draft: NewSpace) -> Result<Space, StoreError>;
    /// Applies the patch only when the stored revision still equals
    /// `expected_revision`; otherwise fails with `RevisionConflict`.
    async fn update_space(
        &self,
        owner: UserId,
        id: SpaceId,
        patch: SpacePatch,
        expected_revision: i64,
    ) -> Result<Space, StoreError>;
    /// Deleting a space removes its embedded measurements and boxes with it.
    async fn delete_space(&self, owner: UserId, id: SpaceId) -> Result<(), StoreError>;
}

/// Narrow seam for bearer tokens so the store does not depend on the identity
/// crate; the application adapts its identity provider to this.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::{SpacePatch, StoreError};

    #[test]
    fn transport_errors_are_transient() {
        assert!(StoreError::Transport("connection reset".to_owned()).is_transient());
        assert!(!StoreError::SpaceNotFound.is_transient());
        assert!(!StoreError::RevisionConflict { current: 4 }.is_transient());
        assert!(!StoreError::Backend("boom".to_owned()).is_transient());
    }

    #[test]
    fn empty_patch_serializes_to_empty_object() {
        let json = serde_json::to_string(&SpacePatch::default()).expect("encode");
        assert_eq!(json, "{}");
    }

    #[test]
    fn measurements_patch_omits_untouched_fields() {
        let json = serde_json::to_value(SpacePatch::measurements(Vec::new())).expect("encode");
        assert!(json.get("name").is_none());
        assert!(json.get("icon").is_none());
        assert_eq!(json["measurements"], serde_json::json!([]));
    }
}
