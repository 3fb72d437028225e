use std::collections::{HashMap, VecDeque};
use std::time::SystemTime;

use async_trait::async_trait;
use cota_sync_core::{Space, SpaceId, UserId};
use tokio::sync::RwLock;

use crate::{NewSpace, SpacePatch, SpaceStore, StoreError};

#[derive(Default)]
struct MemoryState {
    // Newest space first within each owner; ties on created_at keep this order.
    spaces: HashMap<UserId, Vec<Space>>,
    injected_failures: VecDeque<StoreError>,
}

/// In-process document store for tests and offline development. Stamps
/// `created_at`/`updated_at`/`revision` the way the hosted store does, and can
/// be primed with failures to exercise retry and error paths.
pub struct MemorySpaceStore {
    state: RwLock<MemoryState>,
}

impl Default for MemorySpaceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySpaceStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// Queue an error to be returned by the next store call, in FIFO order.
    pub async fn inject_failure(&self, error: StoreError) {
        self.state.write().await.injected_failures.push_back(error);
    }

    pub async fn space_count(&self, owner: UserId) -> usize {
        self.state
            .read()
            .await
            .spaces
            .get(&owner)
            .map_or(0, Vec::len)
    }

    async fn take_injected(&self) -> Result<(), StoreError> {
        let injected = self.state.write().await.injected_failures.pop_front();
        match injected {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SpaceStore for MemorySpaceStore {
    async fn list_spaces(&self, owner: UserId) -> Result<Vec<Space>, StoreError> {
        self.take_injected().await?;
        let state = self.state.read().await;
        let mut spaces = state.spaces.get(&owner).cloned().unwrap_or_default();
        spaces.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(spaces)
    }

    async fn get_space(&self, owner: UserId, id: SpaceId) -> Result<Space, StoreError> {
        self.take_injected().await?;
        let state = self.state.read().await;
        state
            .spaces
            .get(&owner)
            .and_then(|spaces| spaces.iter().find(|space| space.id == id))
            .cloned()
            .ok_or(StoreError::SpaceNotFound)
    }

    async fn create_space(&self, owner: UserId, draft: NewSpace) -> Result<Space, StoreError> {
        self.take_injected().await?;
        let now = SystemTime::now();
        let space = Space {
            id: SpaceId::new(),
            owner,
            name: draft.name,
            icon: draft.icon,
            measurements: Vec::new(),
            created_at: now,
            updated_at: now,
            revision: 1,
        };

        let mut state = self.state.write().await;
        state
            .spaces
            .entry(owner)
            .or_default()
            .insert(0, space.clone());
        Ok(space)
    }

    async fn update_space(
        &self,
        owner: UserId,
        id: SpaceId,
        patch: SpacePatch,
        expected_revision: i64,
    ) -> Result<Space, StoreError> {
        self.take_injected().await?;
        let mut state = self.state.write().await;
        let spaces = state.spaces.get_mut(&owner).ok_or(StoreError::SpaceNotFound)?;
        let space = spaces
            .iter_mut()
            .find(|space| space.id == id)
            .ok_or(StoreError::SpaceNotFound)?;

        if space.revision != expected_revision {
            return Err(StoreError::RevisionConflict {
                current: space.revision,
            });
        }

        if let Some(name) = patch.name {
            space.name = name;
        }
        if let Some(icon) = patch.icon {
            space.icon = icon;
        }
        if let Some(measurements) = patch.measurements {
            space.measurements = measurements;
        }
        space.updated_at = SystemTime::now();
        space.revision += 1;
        Ok(space.clone())
    }

    async fn delete_space(&self, owner: UserId, id: SpaceId) -> Result<(), StoreError> {
        self.take_injected().await?;
        let mut state = self.state.write().await;
        let spaces = state.spaces.get_mut(&owner).ok_or(StoreError::SpaceNotFound)?;
        let before = spaces.len();
        spaces.retain(|space| space.id != id);
        if spaces.len() == before {
            return Err(StoreError::SpaceNotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> NewSpace {
        NewSpace {
            name: name.to_owned(),
            icon: "🍳".to_owned(),
        }
    }

    #[tokio::test]
    async fn create_then_list_orders_newest_first() {
        let store = MemorySpaceStore::new();
        let owner = UserId::new();

        let first = store.create_space(owner, draft("Kitchen")).await.expect("create");
        let second = store.create_space(owner, draft("Bedroom")).await.expect("create");

        let listed = store.list_spaces(owner).await.expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
        assert_eq!(listed[0].revision, 1);
    }

    #[tokio::test]
    async fn list_is_scoped_per_owner() {
        let store = MemorySpaceStore::new();
        let owner_a = UserId::new();
        let owner_b = UserId::new();
        store.create_space(owner_a, draft("Kitchen")).await.expect("create");

        assert!(store.list_spaces(owner_b).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn update_space_bumps_revision_and_updated_at() {
        let store = MemorySpaceStore::new();
        let owner = UserId::new();
        let created = store.create_space(owner, draft("Kitchen")).await.expect("create");

        let patch = SpacePatch {
            name: Some("Galley".to_owned()),
            ..SpacePatch::default()
        };
        let updated = store
            .update_space(owner, created.id, patch, created.revision)
            .await
            .expect("update");

        assert_eq!(updated.name, "Galley");
        assert_eq!(updated.icon, created.icon);
        assert_eq!(updated.revision, created.revision + 1);
        assert!(updated.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn update_space_with_stale_revision_conflicts() {
        let store = MemorySpaceStore::new();
        let owner = UserId::new();
        let created = store.create_space(owner, draft("Kitchen")).await.expect("create");
        store
            .update_space(owner, created.id, SpacePatch::default(), created.revision)
            .await
            .expect("first update");

        let error = store
            .update_space(owner, created.id, SpacePatch::default(), created.revision)
            .await
            .expect_err("stale revision should conflict");
        assert_eq!(error, StoreError::RevisionConflict { current: 2 });
    }

    #[tokio::test]
    async fn delete_space_removes_exactly_one() {
        let store = MemorySpaceStore::new();
        let owner = UserId::new();
        let created = store.create_space(owner, draft("Kitchen")).await.expect("create");
        store.create_space(owner, draft("Bedroom")).await.expect("create");

        store.delete_space(owner, created.id).await.expect("delete");
        assert_eq!(store.space_count(owner).await, 1);

        let error = store
            .delete_space(owner, created.id)
            .await
            .expect_err("second delete should fail");
        assert_eq!(error, StoreError::SpaceNotFound);
        assert_eq!(store.space_count(owner).await, 1);
    }

    #[tokio::test]
    async fn injected_failures_apply_in_fifo_order() {
        let store = MemorySpaceStore::new();
        let owner = UserId::new();
        store
            .inject_failure(StoreError::Transport("reset".to_owned()))
            .await;
        store.inject_failure(StoreError::Backend("down".to_owned())).await;

        let first = store.create_space(owner, draft("A")).await.expect_err("first");
        assert!(first.is_transient());
        let second = store.create_space(owner, draft("B")).await.expect_err("second");
        assert_eq!(second, StoreError::Backend("down".to_owned()));

        store.create_space(owner, draft("C")).await.expect("third succeeds");
    }
}
