#![forbid(unsafe_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use cota_sync_auth::{AuthError, IdentityProvider, ProviderCredential};
use cota_sync_core::validation::{
    validate_dimensions, validate_icon, validate_label, validate_name, ValidationError,
};
use cota_sync_core::{
    AuthUser, BoxId, BoxPatch, Measurement, MeasurementId, MeasurementPatch, NewBox,
    NewMeasurement, Space, SpaceId,
};
use cota_sync_storage::{NewSpace, SpacePatch, SpaceStore, StoreError};
use tokio::sync::{watch, RwLock};


// ---------------------------------------------------------------------------
// Session state and policies
// ---------------------------------------------------------------------------

/// Session state of the sync client. Transitions are driven exclusively by
/// identity-provider notifications, never inferred locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    /// Initial state, and the window between a session change and the
    /// completed space reload.
    Loading,
    Authenticated(AuthUser),
    Unauthenticated,
}

impl Session {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated(_))
    }
}

/// What to do when a store write fails after retries are exhausted. Applies
/// to updates and deletes; `create_space` always surfaces terminal failures
/// because its result id comes from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteFailurePolicy {
    /// Return the error to the caller; the mirror stays unchanged.
    #[default]
    Surface,
    /// Log and report success, leaving the mirror stale relative to intent.
    /// Matches the historical behavior some callers still rely on.
    LogAndContinue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// No retries; the first failure is final. Useful in tests.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        // Exponential: base, 2*base, 4*base, ...
        self.base_delay.saturating_mul(1 << attempt.min(16))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub write_failure_policy: WriteFailurePolicy,
    pub retry: RetryPolicy,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("no user is signed in")]
    NotSignedIn,
    #[error("space not found")]
    SpaceNotFound,
    #[error("measurement not found")]
    MeasurementNotFound,
    #[error("box not found")]
    BoxNotFound,
    /// A concurrent edit won the race; the mirror has been refreshed from the
    /// store and the caller should re-apply its change on top.
    #[error("concurrent edit detected; local copy refreshed from the store")]
    Conflict,
    #[error("store write failed: {0}")]
    Store(StoreError),
}

/// Partial update for a space's own fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpaceFields {
    pub name: Option<String>,
    pub icon: Option<String>,
}

// ---------------------------------------------------------------------------
// Sync client
// ---------------------------------------------------------------------------

struct Mirror {
    user: Option<AuthUser>,
    spaces: Vec<Space>,
}

/// The sync context: single source of truth for the signed-in user's spaces,
/// measurements, and boxes. Mirrors the remote per-user documents into local
/// state and funnels every mutation through a read-modify-write of the whole
/// embedded subtree, since measurements and boxes are array fields of the
/// space document.
///
/// Explicitly constructed over injected trait objects so tests can build
/// isolated instances per case.
pub struct SyncClient {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn SpaceStore>,
    options: SyncOptions,
    mirror: RwLock<Mirror>,
    session: watch::Sender<Session>,
}

impl SyncClient {
    /// Build the client and start the listener that follows identity-provider
    /// session notifications. The listener stops when the client is dropped or
    /// the provider goes away.
    #[must_use]
    pub fn spawn(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn SpaceStore>,
        options: SyncOptions,
    ) -> Arc<Self> {
        let (session, _) = watch::channel(Session::Loading);
        let client = Arc::new(Self {
            identity: identity.clone(),
            store,
            options,
            mirror: RwLock::new(Mirror {
                user: None,
                spaces: Vec::new(),
            }),
            session,
        });

        let weak = Arc::downgrade(&client);
        let mut notifications = identity.watch_session();
        tokio::spawn(async move {
            loop {
                let current = notifications.borrow_and_update().clone();
                match weak.upgrade() {
                    Some(client) => client.apply_session(current).await,
                    None => break,
                }
                if notifications.changed().await.is_err() {
                    break;
                }
            }
        });

        client
    }

    /// Observe session transitions. The receiver sees the current state
    /// immediately.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    async fn apply_session(&self, user: Option<AuthUser>) {
        match user {
            Some(user) => {
                self.session.send_replace(Session::Loading);
                {
                    // A user switch must not leave the previous user's mirror
                    // visible while the new list loads; mutators racing the
                    // reload get `NotSignedIn` instead of writing as the old
                    // user.
                    let mut mirror = self.mirror.write().await;
                    mirror.user = None;
                    mirror.spaces = Vec::new();
                }
                let spaces = match self
                    .with_retry(|| self.store.list_spaces(user.id))
                    .await
                {
                    Ok(spaces) => spaces,
                    Err(error) => {
                        // The session itself stands; the mirror starts empty.
                        tracing::error!(user = %user.id, %error, "failed to load spaces");
                        Vec::new()
                    }
                };
                tracing::info!(user = %user.id, spaces = spaces.len(), "session established");

                let mut mirror = self.mirror.write().await;
                mirror.user = Some(user.clone());
                mirror.spaces = spaces;
                drop(mirror);
                self.session.send_replace(Session::Authenticated(user));
            }
            None => {
                let mut mirror = self.mirror.write().await;
                mirror.user = None;
                mirror.spaces = Vec::new();
                drop(mirror);
                self.session.send_replace(Session::Unauthenticated);
            }
        }
    }

    // -- authentication -----------------------------------------------------

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, SyncError> {
        Ok(self.identity.sign_in(email, password).await?)
    }

    pub async fn sign_in_with_provider(
        &self,
        credential: ProviderCredential,
    ) -> Result<AuthUser, SyncError> {
        Ok(self.identity.sign_in_with_provider(credential).await?)
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthUser, SyncError> {
        Ok(self.identity.sign_up(email, password, display_name).await?)
    }

    /// Best-effort: a failed remote sign-out is logged, never surfaced; the
    /// local session is cleared either way via the provider notification.
    pub async fn sign_out(&self) {
        if let Err(error) = self.identity.sign_out().await {
            tracing::warn!(%error, "remote sign-out failed");
        }
    }

    // -- reads --------------------------------------------------------------

    pub async fn user(&self) -> Option<AuthUser> {
        self.mirror.read().await.user.clone()
    }

    pub async fn spaces(&self) -> Vec<Space> {
        self.mirror.read().await.spaces.clone()
    }

    pub async fn get_space(&self, id: SpaceId) -> Option<Space> {
        self.mirror
            .read()
            .await
            .spaces
            .iter()
            .find(|space| space.id == id)
            .cloned()
    }

    pub async fn get_measurement(
        &self,
        space_id: SpaceId,
        measurement_id: MeasurementId,
    ) -> Option<Measurement> {
        self.mirror
            .read()
            .await
            .spaces
            .iter()
            .find(|space| space.id == space_id)
            .and_then(|space| space.measurement(measurement_id))
            .cloned()
    }

    // -- space mutators -----------------------------------------------------

    pub async fn create_space(&self, name: &str, icon: &str) -> Result<SpaceId, SyncError> {
        validate_name(name)?;
        validate_icon(icon)?;
        let user = self.current_user().await?;

        let draft = NewSpace {
            name: name.to_owned(),
            icon: icon.to_owned(),
        };
        // The id comes from the store, so a terminal failure here surfaces
        // even under `LogAndContinue`; there is no entity to report success
        // about.
        let created = self
            .with_retry(|| self.store.create_space(user.id, draft.clone()))
            .await
            .map_err(SyncError::Store)?;

        let id = created.id;
        let mut mirror = self.mirror.write().await;
        mirror.spaces.insert(0, created);
        tracing::debug!(space = %id, "space created");
        Ok(id)
    }

    pub async fn update_space(&self, id: SpaceId, fields: SpaceFields) -> Result<(), SyncError> {
        if let Some(name) = &fields.name {
            validate_name(name)?;
        }
        if let Some(icon) = &fields.icon {
            validate_icon(icon)?;
        }
        let user = self.current_user().await?;
        let snapshot = self.snapshot_space(id).await?;

        let patch = SpacePatch {
            name: fields.name,
            icon: fields.icon,
            measurements: None,
        };
        self.write_space(user, &snapshot, patch).await
    }

    pub async fn delete_space(&self, id: SpaceId) -> Result<(), SyncError> {
        let user = self.current_user().await?;
        self.snapshot_space(id).await?;

        match self
            .with_retry(|| self.store.delete_space(user.id, id))
            .await
        {
            Ok(()) => {}
            Err(StoreError::SpaceNotFound) => {
                // Already gone remotely; fall through and drop the mirror copy.
                tracing::debug!(space = %id, "space already deleted remotely");
            }
            Err(error) => return self.absorb_failure("delete_space", error),
        }

        let mut mirror = self.mirror.write().await;
        mirror.spaces.retain(|space| space.id != id);
        tracing::debug!(space = %id, "space deleted");
        Ok(())
    }

    // -- measurement mutators -----------------------------------------------

    pub async fn add_measurement(
        &self,
        space_id: SpaceId,
        draft: NewMeasurement,
    ) -> Result<MeasurementId, SyncError> {
        validate_name(&draft.name)?;
        let user = self.current_user().await?;
        let snapshot = self.snapshot_space(space_id).await?;

        let (next, measurement_id) = snapshot.with_measurement_added(draft, SystemTime::now());
        self.write_space(user, &snapshot, SpacePatch::measurements(next.measurements))
            .await?;
        Ok(measurement_id)
    }

    pub async fn update_measurement(
        &self,
        space_id: SpaceId,
        measurement_id: MeasurementId,
        patch: MeasurementPatch,
    ) -> Result<(), SyncError> {
        if let Some(name) = &patch.name {
            validate_name(name)?;
        }
        let user = self.current_user().await?;
        let snapshot = self.snapshot_space(space_id).await?;

        let next = snapshot
            .with_measurement_updated(measurement_id, &patch, SystemTime::now())
            .ok_or(SyncError::MeasurementNotFound)?;
        self.write_space(user, &snapshot, SpacePatch::measurements(next.measurements))
            .await
    }

    pub async fn delete_measurement(
        &self,
        space_id: SpaceId,
        measurement_id: MeasurementId,
    ) -> Result<(), SyncError> {
        let user = self.current_user().await?;
        let snapshot = self.snapshot_space(space_id).await?;

        let next = snapshot
            .with_measurement_removed(measurement_id, SystemTime::now())
            .ok_or(SyncError::MeasurementNotFound)?;
        self.write_space(user, &snapshot, SpacePatch::measurements(next.measurements))
            .await
    }

    // -- box mutators -------------------------------------------------------

    pub async fn add_box(
        &self,
        space_id: SpaceId,
        measurement_id: MeasurementId,
        draft: NewBox,
    ) -> Result<BoxId, SyncError> {
        validate_label(&draft.label)?;
        validate_dimensions(&draft.dimensions)?;
        let user = self.current_user().await?;
        let snapshot = self.snapshot_space(space_id).await?;

        let (next, box_id) = snapshot
            .with_box_added(measurement_id, draft, SystemTime::now())
            .ok_or(SyncError::MeasurementNotFound)?;
        self.write_space(user, &snapshot, SpacePatch::measurements(next.measurements))
            .await?;
        Ok(box_id)
    }

    pub async fn update_box(
        &self,
        space_id: SpaceId,
        measurement_id: MeasurementId,
        box_id: BoxId,
        patch: BoxPatch,
    ) -> Result<(), SyncError> {
        if let Some(label) = &patch.label {
            validate_label(label)?;
        }
        if let Some(dimensions) = &patch.dimensions {
            validate_dimensions(dimensions)?;
        }
        let user = self.current_user().await?;
        let snapshot = self.snapshot_space(space_id).await?;
        snapshot
            .measurement(measurement_id)
            .ok_or(SyncError::MeasurementNotFound)?;

        let next = snapshot
            .with_box_updated(measurement_id, box_id, &patch, SystemTime::now())
            .ok_or(SyncError::BoxNotFound)?;
        self.write_space(user, &snapshot, SpacePatch::measurements(next.measurements))
            .await
    }

    pub async fn delete_box(
        &self,
        space_id: SpaceId,
        measurement_id: MeasurementId,
        box_id: BoxId,
    ) -> Result<(), SyncError> {
        let user = self.current_user().await?;
        let snapshot = self.snapshot_space(space_id).await?;
        snapshot
            .measurement(measurement_id)
            .ok_or(SyncError::MeasurementNotFound)?;

        let next = snapshot
            .with_box_removed(measurement_id, box_id, SystemTime::now())
            .ok_or(SyncError::BoxNotFound)?;
        self.write_space(user, &snapshot, SpacePatch::measurements(next.measurements))
            .await
    }

    // -- write path ---------------------------------------------------------

    async fn current_user(&self) -> Result<AuthUser, SyncError> {
        self.mirror
            .read()
            .await
            .user
            .clone()
            .ok_or(SyncError::NotSignedIn)
    }

    async fn snapshot_space(&self, id: SpaceId) -> Result<Space, SyncError> {
        self.get_space(id).await.ok_or(SyncError::SpaceNotFound)
    }

    /// The whole-subtree write: send the patch at the snapshot's revision and
    /// adopt the store's returned document on success. A revision conflict
    /// means a concurrent edit landed first; the authoritative document is
    /// fetched and adopted (last write wins at document granularity) and the
    /// caller gets `Conflict` so it can re-apply on fresh state.
    async fn write_space(
        &self,
        user: AuthUser,
        snapshot: &Space,
        patch: SpacePatch,
    ) -> Result<(), SyncError> {
        let result = self
            .with_retry(|| {
                self.store
                    .update_space(user.id, snapshot.id, patch.clone(), snapshot.revision)
            })
            .await;

        match result {
            Ok(stored) => {
                self.adopt(stored).await;
                Ok(())
            }
            Err(StoreError::RevisionConflict { current }) => {
                tracing::warn!(
                    space = %snapshot.id,
                    local_revision = snapshot.revision,
                    store_revision = current,
                    "concurrent edit detected"
                );
                match self
                    .with_retry(|| self.store.get_space(user.id, snapshot.id))
                    .await
                {
                    Ok(authoritative) => self.adopt(authoritative).await,
                    Err(StoreError::SpaceNotFound) => {
                        let mut mirror = self.mirror.write().await;
                        mirror.spaces.retain(|space| space.id != snapshot.id);
                    }
                    Err(error) => {
                        tracing::error!(space = %snapshot.id, %error, "conflict refetch failed");
                    }
                }
                Err(SyncError::Conflict)
            }
            Err(error) => self.absorb_failure("update_space", error),
        }
    }

    /// Replace the mirror's copy of a space with the store's document,
    /// preserving list position.
    async fn adopt(&self, stored: Space) {
        let mut mirror = self.mirror.write().await;
        match mirror.spaces.iter_mut().find(|space| space.id == stored.id) {
            Some(entry) => *entry = stored,
            None => mirror.spaces.insert(0, stored),
        }
    }

    /// Terminal failure handling per the configured policy. The mirror is
    /// never touched here; callers only adopt on success.
    fn absorb_failure(&self, operation: &str, error: StoreError) -> Result<(), SyncError> {
        match self.options.write_failure_policy {
            WriteFailurePolicy::Surface => Err(SyncError::Store(error)),
            WriteFailurePolicy::LogAndContinue => {
                tracing::error!(%operation, %error, "store write failed; continuing");
                Ok(())
            }
        }
    }

    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let policy = self.options.retry;
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt + 1 < policy.max_attempts => {
                    let delay = policy.delay_for(attempt);
                    tracing::debug!(%error, attempt, ?delay, "transient store error, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
