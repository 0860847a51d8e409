//! Owner of the context state and the volatile store handle.

use sqlx::{Connection, SqliteConnection};
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::error::{SimulationError, ValidationError};
use crate::introspect;
use crate::types::{ContextState, SchemaSnapshot, TableStats};

const MEMORY_STORE_URL: &str = "sqlite::memory:";

async fn open_store() -> Result<SqliteConnection, sqlx::Error> {
    SqliteConnection::connect(MEMORY_STORE_URL).await
}

/// Process-lifetime state shared by every request.
///
/// The store connection sits behind one async mutex: a simulation holds it
/// for its whole run, and reset/scenario adoption wait for it, so nothing
/// ever observes the store mid-swap.
pub struct StateStore {
    context: RwLock<ContextState>,
    store: Mutex<SqliteConnection>,
}

impl StateStore {
    /// Create the state with an empty store.
    pub async fn new(context: ContextState) -> Result<Self, sqlx::Error> {
        let store = open_store().await?;
        tracing::info!(
            method = %context.method,
            endpoint = %context.endpoint,
            "volatile store opened"
        );
        Ok(Self {
            context: RwLock::new(context),
            store: Mutex::new(store),
        })
    }

    pub async fn get_prompt(&self) -> ContextState {
        self.context.read().await.clone()
    }

    /// Validate and replace prompt, method and endpoint together.
    ///
    /// On a validation error nothing changes.
    pub async fn set_prompt(
        &self,
        prompt: &str,
        method: &str,
        endpoint: &str,
    ) -> Result<ContextState, ValidationError> {
        let mut context = self.context.write().await;
        let updated = ContextState::validated(context.generic_prompt.clone(), prompt, method, endpoint)?;
        *context = updated.clone();
        tracing::info!(method = %updated.method, endpoint = %updated.endpoint, "context prompt saved");
        Ok(updated)
    }

    /// Swap the store for a fresh, schema-less one. Context is untouched.
    ///
    /// Returns the schema rendering of the new store, read under the same
    /// lock as the swap.
    pub async fn reset(&self) -> Result<String, sqlx::Error> {
        let mut store = self.store.lock().await;
        Self::replace_store(&mut store).await
    }

    async fn replace_store(store: &mut SqliteConnection) -> Result<String, sqlx::Error> {
        let fresh = open_store().await?;
        let old = std::mem::replace(store, fresh);
        if let Err(e) = old.close().await {
            tracing::warn!(error = %e, "closing discarded store failed");
        }
        tracing::info!("volatile store reset");
        Ok(introspect::snapshot(store).await?.to_string())
    }

    /// Reset the store and adopt a new context as one step.
    ///
    /// Validation happens first, so an invalid scenario leaves both the
    /// store and the context as they were. Returns the adopted context and
    /// the schema rendering of the new store.
    pub async fn adopt_scenario(
        &self,
        prompt: &str,
        method: &str,
        endpoint: &str,
    ) -> Result<(ContextState, String), SimulationError> {
        let mut store = self.store.lock().await;
        let generic = self.context.read().await.generic_prompt.clone();
        let adopted = ContextState::validated(generic, prompt, method, endpoint)?;

        let schema = Self::replace_store(&mut store).await?;
        *self.context.write().await = adopted.clone();
        tracing::info!(method = %adopted.method, endpoint = %adopted.endpoint, "scenario adopted");
        Ok((adopted, schema))
    }

    /// Snapshot and stats of the current store.
    pub async fn observe(&self) -> Result<(SchemaSnapshot, TableStats), sqlx::Error> {
        let mut store = self.store.lock().await;
        introspect::observe(&mut store).await
    }

    /// Textual schema rendering, as shown to operators.
    pub async fn schema_text(&self) -> Result<String, sqlx::Error> {
        let mut store = self.store.lock().await;
        Ok(introspect::snapshot(&mut store).await?.to_string())
    }

    /// Exclusive access to the store for the length of one simulation.
    pub(crate) async fn lock_store(&self) -> MutexGuard<'_, SqliteConnection> {
        self.store.lock().await
    }
}
