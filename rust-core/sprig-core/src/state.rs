//! # Application State
//!
//! Explicitly wired resources shared by every request: the database
//! [`Executor`] handlers query through, plus any extra values registered by
//! name. Handlers reach it through [`crate::request::Request::state`]
//! instead of global lookups.

use crate::error::{Error, Result};
use crate::executor::Executor;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

type Extensions = HashMap<String, Box<dyn Any + Send + Sync>>;

/// Shared application resources
///
/// Cloning is cheap and every clone sees the same values.
///
/// ```ignore
/// let state = AppState::new();
/// state.set_executor(Arc::new(pool));
/// let users = ModelDef::new("users").all(&state.db()?).await?;
/// ```
#[derive(Clone, Default)]
pub struct AppState {
    executor: Arc<RwLock<Option<Arc<dyn Executor>>>>,
    extensions: Arc<RwLock<Extensions>>,
}

impl AppState {
    /// Create an empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the executor handlers run queries against
    pub fn set_executor(&self, executor: Arc<dyn Executor>) {
        *self.executor.write().unwrap_or_else(PoisonError::into_inner) = Some(executor);
    }

    /// The installed executor, if any
    #[must_use]
    pub fn executor(&self) -> Option<Arc<dyn Executor>> {
        self.executor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The installed executor
    ///
    /// # Errors
    ///
    /// Returns a 500 `Error::HttpStatus` when no executor was installed.
    pub fn db(&self) -> Result<Arc<dyn Executor>> {
        self.executor()
            .ok_or_else(|| Error::internal("database not configured"))
    }

    /// Store an extra value under `key`, replacing any previous one
    pub fn set<T: Send + Sync + 'static>(&self, key: impl Into<String>, value: T) {
        self.extensions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), Box::new(value));
    }

    /// Clone of the value under `key`, if present with type `T`
    #[must_use]
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        self.extensions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .cloned()
    }

    /// Like [`AppState::get`], failing when the value is missing
    ///
    /// # Errors
    ///
    /// Returns a 500 `Error::HttpStatus` naming the key.
    pub fn require<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Result<T> {
        self.get(key)
            .ok_or_else(|| Error::internal(format!("state value '{key}' not configured")))
    }

    /// Whether an extra value is stored under `key`
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.extensions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Drop the value under `key`; `true` if one was stored
    pub fn remove(&self, key: &str) -> bool {
        self.extensions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    /// Number of extra values
    #[must_use]
    pub fn len(&self) -> usize {
        self.extensions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// `true` when no extra value is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let extensions = self.extensions.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("AppState")
            .field("executor", &self.executor().is_some())
            .field("keys", &extensions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::RecordingExecutor;
    use crate::query::QueryBuilder;

    #[test]
    fn test_db_missing_is_internal_error() {
        let state = AppState::new();
        assert!(state.executor().is_none());
        assert_eq!(state.db().err().unwrap().status_code(), 500);
    }

    #[tokio::test]
    async fn test_clones_share_the_executor() {
        let state = AppState::new();
        let recorder = Arc::new(RecordingExecutor::new());
        state.clone().set_executor(recorder.clone());

        QueryBuilder::new("users", state.db().unwrap())
            .get()
            .await
            .unwrap();
        assert_eq!(recorder.last().unwrap().sql, "SELECT * FROM users");
    }

    #[test]
    fn test_extensions_are_typed() {
        let state = AppState::new();
        state.set("per_page", 20_u64);
        assert_eq!(state.get::<u64>("per_page"), Some(20));
        assert!(state.get::<String>("per_page").is_none());
        assert_eq!(state.require::<u64>("per_page").unwrap(), 20);

        let err = state.require::<String>("app_name").unwrap_err();
        assert!(err.to_string().contains("app_name"));
    }

    #[test]
    fn test_contains_remove_and_debug() {
        let state = AppState::new();
        state.set("greeting", "hi".to_string());
        assert!(state.contains("greeting"));
        assert!(format!("{state:?}").contains("greeting"));

        assert!(state.remove("greeting"));
        assert!(!state.remove("greeting"));
        assert!(state.is_empty());
    }
}
