//! In-memory store backend.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::store::{Record, Store, StoreError, StoreResult};

/// Insertion-ordered records behind a single mutex.
pub struct MemoryStore<R> {
    records: Mutex<Vec<R>>,
}

impl<R> Default for MemoryStore<R> {
    fn default() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }
}

impl<R: Record> MemoryStore<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<R>> {
        self.records.lock().expect("store mutex poisoned")
    }

    /// Unique-key clash with any record other than `skip_id`.
    fn clashes(records: &[R], candidate: &R, skip_id: Option<&str>) -> Option<&'static str> {
        let (field, value) = candidate.unique_key()?;
        records
            .iter()
            .filter(|r| Some(r.id()) != skip_id)
            .any(|r| r.unique_key().map(|(_, v)| v) == Some(value))
            .then_some(field)
    }
}

#[async_trait]
impl<R: Record> Store<R> for MemoryStore<R> {
    async fn create(&self, record: R) -> StoreResult<R> {
        let mut records = self.lock();
        if let Some(field) = Self::clashes(&records, &record, None) {
            return Err(StoreError::Conflict { field });
        }
        records.push(record.clone());
        Ok(record)
    }

    async fn update(&self, id: &str, patch: R::Patch) -> StoreResult<R> {
        let mut records = self.lock();
        let index = records
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut updated = records[index].clone();
        updated.apply(patch);
        if let Some(field) = Self::clashes(&records, &updated, Some(id)) {
            return Err(StoreError::Conflict { field });
        }
        records[index] = updated.clone();
        Ok(updated)
    }

    async fn find_all(&self) -> StoreResult<Vec<R>> {
        Ok(self.lock().clone())
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<R> {
        self.lock()
            .iter()
            .find(|r| r.id() == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{User, UserFields};

    fn user(name: &str, email: &str) -> User {
        User::new(UserFields { name: name.into(), email: email.into() })
    }

    fn fields(name: &str, email: &str) -> UserFields {
        UserFields { name: name.into(), email: email.into() }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = MemoryStore::new();
        let ada = store.create(user("Ada", "ada@example.com")).await.unwrap();

        assert_eq!(store.find_by_id(&ada.id).await.unwrap(), ada);
        assert_eq!(store.find_all().await.unwrap(), vec![ada]);
        assert_eq!(
            store.find_by_id("missing").await,
            Err(StoreError::NotFound("missing".into()))
        );
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::new();
        store.create(user("Ada", "dup@example.com")).await.unwrap();

        let err = store.create(user("Other", "dup@example.com")).await.unwrap_err();
        assert_eq!(err, StoreError::Conflict { field: "email" });
        assert_eq!(err.to_string(), "email already exists");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_update_checks_other_records_only() {
        let store = MemoryStore::new();
        let ada = store.create(user("Ada", "ada@example.com")).await.unwrap();
        let bob = store.create(user("Bob", "bob@example.com")).await.unwrap();

        let renamed = store.update(&ada.id, fields("Ada L.", "ada@example.com")).await.unwrap();
        assert_eq!(renamed.name, "Ada L.");

        let err = store.update(&bob.id, fields("Bob", "ada@example.com")).await.unwrap_err();
        assert_eq!(err, StoreError::Conflict { field: "email" });
        assert_eq!(store.find_by_id(&bob.id).await.unwrap().email, "bob@example.com");

        assert!(matches!(
            store.update("missing", fields("X", "x@example.com")).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
