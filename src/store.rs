//! Transactional row store the records end up in
pub mod mysql;

use async_trait::async_trait;

use crate::error::StoreError;

/// Handle shared by all workers; every write opens its own transaction.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;
    async fn close(&self) {}
}

#[async_trait]
pub trait Transaction: Send {
    /// Inserts one row holding the given JSON text.
    async fn insert(&mut self, json: &str) -> Result<(), StoreError>;
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Checks that `name` can be spliced into SQL as a (possibly schema-qualified) identifier.
pub fn is_identifier(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|p| {
            !p.is_empty() && p.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
