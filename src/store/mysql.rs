use async_trait::async_trait;
use mysql_async::{prelude::Queryable, Opts, Pool, TxOpts};
use tracing::info;

use super::{RowStore, Transaction};
use crate::error::StoreError;

/// MySQL table with a single JSON column
pub struct MySqlStore {
    pool: Pool,
    insert: String,
}

fn quote(identifier: &str) -> String {
    identifier
        .split('.')
        .map(|p| format!("`{p}`"))
        .collect::<Vec<_>>()
        .join(".")
}

fn insert_statement(table: &str, column: &str) -> String {
    format!("INSERT INTO {} ({}) VALUES (?)", quote(table), quote(column))
}

impl MySqlStore {
    /// Opens the pool and makes sure the server is reachable.
    pub async fn connect(url: &str, table: &str, column: &str) -> Result<MySqlStore, StoreError> {
        let pool = Pool::new(Opts::from_url(url)?);
        let mut conn = pool.get_conn().await?;
        conn.ping().await?;
        info!(table, column, "connected to mysql");
        Ok(MySqlStore {
            pool,
            insert: insert_statement(table, column),
        })
    }
}

struct MySqlTransaction {
    tx: mysql_async::Transaction<'static>,
    insert: String,
}

#[async_trait]
impl RowStore for MySqlStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let tx = self.pool.start_transaction(TxOpts::default()).await?;
        Ok(Box::new(MySqlTransaction {
            tx,
            insert: self.insert.clone(),
        }))
    }

    async fn close(&self) {
        if let Err(e) = self.pool.clone().disconnect().await {
            tracing::warn!("disconnecting mysql pool: {e}");
        }
    }
}

#[async_trait]
impl Transaction for MySqlTransaction {
    async fn insert(&mut self, json: &str) -> Result<(), StoreError> {
        self.tx.exec_drop(&self.insert, (json,)).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        Ok(self.tx.commit().await?)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(self.tx.rollback().await?)
    }
}
