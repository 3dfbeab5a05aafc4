//! Explicit transaction handles.

use std::sync::Arc;

use enrollment_common::{AppError, AppResult};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};

/// Opens and commits database transactions.
///
/// A [`DatabaseTransaction`] rolls back when dropped without a commit, so an
/// error return or a cancelled future never leaves partial writes behind.
#[derive(Clone)]
pub struct TransactionManager {
    db: Arc<DatabaseConnection>,
}

impl TransactionManager {
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Connection for statements that run outside a transaction.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    /// Start a new transaction.
    pub async fn begin(&self) -> AppResult<DatabaseTransaction> {
        self.db
            .begin()
            .await
            .map_err(AppError::db("begin transaction"))
    }

    /// Commit a transaction.
    pub async fn commit(&self, txn: DatabaseTransaction) -> AppResult<()> {
        txn.commit().await.map_err(AppError::db("commit transaction"))
    }
}
