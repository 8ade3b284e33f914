//! Repository for image records in the durable store.
//!
//! Every public operation runs in its own transaction: reads are wrapped too,
//! so a read never observes half of a reconciliation batch.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::ImgRow;
use exn::ResultExt;
use imgstock_record::ImgInfo;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::instrument;

/// Repository for managing [`ImgInfo`] rows, keyed by `(id, category)`.
///
/// Lookups return `Ok(None)` when nothing matches; a missing row is never an
/// error at this layer.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Repository {
    // =========================================================================
    // Get/Fetch
    // =========================================================================

    /// The record of `category` with the fewest uses.
    pub async fn least_used(&self, category: impl AsRef<str>) -> Result<Option<ImgInfo>> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Transaction)?;
        let row: Option<ImgRow> = sqlx::query_as(include_str!("../queries/least_used.sql"))
            .bind(category.as_ref())
            .fetch_optional(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Transaction)?;
        row.map(ImgInfo::try_from).transpose()
    }

    /// A pseudo-random record of `category`.
    pub async fn random(&self, category: impl AsRef<str>) -> Result<Option<ImgInfo>> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Transaction)?;
        let row: Option<ImgRow> = sqlx::query_as(include_str!("../queries/random.sql"))
            .bind(category.as_ref())
            .fetch_optional(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Transaction)?;
        row.map(ImgInfo::try_from).transpose()
    }

    /// A pseudo-random record of `category` that has a downloaded file.
    pub async fn random_local(&self, category: impl AsRef<str>) -> Result<Option<ImgInfo>> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Transaction)?;
        let row: Option<ImgRow> = sqlx::query_as(include_str!("../queries/random_local.sql"))
            .bind(category.as_ref())
            .fetch_optional(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Transaction)?;
        row.map(ImgInfo::try_from).transpose()
    }

    /// Exact lookup by `(id, category)`.
    pub async fn by_id(&self, category: impl AsRef<str>, id: impl AsRef<str>) -> Result<Option<ImgInfo>> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Transaction)?;
        let row: Option<ImgRow> = sqlx::query_as(include_str!("../queries/by_id.sql"))
            .bind(category.as_ref())
            .bind(id.as_ref())
            .fetch_optional(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Transaction)?;
        row.map(ImgInfo::try_from).transpose()
    }

    /// Every record across all categories, used to seed the cache at startup.
    ///
    /// Rows are converted one by one: a row that doesn't make a valid record
    /// yields its own error without hiding the rows around it.
    pub async fn list_all(&self) -> Result<Vec<Result<ImgInfo>>> {
        let rows: Vec<ImgRow> = sqlx::query_as(include_str!("../queries/list_all.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(rows.into_iter().map(ImgInfo::try_from).collect())
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Find-or-create the row for `img` in `category`, then force its usage
    /// counter to `uses`.
    ///
    /// The counter comes from the caller rather than from `img`, because the
    /// cache's score is what's authoritative for usage, not whatever snapshot
    /// the record body happens to carry.
    pub async fn upsert(&self, category: impl AsRef<str>, img: &ImgInfo, uses: u64) -> Result<()> {
        self.sync(category.as_ref(), &[(img.clone(), uses)]).await.map(|_| ())
    }

    /// Batch form of [`upsert`](Self::upsert): all rows are written in one
    /// transaction which is rolled back if any of them fails.
    ///
    /// Returns the number of rows written.
    #[instrument("syncing category to durable store", skip(self, items))]
    pub async fn sync(&self, category: &str, items: &[(ImgInfo, u64)]) -> Result<usize> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Transaction)?;
        let mut written = 0;
        for (img, uses) in items {
            if let Err(err) = Self::write_row(&mut tx, category, img, *uses).await {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "Rolling back failed sync transaction also failed");
                }
                return Err(err);
            }
            written += 1;
        }
        tx.commit().await.or_raise(|| ErrorKind::Transaction)?;
        tracing::trace!(written, "Sync transaction committed");
        Ok(written)
    }

    async fn write_row(conn: &mut SqliteConnection, category: &str, img: &ImgInfo, uses: u64) -> Result<()> {
        let mut row = ImgRow::try_from(img)?;
        row.category = category.to_string();
        let uses = ImgRow::uses(uses)?;
        sqlx::query(include_str!("../queries/insert_if_missing.sql"))
            .bind(&row.id)
            .bind(&row.category)
            .bind(row.origin)
            .bind(row.path)
            .bind(row.width)
            .bind(row.height)
            .bind(row.file_size)
            .bind(uses)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/update_uses.sql"))
            .bind(uses)
            .bind(&row.id)
            .bind(&row.category)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete every record with an empty path or a zero file size.
    ///
    /// Those are left behind by downloads that failed in "files" mode. Returns
    /// the number of rows removed.
    pub async fn purge_empty(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Transaction)?;
        let result = sqlx::query(include_str!("../queries/purge_empty.sql"))
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Transaction)?;
        Ok(result.rows_affected())
    }
}
