//! Curated lists: user-picked casts grouped under a list id.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{AppError, ValidationError};
use crate::models::{CastHash, CuratedListItem, Fid, NewCuratedListItem};

#[derive(Debug, thiserror::Error)]
pub enum CuratedListError {
    #[error("cast is already in this list")]
    AlreadyInList,
    #[error("fid {0} does not fit the store")]
    FidOutOfRange(Fid),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<CuratedListError> for AppError {
    fn from(err: CuratedListError) -> Self {
        match err {
            CuratedListError::AlreadyInList => AppError::AlreadyInList,
            CuratedListError::FidOutOfRange(_) => {
                AppError::Validation(ValidationError::new("authorFid", "FID is out of range"))
            }
            CuratedListError::Database(e) => {
                error!(error = %e, "curated list query failed");
                AppError::Unknown(e.into())
            }
        }
    }
}

#[async_trait]
pub trait CuratedListStore: Send + Sync {
    /// Newest first.
    async fn list_items(&self, list_id: Uuid) -> Result<Vec<CuratedListItem>, CuratedListError>;

    async fn add_item(&self, item: NewCuratedListItem) -> Result<CuratedListItem, CuratedListError>;

    /// `false` when nothing matched.
    async fn remove_item(&self, list_id: Uuid, cast_hash: &CastHash) -> Result<bool, CuratedListError>;
}

fn fid_column(fid: Fid) -> Result<i64, CuratedListError> {
    i64::try_from(fid.get()).map_err(|_| CuratedListError::FidOutOfRange(fid))
}

const ITEM_COLUMNS: &str =
    "id, list_id, cast_hash, author_fid, cast_text, cast_timestamp, added_by_fid, notes, created_at";

pub struct PgCuratedLists {
    pool: Pool<Postgres>,
}

impl PgCuratedLists {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CuratedListStore for PgCuratedLists {
    async fn list_items(&self, list_id: Uuid) -> Result<Vec<CuratedListItem>, CuratedListError> {
        let items = sqlx::query_as::<_, CuratedListItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM curated_list_items \
             WHERE list_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(list_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn add_item(&self, item: NewCuratedListItem) -> Result<CuratedListItem, CuratedListError> {
        let result = sqlx::query_as::<_, CuratedListItem>(&format!(
            "INSERT INTO curated_list_items \
             (list_id, cast_hash, author_fid, cast_text, cast_timestamp, added_by_fid, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(item.list_id)
        .bind(item.cast_hash.as_str())
        .bind(fid_column(item.author_fid)?)
        .bind(&item.cast_text)
        .bind(item.cast_timestamp)
        .bind(fid_column(item.added_by_fid)?)
        .bind(&item.notes)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(created) => {
                info!(list_id = %created.list_id, cast_hash = %created.cast_hash, "cast added to curated list");
                Ok(created)
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(CuratedListError::AlreadyInList)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_item(&self, list_id: Uuid, cast_hash: &CastHash) -> Result<bool, CuratedListError> {
        let result = sqlx::query("DELETE FROM curated_list_items WHERE list_id = $1 AND cast_hash = $2")
            .bind(list_id)
            .bind(cast_hash.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
