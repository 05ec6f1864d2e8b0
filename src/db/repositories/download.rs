use crate::db::PersistenceError;
use crate::entities::{download_records, prelude::*};
use crate::models::DownloadRecord;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

pub struct DownloadRepository {
    conn: DatabaseConnection,
}

impl DownloadRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    fn map_model(m: download_records::Model) -> DownloadRecord {
        DownloadRecord {
            name: m.name,
            size: m.size,
            url: m.url,
            queued: m.queued,
        }
    }

    pub async fn exists(&self, name: &str) -> Result<bool, PersistenceError> {
        let count = DownloadRecords::find()
            .filter(download_records::Column::Name.eq(name))
            .count(&self.conn)
            .await?;

        Ok(count > 0)
    }

    pub async fn get(&self, name: &str) -> Result<Option<DownloadRecord>, PersistenceError> {
        let row = DownloadRecords::find()
            .filter(download_records::Column::Name.eq(name))
            .one(&self.conn)
            .await?;

        Ok(row.map(Self::map_model))
    }

    /// Inserts `record`, or replaces the fields of the row with the same name.
    pub async fn upsert(&self, record: &DownloadRecord) -> Result<(), PersistenceError> {
        let now = chrono::Utc::now().to_rfc3339();

        let active_model = download_records::ActiveModel {
            name: Set(record.name.clone()),
            size: Set(record.size.clone()),
            url: Set(record.url.clone()),
            queued: Set(record.queued),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        let affected = DownloadRecords::insert(active_model)
            .on_conflict(
                OnConflict::column(download_records::Column::Name)
                    .update_columns([
                        download_records::Column::Size,
                        download_records::Column::Url,
                        download_records::Column::Queued,
                        download_records::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.conn)
            .await?;

        if affected == 0 {
            return Err(PersistenceError::NotAcknowledged(record.name.clone()));
        }

        Ok(())
    }

    pub async fn recent(&self, limit: u64) -> Result<Vec<DownloadRecord>, PersistenceError> {
        let rows = DownloadRecords::find()
            .order_by_desc(download_records::Column::UpdatedAt)
            .order_by_desc(download_records::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await?;

        Ok(rows.into_iter().map(Self::map_model).collect())
    }

    pub async fn count(&self) -> Result<u64, PersistenceError> {
        Ok(DownloadRecords::find().count(&self.conn).await?)
    }
}
