use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;

use risepal_core::domain::daily_update::{
    DailyUpdate, DailyUpdateId, NewDailyUpdate, UpdatePolicy,
};
use risepal_core::domain::task::TaskId;
use risepal_core::domain::user::UserId;

use super::{
    begin_write, column, date_column, date_text, DailyUpdateRepository, RepositoryError,
};
use crate::DbPool;

const UPDATE_COLUMNS: &str = "id, user_id, date, title, work_done, reference_link, comment, task_id";

pub struct SqlDailyUpdateRepository {
    pool: DbPool,
}

impl SqlDailyUpdateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_update(row: &SqliteRow) -> Result<DailyUpdate, RepositoryError> {
    let task_id: Option<i64> = column(row, "task_id")?;

    Ok(DailyUpdate {
        id: DailyUpdateId(column(row, "id")?),
        user_id: UserId(column(row, "user_id")?),
        date: date_column(row, "date")?,
        title: column(row, "title")?,
        work_done: column(row, "work_done")?,
        reference_link: column(row, "reference_link")?,
        comment: column(row, "comment")?,
        task_id: task_id.map(TaskId),
    })
}

#[async_trait::async_trait]
impl DailyUpdateRepository for SqlDailyUpdateRepository {
    async fn create(
        &self,
        update: NewDailyUpdate,
        policy: UpdatePolicy,
    ) -> Result<DailyUpdate, RepositoryError> {
        let date = date_text(update.date);
        let mut tx = begin_write(&self.pool).await?;

        if policy == UpdatePolicy::OnePerDay {
            let exists: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM daily_updates WHERE user_id = ?1 AND date = ?2)",
            )
            .bind(update.user_id.0)
            .bind(&date)
            .fetch_one(&mut *tx)
            .await?;
            if exists == 1 {
                return Err(RepositoryError::UniqueViolation { field: "date".to_string(), value: date });
            }
        }

        let result = sqlx::query(
            "INSERT INTO daily_updates (user_id, date, title, work_done, reference_link, task_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(update.user_id.0)
        .bind(&date)
        .bind(&update.title)
        .bind(&update.work_done)
        .bind(&update.reference_link)
        .bind(update.task_id.map(|task| task.0))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(DailyUpdate {
            id: DailyUpdateId(result.last_insert_rowid()),
            user_id: update.user_id,
            date: update.date,
            title: update.title,
            work_done: update.work_done,
            reference_link: update.reference_link,
            comment: None,
            task_id: update.task_id,
        })
    }

    async fn latest_for(
        &self,
        user: UserId,
        date: NaiveDate,
    ) -> Result<Option<DailyUpdate>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {UPDATE_COLUMNS} FROM daily_updates
             WHERE user_id = ?1 AND date = ?2
             ORDER BY id DESC
             LIMIT 1"
        ))
        .bind(user.0)
        .bind(date_text(date))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_update).transpose()
    }

    async fn find_by_id(&self, id: DailyUpdateId) -> Result<Option<DailyUpdate>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {UPDATE_COLUMNS} FROM daily_updates WHERE id = ?1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_update).transpose()
    }

    async fn append_comment(
        &self,
        id: DailyUpdateId,
        comment: &str,
    ) -> Result<Option<DailyUpdate>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE daily_updates
             SET comment = CASE
                 WHEN comment IS NULL OR comment = '' THEN ?1
                 ELSE comment || char(10) || ?1
             END
             WHERE id = ?2",
        )
        .bind(comment.trim())
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query(&format!("SELECT {UPDATE_COLUMNS} FROM daily_updates WHERE id = ?1"))
            .bind(id.0)
            .fetch_one(&mut *tx)
            .await?;
        let updated = row_to_update(&row)?;
        tx.commit().await?;

        Ok(Some(updated))
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar("SELECT COUNT(1) FROM daily_updates").fetch_one(&self.pool).await?)
    }
}
