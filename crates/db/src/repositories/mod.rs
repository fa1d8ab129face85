use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{Row, Transaction};
use thiserror::Error;

use risepal_core::domain::chat::{ChatMessage, NewChatMessage, SessionId};
use risepal_core::domain::daily_update::{
    DailyUpdate, DailyUpdateId, NewDailyUpdate, UpdatePolicy,
};
use risepal_core::domain::task::{NewTask, Task};
use risepal_core::domain::user::{NewUser, User, UserId};

use crate::DbPool;

pub mod chat;
pub mod daily_update;
pub mod memory;
pub mod task;
pub mod user;

pub use chat::SqlChatMessageRepository;
pub use daily_update::SqlDailyUpdateRepository;
pub use memory::InMemoryChatMessageRepository;
pub use task::SqlTaskRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unique constraint violated: {field} `{value}` already exists")]
    UniqueViolation { field: String, value: String },
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    /// Case-insensitive lookup on the unique full name, whitespace collapsed.
    async fn find_by_full_name(&self, full_name: &str) -> Result<Option<User>, RepositoryError>;
    /// Checks email and full-name uniqueness and inserts inside one transaction.
    async fn create(&self, user: NewUser) -> Result<User, RepositoryError>;
    async fn count(&self) -> Result<i64, RepositoryError>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: NewTask) -> Result<Task, RepositoryError>;
    async fn find_for_assignee_by_title(
        &self,
        assignee: UserId,
        title: &str,
    ) -> Result<Option<Task>, RepositoryError>;
    async fn count(&self) -> Result<i64, RepositoryError>;
}

#[async_trait]
pub trait DailyUpdateRepository: Send + Sync {
    /// Inserts an update; with [`UpdatePolicy::OnePerDay`] an existing update for
    /// the same user and date is a `UniqueViolation` on `date`.
    async fn create(
        &self,
        update: NewDailyUpdate,
        policy: UpdatePolicy,
    ) -> Result<DailyUpdate, RepositoryError>;
    /// Most recent update for the user on that date; ties resolve to the highest id.
    async fn latest_for(
        &self,
        user: UserId,
        date: NaiveDate,
    ) -> Result<Option<DailyUpdate>, RepositoryError>;
    async fn find_by_id(&self, id: DailyUpdateId) -> Result<Option<DailyUpdate>, RepositoryError>;
    /// Appends a newline-separated comment. `None` when the row no longer exists.
    async fn append_comment(
        &self,
        id: DailyUpdateId,
        comment: &str,
    ) -> Result<Option<DailyUpdate>, RepositoryError>;
    async fn count(&self) -> Result<i64, RepositoryError>;
}

#[async_trait]
pub trait ChatMessageRepository: Send + Sync {
    async fn append(&self, message: NewChatMessage) -> Result<ChatMessage, RepositoryError>;
    /// The last `limit` messages of the session in chronological order.
    async fn recent(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError>;
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|error| RepositoryError::Decode(error.to_string()))
}

pub(crate) fn date_column(row: &SqliteRow, name: &str) -> Result<NaiveDate, RepositoryError> {
    let raw: String = column(row, name)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|error| RepositoryError::Decode(format!("{name} `{raw}`: {error}")))
}

pub(crate) fn timestamp_column(
    row: &SqliteRow,
    name: &str,
) -> Result<DateTime<Utc>, RepositoryError> {
    let raw: String = column(row, name)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{name} `{raw}`: {error}")))
}

/// Opens a write transaction that takes the database write lock up front, so a
/// check-then-insert sequence cannot interleave with another writer.
pub(crate) async fn begin_write(
    pool: &DbPool,
) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

pub(crate) fn date_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Maps a store-level unique constraint failure onto the column it names,
/// taking the offending value from `candidates`.
pub(crate) fn map_write_error(error: sqlx::Error, candidates: &[(&str, &str)]) -> RepositoryError {
    let violated = match &error {
        sqlx::Error::Database(database) if database.is_unique_violation() => {
            let message = database.message().to_string();
            Some(message)
        }
        _ => None,
    };

    match violated {
        Some(message) => {
            let (field, value) = candidates
                .iter()
                .find(|(field, _)| message.contains(&format!(".{field}")))
                .map(|(field, value)| (field.to_string(), value.to_string()))
                .unwrap_or_else(|| ("unknown".to_string(), String::new()));
            RepositoryError::UniqueViolation { field, value }
        }
        None => RepositoryError::Database(error),
    }
}

#[cfg(test)]
mod tests {
    use super::{map_write_error, RepositoryError};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn migrated_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    async fn raw_insert_user(pool: &DbPool, full_name: &str, email: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (full_name, email, role, team, status, credential_hash, created_at)
             VALUES (?1, ?2, 'employee', 'Software', 'active', 'x', '2026-01-01T00:00:00+00:00')",
        )
        .bind(full_name)
        .bind(email)
        .execute(pool)
        .await
        .map(|_| ())
    }

    #[tokio::test]
    async fn unique_constraint_failure_maps_to_the_named_column() {
        let pool = migrated_pool().await;
        raw_insert_user(&pool, "Sam Wilson", "sam@example.com").await.expect("first insert");

        let error = raw_insert_user(&pool, "Samuel Wilson", "sam@example.com")
            .await
            .expect_err("duplicate email");
        let mapped = map_write_error(
            error,
            &[("email", "sam@example.com"), ("full_name", "Samuel Wilson")],
        );

        assert!(matches!(
            mapped,
            RepositoryError::UniqueViolation { ref field, ref value }
                if field == "email" && value == "sam@example.com"
        ));
    }

    #[tokio::test]
    async fn unmatched_unique_column_and_other_failures_are_kept_apart() {
        let pool = migrated_pool().await;
        raw_insert_user(&pool, "Ana Ortiz", "ana@example.com").await.expect("first insert");

        let duplicate = raw_insert_user(&pool, "Other Name", "ana@example.com")
            .await
            .expect_err("duplicate email");
        assert!(matches!(
            map_write_error(duplicate, &[("full_name", "Other Name")]),
            RepositoryError::UniqueViolation { ref field, .. } if field == "unknown"
        ));

        let missing_table = sqlx::query("INSERT INTO no_such_table (id) VALUES (1)")
            .execute(&pool)
            .await
            .expect_err("missing table");
        assert!(matches!(
            map_write_error(missing_table, &[("email", "ana@example.com")]),
            RepositoryError::Database(_)
        ));
    }
}
