use sqlx::sqlite::SqliteRow;

use risepal_core::domain::task::{NewTask, Task, TaskId, TaskStatus};
use risepal_core::domain::user::UserId;

use super::{column, date_column, date_text, RepositoryError, TaskRepository};
use crate::DbPool;

pub struct SqlTaskRepository {
    pool: DbPool,
}

impl SqlTaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_task(row: &SqliteRow) -> Result<Task, RepositoryError> {
    let status: String = column(row, "status")?;

    Ok(Task {
        id: TaskId(column(row, "id")?),
        title: column(row, "title")?,
        description: column(row, "description")?,
        assigned_by: UserId(column(row, "assigned_by")?),
        assigned_to: UserId(column(row, "assigned_to")?),
        assigned_date: date_column(row, "assigned_date")?,
        due_date: date_column(row, "due_date")?,
        status: status
            .parse::<TaskStatus>()
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
    })
}

#[async_trait::async_trait]
impl TaskRepository for SqlTaskRepository {
    async fn create(&self, task: NewTask) -> Result<Task, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO tasks (title, description, assigned_by, assigned_to, assigned_date, due_date, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.assigned_by.0)
        .bind(task.assigned_to.0)
        .bind(date_text(task.assigned_date))
        .bind(date_text(task.due_date))
        .bind(TaskStatus::Open.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Task {
            id: TaskId(result.last_insert_rowid()),
            title: task.title,
            description: task.description,
            assigned_by: task.assigned_by,
            assigned_to: task.assigned_to,
            assigned_date: task.assigned_date,
            due_date: task.due_date,
            status: TaskStatus::Open,
        })
    }

    async fn find_for_assignee_by_title(
        &self,
        assignee: UserId,
        title: &str,
    ) -> Result<Option<Task>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, title, description, assigned_by, assigned_to, assigned_date, due_date, status
             FROM tasks
             WHERE assigned_to = ?1 AND title = ?2 COLLATE NOCASE
             ORDER BY id DESC
             LIMIT 1",
        )
        .bind(assignee.0)
        .bind(title.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_task).transpose()
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar("SELECT COUNT(1) FROM tasks").fetch_one(&self.pool).await?)
    }
}
