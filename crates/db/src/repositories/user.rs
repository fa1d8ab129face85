use chrono::Utc;
use sqlx::sqlite::SqliteRow;

use risepal_core::domain::user::{NewUser, Role, User, UserId, UserStatus};

use super::{
    begin_write, column, map_write_error, timestamp_column, RepositoryError, UserRepository,
};
use crate::DbPool;

const USER_COLUMNS: &str =
    "id, full_name, email, role, team, status, credential_hash, created_at";

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &SqliteRow) -> Result<User, RepositoryError> {
    let role: String = column(row, "role")?;
    let status: String = column(row, "status")?;

    Ok(User {
        id: UserId(column(row, "id")?),
        full_name: column(row, "full_name")?,
        email: column(row, "email")?,
        role: role.parse::<Role>().map_err(|error| RepositoryError::Decode(error.to_string()))?,
        team: column(row, "team")?,
        status: UserStatus::parse(&status),
        credential_hash: column(row, "credential_hash")?,
        created_at: timestamp_column(row, "created_at")?,
    })
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_by_full_name(&self, full_name: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE full_name = ?1 COLLATE NOCASE"
        ))
        .bind(collapse_whitespace(full_name))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let full_name = collapse_whitespace(&user.full_name);
        let email = user.email.trim().to_ascii_lowercase();
        let mut tx = begin_write(&self.pool).await?;

        let email_taken: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1 COLLATE NOCASE)",
        )
        .bind(&email)
        .fetch_one(&mut *tx)
        .await?;
        if email_taken == 1 {
            return Err(RepositoryError::UniqueViolation { field: "email".to_string(), value: email });
        }

        let name_taken: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE full_name = ?1 COLLATE NOCASE)",
        )
        .bind(&full_name)
        .fetch_one(&mut *tx)
        .await?;
        if name_taken == 1 {
            return Err(RepositoryError::UniqueViolation {
                field: "full_name".to_string(),
                value: full_name,
            });
        }

        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (full_name, email, role, team, status, credential_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&full_name)
        .bind(&email)
        .bind(user.role.as_str())
        .bind(&user.team)
        .bind(UserStatus::Active.as_str())
        .bind(&user.credential_hash)
        .bind(created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|error| {
            map_write_error(error, &[("email", email.as_str()), ("full_name", full_name.as_str())])
        })?;

        tx.commit().await?;

        Ok(User {
            id: UserId(result.last_insert_rowid()),
            full_name,
            email,
            role: user.role,
            team: user.team,
            status: UserStatus::Active,
            credential_hash: user.credential_hash,
            created_at,
        })
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar("SELECT COUNT(1) FROM users").fetch_one(&self.pool).await?)
    }
}

#[cfg(test)]
mod tests {
    use risepal_core::domain::user::{hash_password, NewUser, Role, UserId};

    use super::SqlUserRepository;
    use crate::repositories::{RepositoryError, UserRepository};
    use crate::{connect_with_settings, migrations};

    async fn repository() -> SqlUserRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlUserRepository::new(pool)
    }

    fn new_user(full_name: &str, email: &str) -> NewUser {
        NewUser {
            full_name: full_name.to_string(),
            email: email.to_string(),
            role: Role::Employee,
            team: "Software".to_string(),
            credential_hash: hash_password("temporary"),
        }
    }

    #[tokio::test]
    async fn create_and_find_by_name_ignores_case_and_spacing() {
        let repo = repository().await;
        let created =
            repo.create(new_user("Sam Wilson", "Sam.Wilson@example.com")).await.expect("create");

        assert_eq!(created.email, "sam.wilson@example.com");
        let found = repo.find_by_full_name("  sam   WILSON ").await.expect("lookup");
        assert_eq!(found.map(|user| user.id), Some(created.id));

        let by_id = repo.find_by_id(created.id).await.expect("lookup by id").expect("present");
        assert_eq!(by_id.full_name, "Sam Wilson");
        assert!(by_id.is_active());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_without_insert() {
        let repo = repository().await;
        repo.create(new_user("Sam Wilson", "sam.wilson@example.com")).await.expect("create");

        let error = repo
            .create(new_user("Samuel Wilson", "SAM.WILSON@example.com"))
            .await
            .expect_err("duplicate email");

        assert!(matches!(
            error,
            RepositoryError::UniqueViolation { ref field, .. } if field == "email"
        ));
        assert_eq!(repo.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn duplicate_full_name_is_rejected() {
        let repo = repository().await;
        repo.create(new_user("Ana Ortiz", "ana@example.com")).await.expect("create");

        let error =
            repo.create(new_user("ana ortiz", "a.ortiz@example.com")).await.expect_err("dup name");
        assert!(matches!(
            error,
            RepositoryError::UniqueViolation { ref field, .. } if field == "full_name"
        ));
    }

    #[tokio::test]
    async fn missing_user_is_none() {
        let repo = repository().await;
        assert!(repo.find_by_id(UserId(404)).await.expect("lookup").is_none());
        assert!(repo.find_by_full_name("Nobody Here").await.expect("lookup").is_none());
    }
}
