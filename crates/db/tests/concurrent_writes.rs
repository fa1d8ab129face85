use std::sync::Arc;

use chrono::NaiveDate;
use risepal_core::domain::daily_update::{NewDailyUpdate, UpdatePolicy};
use risepal_core::domain::user::{hash_password, NewUser, Role};
use risepal_db::repositories::{
    DailyUpdateRepository, RepositoryError, SqlDailyUpdateRepository, SqlUserRepository,
    UserRepository,
};
use risepal_db::{connect_with_settings, migrations, DbPool};
use tempfile::TempDir;

const WRITERS: usize = 8;

async fn file_pool(dir: &TempDir) -> DbPool {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("risepal.db").display());
    let pool = connect_with_settings(&url, WRITERS as u32, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    pool
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

fn is_duplicate(error: &RepositoryError, expected_field: &str) -> bool {
    matches!(error, RepositoryError::UniqueViolation { field, .. } if field == expected_field)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_user_creates_yield_one_row_and_duplicate_errors() {
    let dir = TempDir::new().expect("temp dir");
    let pool = file_pool(&dir).await;
    let users = Arc::new(SqlUserRepository::new(pool.clone()));

    let handles: Vec<_> = (0..WRITERS)
        .map(|index| {
            let users = Arc::clone(&users);
            tokio::spawn(async move {
                users
                    .create(new_user(&format!("Sam Wilson {index}"), "sam.wilson@example.com"))
                    .await
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => created += 1,
            Err(error) => assert!(is_duplicate(&error, "email"), "unexpected error: {error}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(users.count().await.expect("count"), 1);
    pool.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_daily_updates_respect_one_per_day() {
    let dir = TempDir::new().expect("temp dir");
    let pool = file_pool(&dir).await;
    let user = SqlUserRepository::new(pool.clone())
        .create(new_user("Ana Ortiz", "ana@example.com"))
        .await
        .expect("user");
    let updates = Arc::new(SqlDailyUpdateRepository::new(pool.clone()));
    let date = NaiveDate::from_ymd_opt(2026, 3, 2).expect("date");

    let handles: Vec<_> = (0..WRITERS)
        .map(|index| {
            let (updates, user_id, date) = (Arc::clone(&updates), user.id, date);
            tokio::spawn(async move {
                updates
                    .create(
                        NewDailyUpdate {
                            user_id,
                            date,
                            title: format!("Standup {index}"),
                            work_done: "Reviewed the release checklist".to_string(),
                            reference_link: None,
                            task_id: None,
                        },
                        UpdatePolicy::OnePerDay,
                    )
                    .await
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => created += 1,
            Err(error) => assert!(is_duplicate(&error, "date"), "unexpected error: {error}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(updates.count().await.expect("count"), 1);
    pool.close().await;
}
