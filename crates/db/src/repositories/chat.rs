use sqlx::sqlite::SqliteRow;

use risepal_core::domain::chat::{ChatMessage, NewChatMessage, Sender, SessionId};
use risepal_core::domain::user::UserId;

use super::{column, timestamp_column, ChatMessageRepository, RepositoryError};
use crate::DbPool;

pub struct SqlChatMessageRepository {
    pool: DbPool,
}

impl SqlChatMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_message(row: &SqliteRow) -> Result<ChatMessage, RepositoryError> {
    let user_id: Option<i64> = column(row, "user_id")?;
    let sender: String = column(row, "sender")?;

    Ok(ChatMessage {
        id: column(row, "id")?,
        session_id: SessionId(column(row, "session_id")?),
        user_id: user_id.map(UserId),
        sender: Sender::parse(&sender),
        message: column(row, "message")?,
        timestamp: timestamp_column(row, "timestamp")?,
    })
}

#[async_trait::async_trait]
impl ChatMessageRepository for SqlChatMessageRepository {
    async fn append(&self, message: NewChatMessage) -> Result<ChatMessage, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO chat_messages (session_id, user_id, sender, message, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(message.session_id.as_str())
        .bind(message.user_id.map(|user| user.0))
        .bind(message.sender.as_str())
        .bind(&message.message)
        .bind(message.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(ChatMessage {
            id: result.last_insert_rowid(),
            session_id: message.session_id,
            user_id: message.user_id,
            sender: message.sender,
            message: message.message,
            timestamp: message.timestamp,
        })
    }

    async fn recent(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, session_id, user_id, sender, message, timestamp
             FROM chat_messages
             WHERE session_id = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )
        .bind(session_id.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows.iter().map(row_to_message).collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use risepal_core::domain::chat::{NewChatMessage, Sender, SessionId};

    use super::SqlChatMessageRepository;
    use crate::repositories::ChatMessageRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn recent_returns_the_tail_in_chronological_order() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlChatMessageRepository::new(pool);
        let start = Utc.with_ymd_and_hms(2025, 7, 10, 9, 0, 0).single().expect("timestamp");

        for index in 0..7 {
            let session = if index == 3 { "other" } else { "s-1" };
            repo.append(NewChatMessage {
                session_id: SessionId::from(session),
                user_id: None,
                sender: if index % 2 == 0 { Sender::User } else { Sender::Bot },
                message: format!("message {index}"),
                timestamp: start + Duration::minutes(index),
            })
            .await
            .expect("append");
        }

        let recent = repo.recent(&SessionId::from("s-1"), 3).await.expect("recent");
        let texts = recent.iter().map(|message| message.message.as_str()).collect::<Vec<_>>();
        assert_eq!(texts, vec!["message 4", "message 5", "message 6"]);
        assert_eq!(recent[0].sender, Sender::User);
        assert_eq!(recent[0].timestamp, start + Duration::minutes(4));
    }
}
