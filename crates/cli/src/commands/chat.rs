use std::sync::Arc;

use crate::commands::{prepare, CommandResult};
use risepal_agent::{AgentRuntime, HttpLlmClient, RuntimeDeps, TurnRequest};
use risepal_core::audit::TracingAuditSink;
use risepal_core::clock::SystemClock;
use risepal_core::dialogue::SessionUser;
use risepal_core::domain::chat::SessionId;
use risepal_core::domain::user::UserId;
use risepal_db::repositories::{SqlUserRepository, UserRepository};
use risepal_db::{connect_with_settings, migrations};

type Failure = (&'static str, String, u8);

/// Runs a single turn. Session state lives only as long as this process, so
/// continuity across invocations comes from the persisted chat log.
pub fn run(user_id: i64, session: &str, message: &str) -> CommandResult {
    if message.trim().is_empty() {
        return CommandResult::failure("chat", "invalid_input", "message must not be empty", 2);
    }

    let (config, runtime) = match prepare("chat") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let users = SqlUserRepository::new(pool.clone());
        let user = match users.find_by_id(UserId(user_id)).await {
            Ok(Some(user)) if user.is_active() => user,
            Ok(_) => {
                pool.close().await;
                return Err::<_, Failure>((
                    "access_denied",
                    format!("user {user_id} is unknown or inactive"),
                    7u8,
                ));
            }
            Err(error) => return Err(("db_query", error.to_string(), 4u8)),
        };

        let llm = HttpLlmClient::from_config(&config.llm)
            .map_err(|error| ("llm_config", error.to_string(), 2u8))?;
        let deps = RuntimeDeps::sqlite(
            pool.clone(),
            Arc::new(llm),
            Arc::new(SystemClock::with_offset_minutes(config.dialogue.utc_offset_minutes)),
            Arc::new(TracingAuditSink),
        );
        let agent = AgentRuntime::new(deps, &config.dialogue)
            .map_err(|error| ("dialogue_config", error.to_string(), 2u8))?;

        let reply = agent
            .handle_turn(TurnRequest {
                session_id: SessionId::from(session),
                user: SessionUser::from(&user),
                message: message.to_string(),
                correlation_id: format!("cli-{}", uuid::Uuid::new_v4()),
            })
            .await;

        pool.close().await;
        Ok(reply)
    });

    match result {
        Ok(reply) => CommandResult::success(
            "chat",
            format!("[{} / {}] {}", reply.intent.as_str(), reply.outcome.as_str(), reply.reply),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("chat", error_class, message, exit_code)
        }
    }
}
