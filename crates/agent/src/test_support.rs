use std::sync::Arc;

use chrono::NaiveDate;
use risepal_core::audit::InMemoryAuditSink;
use risepal_core::clock::FixedClock;
use risepal_core::dialogue::{ConversationState, SessionUser};
use risepal_core::domain::chat::SessionId;
use risepal_core::domain::daily_update::UpdatePolicy;
use risepal_core::domain::user::{Role, UserId};
use risepal_db::repositories::{
    SqlDailyUpdateRepository, SqlTaskRepository, SqlUserRepository, UserRepository,
};
use risepal_db::{connect_with_settings, migrations, DbPool, DemoSeedDataset};

use crate::dispatch::DispatchDeps;
use crate::llm::ScriptedLlmClient;

pub(crate) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, 10).expect("date")
}

pub(crate) fn session_state(role: Role) -> ConversationState {
    ConversationState::new(
        SessionId::from("session-1"),
        SessionUser {
            id: UserId(1),
            full_name: "Test User".to_string(),
            role,
            team: "Software".to_string(),
        },
    )
}

pub(crate) struct Harness {
    pub pool: DbPool,
    pub llm: Arc<ScriptedLlmClient>,
    pub audit: Arc<InMemoryAuditSink>,
    pub deps: DispatchDeps,
    pub admin: SessionUser,
    pub manager: SessionUser,
    pub employee: SessionUser,
}

impl Harness {
    pub(crate) async fn new(llm: ScriptedLlmClient) -> Self {
        Self::with_policy(llm, UpdatePolicy::AllowMultiple).await
    }

    pub(crate) async fn with_policy(llm: ScriptedLlmClient, update_policy: UpdatePolicy) -> Self {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoSeedDataset::load(&pool, "example.com").await.expect("seed");

        let users = Arc::new(SqlUserRepository::new(pool.clone()));
        let lookup = |name: &'static str| {
            let users = users.clone();
            async move {
                let user = users.find_by_full_name(name).await.expect("lookup").expect("seeded");
                SessionUser::from(&user)
            }
        };
        let admin = lookup("Priya Shah").await;
        let manager = lookup("Mona Reyes").await;
        let employee = lookup("Sam Wilson").await;

        let llm = Arc::new(llm);
        let deps = DispatchDeps {
            users,
            tasks: Arc::new(SqlTaskRepository::new(pool.clone())),
            updates: Arc::new(SqlDailyUpdateRepository::new(pool.clone())),
            llm: llm.clone(),
            clock: Arc::new(FixedClock::on(today())),
            update_policy,
        };

        Self {
            pool,
            llm,
            audit: Arc::new(InMemoryAuditSink::default()),
            deps,
            admin,
            manager,
            employee,
        }
    }

    pub(crate) fn state_for(&self, user: &SessionUser) -> ConversationState {
        ConversationState::new(SessionId::from("session-1"), user.clone())
    }
}
