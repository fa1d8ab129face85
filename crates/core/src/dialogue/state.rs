use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dialogue::intent::Intent;
use crate::dialogue::slots::SlotValues;
use crate::domain::chat::SessionId;
use crate::domain::daily_update::DailyUpdateId;
use crate::domain::user::{Role, User, UserId};

/// The acting user as the session knows them. Handlers read identity from here,
/// never from message text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: UserId,
    pub full_name: String,
    pub role: Role,
    pub team: String,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name.clone(),
            role: user.role,
            team: user.team.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRef {
    pub id: UserId,
    pub full_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRef {
    pub id: DailyUpdateId,
    pub date: NaiveDate,
    pub title: String,
    pub owner: EmployeeRef,
}

/// An intent whose clarification question is still open.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingIntent {
    pub intent: Intent,
    pub known: SlotValues,
}

/// Entity references produced by a dispatch, to be folded into the next state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedRefs {
    pub employee: Option<EmployeeRef>,
    pub update: Option<UpdateRef>,
}

impl ResolvedRefs {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn employee(employee: EmployeeRef) -> Self {
        Self { employee: Some(employee), update: None }
    }

    pub fn update(update: UpdateRef) -> Self {
        Self { employee: Some(update.owner.clone()), update: Some(update) }
    }
}

/// Per-session dialogue state. Every stage takes the current value and returns
/// the next one; nothing mutates it in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: SessionId,
    pub user: SessionUser,
    pub summary: String,
    pub pending: Option<PendingIntent>,
    pub last_employee: Option<EmployeeRef>,
    pub last_update: Option<UpdateRef>,
    pub turn_count: u32,
}

impl ConversationState {
    pub fn new(session_id: SessionId, user: SessionUser) -> Self {
        Self {
            session_id,
            user,
            summary: String::new(),
            pending: None,
            last_employee: None,
            last_update: None,
            turn_count: 0,
        }
    }

    /// Continue `previous` when it belongs to the same user, otherwise start over.
    /// Role and team are always refreshed from the store-backed identity.
    pub fn resume(previous: Option<Self>, session_id: SessionId, user: SessionUser) -> Self {
        match previous {
            Some(state) if state.user.id == user.id && state.session_id == session_id => {
                Self { user, ..state }
            }
            _ => Self::new(session_id, user),
        }
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    pub fn pending_intent(&self) -> Option<Intent> {
        self.pending.as_ref().map(|pending| pending.intent)
    }

    pub fn known_for(&self, intent: Intent) -> SlotValues {
        match &self.pending {
            Some(pending) if pending.intent == intent => pending.known.clone(),
            _ => SlotValues::new(),
        }
    }

    pub fn with_summary(self, summary: impl Into<String>) -> Self {
        Self { summary: summary.into(), ..self }
    }

    pub fn with_pending(self, intent: Intent, known: SlotValues) -> Self {
        Self { pending: Some(PendingIntent { intent, known }), ..self }
    }

    pub fn without_pending(self) -> Self {
        Self { pending: None, ..self }
    }

    /// Fold dispatcher output into the state. A newly resolved employee without an
    /// update invalidates an update reference that belongs to someone else.
    pub fn with_resolved(self, refs: ResolvedRefs) -> Self {
        let ResolvedRefs { employee, update } = refs;
        let mut next = self;

        if let Some(update) = update {
            next.last_employee = Some(update.owner.clone());
            next.last_update = Some(update);
            return next;
        }

        if let Some(employee) = employee {
            let stale = next.last_update.as_ref().is_some_and(|update| update.owner.id != employee.id);
            if stale {
                next.last_update = None;
            }
            next.last_employee = Some(employee);
        }
        next
    }

    pub fn next_turn(self) -> Self {
        Self { turn_count: self.turn_count.saturating_add(1), ..self }
    }
}
