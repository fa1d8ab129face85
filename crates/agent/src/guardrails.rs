use risepal_core::dialogue::{Intent, RolePolicy};
use risepal_core::domain::user::Role;
use risepal_core::errors::TurnError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Degrade { reason_code: &'static str, error: TurnError, fallback: Intent },
}

impl GuardrailDecision {
    /// The intent the turn may actually run under.
    pub fn effective(&self, requested: Intent) -> Intent {
        match self {
            Self::Allow => requested,
            Self::Degrade { fallback, .. } => *fallback,
        }
    }
}

/// Applies the role policy table to a classified intent. A forbidden intent is
/// never executed; it degrades to `other`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntentGuardrail {
    policy: RolePolicy,
}

impl Default for IntentGuardrail {
    fn default() -> Self {
        Self::new(RolePolicy::default())
    }
}

impl IntentGuardrail {
    pub fn new(policy: RolePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RolePolicy {
        &self.policy
    }

    pub fn allowed(&self, role: Role) -> Vec<Intent> {
        self.policy.allowed(role)
    }

    pub fn evaluate(&self, role: Role, intent: Intent) -> GuardrailDecision {
        if self.policy.permits(role, intent) {
            return GuardrailDecision::Allow;
        }
        GuardrailDecision::Degrade {
            reason_code: "intent_not_permitted_for_role",
            error: TurnError::UnauthorizedIntent { role, intent },
            fallback: Intent::Other,
        }
    }
}
