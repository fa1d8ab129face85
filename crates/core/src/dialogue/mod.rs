//! Dialogue model shared by the agent runtime: intents and the role policy,
//! slot schemas, relative date resolution and the per-session conversation state.

pub mod dates;
pub mod intent;
pub mod slots;
pub mod state;

pub use intent::{Intent, RolePolicy};
pub use slots::{SlotKind, SlotSchema, SlotSpec, SlotValues};
pub use state::{ConversationState, EmployeeRef, PendingIntent, ResolvedRefs, SessionUser, UpdateRef};
