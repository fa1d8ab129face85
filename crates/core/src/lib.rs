pub mod audit;
pub mod clock;
pub mod config;
pub mod dialogue;
pub mod domain;
pub mod errors;

pub use clock::{Clock, FixedClock, SystemClock};
pub use dialogue::{ConversationState, Intent, RolePolicy, SlotSchema, SlotValues};
pub use domain::chat::{ChatMessage, NewChatMessage, Sender, SessionId};
pub use domain::daily_update::{DailyUpdate, DailyUpdateId, NewDailyUpdate, UpdatePolicy};
pub use domain::task::{NewTask, Task, TaskId, TaskStatus};
pub use domain::user::{NewUser, Role, User, UserId, UserStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError, TurnError};
