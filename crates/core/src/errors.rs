use thiserror::Error;

use crate::dialogue::intent::Intent;
use crate::domain::user::Role;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("`{value}` is not an absolute calendar date")]
    RelativeDate { value: String },
    #[error("slot schema for {intent} is invalid: {reason}")]
    InvalidSchema { intent: Intent, reason: String },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to use the assistant with this account.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(_) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::AccessDenied(message) => {
                Self::Forbidden { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

/// Exceptional outcomes of a conversational turn. A missing slot is not one of
/// these: it is the `Incomplete` result of the clarification step.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("completion output could not be parsed: {reason}")]
    ExtractionFailure { reason: String },
    #[error("{entity} `{key}` was not found")]
    EntityNotFound { entity: &'static str, key: String },
    #[error("{entity} with {field} `{value}` already exists")]
    DuplicateEntity { entity: &'static str, field: &'static str, value: String },
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
    #[error("role {role:?} may not invoke {intent}")]
    UnauthorizedIntent { role: Role, intent: Intent },
}

impl TurnError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExtractionFailure { .. } => "extraction_failure",
            Self::EntityNotFound { .. } => "entity_not_found",
            Self::DuplicateEntity { .. } => "duplicate_entity",
            Self::PersistenceFailure(_) => "persistence_failure",
            Self::UnauthorizedIntent { .. } => "unauthorized_intent",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::ExtractionFailure { .. } => {
                "Sorry, I couldn't make sense of that. Could you rephrase your request?".to_string()
            }
            Self::EntityNotFound { entity, key } => {
                format!("I couldn't find {entity} '{key}' in the system.")
            }
            Self::DuplicateEntity { entity, field, value } => {
                format!("A {entity} with {field} '{value}' already exists. Nothing was changed.")
            }
            Self::PersistenceFailure(_) => {
                "Something went wrong while saving or reading data. Nothing was changed, please try again shortly."
                    .to_string()
            }
            Self::UnauthorizedIntent { .. } => {
                "That action isn't available for your role.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::dialogue::intent::Intent;
    use crate::domain::user::Role;
    use crate::errors::{ApplicationError, DomainError, InterfaceError, TurnError};

    #[test]
    fn domain_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::InvariantViolation(
            "missing required field".to_owned(),
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn access_denied_maps_to_forbidden() {
        let interface =
            ApplicationError::AccessDenied("user 9 is inactive".to_owned()).into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Forbidden { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("invalid api key".to_owned()).into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn entity_not_found_surfaces_the_key_verbatim() {
        let error = TurnError::EntityNotFound { entity: "employee", key: "Sam Wilsen".into() };
        assert_eq!(error.user_message(), "I couldn't find employee 'Sam Wilsen' in the system.");
        assert_eq!(error.kind(), "entity_not_found");
    }

    #[test]
    fn persistence_failure_hides_internal_detail() {
        let error = TurnError::PersistenceFailure("disk I/O error".into());
        assert!(!error.user_message().contains("disk"));
    }

    #[test]
    fn unauthorized_intent_names_no_internals() {
        let error = TurnError::UnauthorizedIntent { role: Role::Employee, intent: Intent::CreateUser };
        assert_eq!(error.kind(), "unauthorized_intent");
        assert!(error.to_string().contains("create_user"));
    }
}
