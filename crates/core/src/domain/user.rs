use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::DomainError;

const CREDENTIAL_SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;
const TEMPORARY_PASSWORD_LEN: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Employee,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Manager, Role::Employee];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Employee => "employee",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Manager => "Manager",
            Self::Employee => "Employee",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" | "administrator" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "employee" | "staff" => Ok(Self::Employee),
            other => Err(DomainError::InvariantViolation(format!("unknown role `{other}`"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("inactive") {
            Self::Inactive
        } else {
            Self::Active
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub team: String,
    pub status: UserStatus,
    #[serde(skip_serializing)]
    pub credential_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Insert payload for a user row; the store assigns the id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub team: String,
    pub credential_hash: String,
}

/// Collapses whitespace and title-cases each word: `"sam  WILSON"` becomes `"Sam Wilson"`.
pub fn canonical_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn generate_temporary_password() -> String {
    random_token(TEMPORARY_PASSWORD_LEN)
}

pub fn hash_password(password: &str) -> String {
    hash_with_salt(password, &random_token(SALT_LEN))
}

pub fn verify_password(password: &str, credential_hash: &str) -> bool {
    let mut parts = credential_hash.splitn(3, '$');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(CREDENTIAL_SCHEME), Some(salt), Some(_)) => {
            hash_with_salt(password, salt) == credential_hash
        }
        _ => false,
    }
}

fn hash_with_salt(password: &str, salt: &str) -> String {
    let digest =
        Sha256::new().chain_update(salt.as_bytes()).chain_update(password.as_bytes()).finalize();
    let hex = digest.iter().map(|byte| format!("{byte:02x}")).collect::<String>();
    format!("{CREDENTIAL_SCHEME}${salt}${hex}")
}

fn random_token(len: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::{canonical_name, hash_password, verify_password, Role};

    #[test]
    fn canonical_name_collapses_whitespace_and_casing() {
        assert_eq!(canonical_name("  sam   WILSON "), "Sam Wilson");
        assert_eq!(canonical_name("jane"), "Jane");
        assert_eq!(canonical_name(""), "");
    }

    #[test]
    fn role_parsing_accepts_known_labels_only() {
        assert_eq!("Manager".parse::<Role>().ok(), Some(Role::Manager));
        assert_eq!(" employee ".parse::<Role>().ok(), Some(Role::Employee));
        assert!("ceo".parse::<Role>().is_err());
    }

    #[test]
    fn password_hash_verifies_and_is_salted() {
        let first = hash_password("jake123");
        let second = hash_password("jake123");

        assert_ne!(first, second, "salts should differ between hashes");
        assert!(first.starts_with("sha256$"));
        assert!(verify_password("jake123", &first));
        assert!(verify_password("jake123", &second));
        assert!(!verify_password("jake124", &first));
        assert!(!verify_password("jake123", "plaintext"));
    }
}
