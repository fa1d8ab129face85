use risepal_core::domain::user::{generate_temporary_password, hash_password, NewUser, Role};

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlUserRepository, UserRepository};

/// Demo accounts covering every role, so each intent can be exercised from a
/// fresh database.
const SEED_USERS: &[SeedUser] = &[
    SeedUser { first_name: "Priya", last_name: "Shah", role: Role::Admin, team: "Operations" },
    SeedUser { first_name: "Mona", last_name: "Reyes", role: Role::Manager, team: "Software" },
    SeedUser { first_name: "Sam", last_name: "Wilson", role: Role::Employee, team: "Software" },
    SeedUser { first_name: "Ana", last_name: "Ortiz", role: Role::Employee, team: "HR" },
];

pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// Inserts the demo users that do not exist yet. Running it twice is a no-op.
    pub async fn load(pool: &DbPool, email_domain: &str) -> Result<SeedResult, RepositoryError> {
        let users = SqlUserRepository::new(pool.clone());
        let mut seeded = Vec::new();

        for seed in SEED_USERS {
            let full_name = seed.full_name();
            if let Some(existing) = users.find_by_full_name(&full_name).await? {
                seeded.push(SeededUser {
                    id: existing.id.0,
                    full_name: existing.full_name,
                    role: existing.role,
                    created: false,
                });
                continue;
            }

            let created = users
                .create(NewUser {
                    full_name,
                    email: seed.email(email_domain),
                    role: seed.role,
                    team: seed.team.to_string(),
                    credential_hash: hash_password(&generate_temporary_password()),
                })
                .await?;
            seeded.push(SeededUser {
                id: created.id.0,
                full_name: created.full_name,
                role: created.role,
                created: true,
            });
        }

        Ok(SeedResult { users: seeded })
    }

    /// Checks that every demo user exists with its expected role.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let users = SqlUserRepository::new(pool.clone());
        let mut checks = Vec::new();

        for seed in SEED_USERS {
            let present = users
                .find_by_full_name(&seed.full_name())
                .await?
                .is_some_and(|user| user.role == seed.role && user.is_active());
            checks.push((seed.first_name, present));
        }

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedUser {
    first_name: &'static str,
    last_name: &'static str,
    role: Role,
    team: &'static str,
}

impl SeedUser {
    fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    fn email(&self, domain: &str) -> String {
        format!(
            "{}.{}@{}",
            self.first_name.to_ascii_lowercase(),
            self.last_name.to_ascii_lowercase(),
            domain
        )
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub users: Vec<SeededUser>,
}

#[derive(Debug)]
pub struct SeededUser {
    pub id: i64,
    pub full_name: String,
    pub role: Role,
    pub created: bool,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
