use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Account role. Closed set; an account never changes role after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    Student,
    Recruiter,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "student" => Some(Role::Student),
            "recruiter" => Some(Role::Recruiter),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Student => f.write_str("student"),
            Role::Recruiter => f.write_str("recruiter"),
        }
    }
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub fullname: String,
    pub email: String,
    pub phone_number: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub bio: Option<String>,
    pub skills: Vec<String>,
    pub profile_photo_url: Option<String>,
    pub resume_url: Option<String>,
    pub resume_original_name: Option<String>,
    pub created_at: OffsetDateTime,
}

pub struct NewUser<'a> {
    pub fullname: &'a str,
    pub email: &'a str,
    pub phone_number: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub profile_photo_url: Option<&'a str>,
}

const USER_COLUMNS: &str = "id, fullname, email, phone_number, password_hash, role, bio, skills, \
     profile_photo_url, resume_url, resume_original_name, created_at";

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Insert a new account. Duplicate email surfaces as a unique-violation
    /// database error; callers map it to a conflict.
    pub async fn create(db: &PgPool, new: NewUser<'_>) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (fullname, email, phone_number, password_hash, role, profile_photo_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new.fullname)
        .bind(new.email)
        .bind(new.phone_number)
        .bind(new.password_hash)
        .bind(new.role)
        .bind(new.profile_photo_url)
        .fetch_one(db)
        .await
    }

    /// Persist the merged profile in one statement. Role is deliberately not
    /// part of the SET list.
    pub async fn save(&self, db: &PgPool) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET fullname = $2,
                   email = $3,
                   phone_number = $4,
                   password_hash = $5,
                   bio = $6,
                   skills = $7,
                   resume_url = $8,
                   resume_original_name = $9
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(self.id)
        .bind(&self.fullname)
        .bind(&self.email)
        .bind(&self.phone_number)
        .bind(&self.password_hash)
        .bind(&self.bio)
        .bind(&self.skills)
        .bind(&self.resume_url)
        .bind(&self.resume_original_name)
        .fetch_one(db)
        .await
    }
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_known_values() {
        assert_eq!(Role::parse("student"), Some(Role::Student));
        assert_eq!(Role::parse("recruiter"), Some(Role::Recruiter));
        assert_eq!(Role::parse("admin"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn role_display_roundtrip() {
        assert_eq!(Role::parse(&Role::Student.to_string()), Some(Role::Student));
        assert_eq!(
            Role::parse(&Role::Recruiter.to_string()),
            Some(Role::Recruiter)
        );
    }
}
