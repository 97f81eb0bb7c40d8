use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::repo::{Role, User};

/// Request body for login. Fields are optional so missing input is reported
/// through the uniform failure body instead of an extractor rejection.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

/// Request body for Google sign-in.
#[derive(Debug, Deserialize)]
pub struct GoogleAuthRequest {
    pub token: Option<String>,
    pub role: Option<String>,
}

/// Plain success/failure envelope.
#[derive(Debug, Serialize)]
pub struct Message {
    pub success: bool,
    pub message: String,
}

impl Message {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Success envelope carrying the sanitized user.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub message: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub bio: Option<String>,
    pub skills: Vec<String>,
    pub profile_photo: Option<String>,
    pub resume: Option<String>,
    pub resume_original_name: Option<String>,
}

/// Sanitized projection: everything the client may see, never the hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub fullname: String,
    pub email: String,
    pub phone_number: String,
    pub role: Role,
    pub profile: ProfileView,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            fullname: user.fullname,
            email: user.email,
            phone_number: user.phone_number,
            role: user.role,
            profile: ProfileView {
                bio: user.bio,
                skills: user.skills,
                profile_photo: user.profile_photo_url,
                resume: user.resume_url,
                resume_original_name: user.resume_original_name,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            fullname: "Ann".into(),
            email: "a@x.com".into(),
            phone_number: "555".into(),
            password_hash: "$argon2id$v=19$secret".into(),
            role: Role::Student,
            bio: Some("hi".into()),
            skills: vec!["rust".into(), "sql".into()],
            profile_photo_url: None,
            resume_url: None,
            resume_original_name: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn public_user_never_contains_hash() {
        let json = serde_json::to_string(&PublicUser::from(sample_user())).unwrap();
        assert!(!json.contains("argon2"));
        assert!(!json.contains("password"));
        assert!(json.contains("a@x.com"));
        assert!(json.contains(r#""role":"student""#));
    }

    #[test]
    fn public_user_uses_camel_case_fields() {
        let json = serde_json::to_string(&PublicUser::from(sample_user())).unwrap();
        assert!(json.contains(r#""phoneNumber":"555""#));
        assert!(json.contains(r#""profile":"#));
        assert!(json.contains(r#""skills":["rust","sql"]"#));
    }

    #[test]
    fn user_record_serde_skips_hash_too() {
        let json = serde_json::to_string(&sample_user()).unwrap();
        assert!(!json.contains("argon2"));
    }
}
