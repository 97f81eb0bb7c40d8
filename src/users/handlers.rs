use axum::{
    extract::{DefaultBodyLimit, FromRef, Multipart, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use bytes::Bytes;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    error::ApiError,
    state::AppState,
    storage::ext_from_mime,
    users::{
        dto::{GoogleAuthRequest, LoginRequest, Message, PublicUser, UserResponse},
        repo::{is_unique_violation, NewUser, Role, User},
        services::{
            clear_session_cookie, generate_random_password, hash_password, is_valid_email,
            parse_skills, session_cookie, verify_password, AuthUser, JwtKeys,
        },
    },
};

const MISSING_INPUT: &str = "Something is missing";
const BAD_CREDENTIALS: &str = "Incorrect email or password.";

/// Unknown email and wrong password intentionally share one failure so the
/// response does not reveal which check tripped.
fn bad_credentials() -> ApiError {
    ApiError::auth(BAD_CREDENTIALS)
}

fn map_unique_violation(e: sqlx::Error, message: &'static str) -> ApiError {
    if is_unique_violation(&e) {
        ApiError::conflict(message)
    } else {
        ApiError::Internal(e.into())
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/google", post(google_auth))
        .route("/logout", get(logout).post(logout))
        .route("/profile/update", put(update_profile))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
}

#[derive(Debug)]
struct UploadedFile {
    bytes: Bytes,
    content_type: String,
    filename: Option<String>,
}

/// Collected multipart form: text fields by name plus at most one `file` part.
#[derive(Debug, Default)]
struct FormData {
    fields: std::collections::HashMap<String, String>,
    file: Option<UploadedFile>,
}

impl FormData {
    fn non_empty(&self, name: &str) -> Option<String> {
        self.fields
            .get(name)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

async fn read_form(mut mp: Multipart) -> Result<FormData, ApiError> {
    let mut form = FormData::default();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|_| ApiError::validation("Malformed form data"))?
    {
        let Some(name) = field.name().map(|s| s.to_string()) else {
            continue;
        };
        if name == "file" {
            let filename = field.file_name().map(|s| s.to_string());
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            // A file we cannot read is an upload failure, not bad input.
            let bytes = field
                .bytes()
                .await
                .map_err(|_| ApiError::Upload("Could not read uploaded file".into()))?;
            form.file = Some(UploadedFile {
                bytes,
                content_type,
                filename,
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|_| ApiError::validation("Malformed form data"))?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}

/// Merge only the supplied, non-empty form fields into the record; anything
/// absent or blank keeps its stored value. A non-blank password is re-hashed.
fn apply_profile_updates(user: &mut User, form: &FormData) -> Result<(), ApiError> {
    if let Some(fullname) = form.non_empty("fullname") {
        user.fullname = fullname;
    }
    if let Some(email) = form.non_empty("email") {
        if !is_valid_email(&email) {
            return Err(ApiError::validation("Invalid email."));
        }
        user.email = email;
    }
    if let Some(phone_number) = form.non_empty("phoneNumber") {
        user.phone_number = phone_number;
    }
    if let Some(bio) = form.non_empty("bio") {
        user.bio = Some(bio);
    }
    if let Some(skills) = form.non_empty("skills") {
        user.skills = parse_skills(&skills);
    }
    if let Some(password) = form.non_empty("password") {
        user.password_hash = hash_password(&password)?;
    }
    Ok(())
}

#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    mp: Multipart,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let form = read_form(mp).await?;

    let (Some(fullname), Some(email), Some(phone_number), Some(password), Some(role)) = (
        form.non_empty("fullname"),
        form.non_empty("email"),
        form.non_empty("phoneNumber"),
        form.non_empty("password"),
        form.non_empty("role"),
    ) else {
        warn!("registration with missing fields");
        return Err(ApiError::validation(MISSING_INPUT));
    };

    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::validation("Invalid email."));
    }
    let role = Role::parse(&role).ok_or_else(|| ApiError::validation("Invalid role."))?;

    if let Some(_existing) = User::find_by_email(&state.db, &email).await? {
        warn!(email = %email, "email already registered");
        return Err(ApiError::conflict("User already exist with this email."));
    }

    let photo_url = match form.file {
        Some(file) => {
            let key = format!(
                "profiles/{}.{}",
                Uuid::new_v4(),
                ext_from_mime(&file.content_type)
            );
            let url = state
                .storage
                .upload(&key, file.bytes, &file.content_type)
                .await
                .map_err(|e| {
                    error!(error = %e, "profile photo upload failed");
                    ApiError::Upload("Photo upload failed".into())
                })?;
            Some(url)
        }
        None => None,
    };

    let password_hash = hash_password(&password)?;
    let user = User::create(
        &state.db,
        NewUser {
            fullname: &fullname,
            email: &email,
            phone_number: &phone_number,
            password_hash: &password_hash,
            role,
            profile_photo_url: photo_url.as_deref(),
        },
    )
    .await
    // Loser of a concurrent registration race lands here.
    .map_err(|e| map_unique_violation(e, "User already exist with this email."))?;

    info!(user_id = %user.id, email = %user.email, role = %user.role, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(Message::ok("Account created successfully.")),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<(HeaderMap, Json<UserResponse>), ApiError> {
    let (Some(email), Some(password), Some(role)) = (
        payload.email.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        payload.password.as_deref().filter(|s| !s.is_empty()),
        payload.role.as_deref().filter(|s| !s.is_empty()),
    ) else {
        return Err(ApiError::validation(MISSING_INPUT));
    };
    let role = Role::parse(role).ok_or_else(|| ApiError::validation("Invalid role."))?;

    let user = match User::find_by_email(&state.db, email).await? {
        Some(u) => u,
        None => {
            warn!(email = %email, "login unknown email");
            return Err(bad_credentials());
        }
    };

    if !verify_password(password, &user.password_hash)? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(bad_credentials());
    }

    if role != user.role {
        warn!(email = %email, user_id = %user.id, "login role mismatch");
        return Err(ApiError::auth("Account doesn't exist with current role."));
    }

    info!(user_id = %user.id, email = %user.email, "user logged in");
    issue_session(&state, user, |name| format!("Welcome back {name}"))
}

#[instrument(skip(state, payload))]
pub async fn google_auth(
    State(state): State<AppState>,
    Json(payload): Json<GoogleAuthRequest>,
) -> Result<(HeaderMap, Json<UserResponse>), ApiError> {
    let Some(id_token) = payload.token.as_deref().filter(|s| !s.is_empty()) else {
        return Err(ApiError::validation(MISSING_INPUT));
    };
    let role = requested_role(payload.role.as_deref())?;

    let claims = state.identity.verify(id_token).await.map_err(|e| {
        warn!(error = %e, "identity token verification failed");
        ApiError::auth("Google login failed.")
    })?;

    let (Some(email), Some(name)) = (claims.email, claims.name) else {
        return Err(ApiError::auth("Incomplete Google profile."));
    };

    let existing = User::find_by_email(&state.db, &email).await?;
    let user = match oauth_outcome(existing, role)? {
        OauthOutcome::LogIn(user) => user,
        OauthOutcome::Provision => {
            let password_hash = hash_password(&generate_random_password())?;
            let created = User::create(
                &state.db,
                NewUser {
                    fullname: &name,
                    email: &email,
                    phone_number: "",
                    password_hash: &password_hash,
                    role,
                    profile_photo_url: claims.picture.as_deref(),
                },
            )
            .await;
            match created {
                Ok(user) => {
                    info!(user_id = %user.id, email = %user.email, "user provisioned via oauth");
                    user
                }
                // Lost a provisioning race: the row exists now, so re-fetch
                // and apply the same role check as the existing-account path.
                Err(e) if is_unique_violation(&e) => {
                    let existing = User::find_by_email(&state.db, &email).await?;
                    match oauth_outcome(existing, role)? {
                        OauthOutcome::LogIn(user) => user,
                        OauthOutcome::Provision => {
                            return Err(ApiError::Internal(anyhow::anyhow!(
                                "duplicate insert but no row for {email}"
                            )))
                        }
                    }
                }
                Err(e) => return Err(ApiError::Internal(e.into())),
            }
        }
    };

    info!(user_id = %user.id, email = %user.email, "oauth login");
    issue_session(&state, user, |name| format!("Welcome {name}"))
}

/// Role requested alongside an OAuth sign-in; absent means `student`.
fn requested_role(raw: Option<&str>) -> Result<Role, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(r) => Role::parse(r).ok_or_else(|| ApiError::validation("Invalid role.")),
        None => Ok(Role::Student),
    }
}

#[derive(Debug)]
enum OauthOutcome {
    LogIn(User),
    Provision,
}

/// Decide what an OAuth sign-in does with the stored account, if any. A role
/// conflict never logs in and never mutates the record.
fn oauth_outcome(existing: Option<User>, role: Role) -> Result<OauthOutcome, ApiError> {
    match existing {
        Some(user) if user.role != role => {
            warn!(email = %user.email, stored_role = %user.role, "oauth role conflict");
            Err(ApiError::conflict("User already exists but with other role."))
        }
        Some(user) => Ok(OauthOutcome::LogIn(user)),
        None => Ok(OauthOutcome::Provision),
    }
}

#[instrument]
pub async fn logout() -> (HeaderMap, Json<Message>) {
    let mut headers = HeaderMap::new();
    if let Ok(value) = clear_session_cookie().parse() {
        headers.insert(header::SET_COOKIE, value);
    }
    (headers, Json(Message::ok("Logged out successfully.")))
}

#[instrument(skip(state, mp))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mp: Multipart,
) -> Result<Json<UserResponse>, ApiError> {
    let form = read_form(mp).await?;

    let mut user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    apply_profile_updates(&mut user, &form)?;

    if let Some(file) = form.file {
        let key = format!(
            "resumes/{}/{}.{}",
            user.id,
            Uuid::new_v4(),
            ext_from_mime(&file.content_type)
        );
        let url = state
            .storage
            .upload(&key, file.bytes, &file.content_type)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %user.id, "resume upload failed");
                ApiError::Upload("Resume upload failed".into())
            })?;
        user.resume_url = Some(url);
        user.resume_original_name = file.filename;
    }

    let user = user
        .save(&state.db)
        .await
        .map_err(|e| map_unique_violation(e, "User already exist with this email."))?;

    info!(user_id = %user.id, "profile updated");
    Ok(Json(UserResponse {
        success: true,
        message: "Profile updated successfully".into(),
        user: PublicUser::from(user),
    }))
}

fn issue_session(
    state: &AppState,
    user: User,
    message: impl Fn(&str) -> String,
) -> Result<(HeaderMap, Json<UserResponse>), ApiError> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign(user.id)?;
    let cookie = session_cookie(&token, keys.ttl, state.config.production);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        cookie
            .parse()
            .map_err(|_| ApiError::Internal(anyhow::anyhow!("invalid cookie header")))?,
    );

    let message = message(&user.fullname);
    Ok((
        headers,
        Json(UserResponse {
            success: true,
            message,
            user: PublicUser::from(user),
        }),
    ))
}
