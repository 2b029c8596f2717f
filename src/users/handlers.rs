use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    pagination::{Page, PaginationError},
    state::AppState,
    users::{
        dto::{
            ActivateRequest, ActivateResponse, EmailRequest, PasswordResetConfirmRequest,
            RegionChoice, RegisterRequest, UserDetails,
        },
        extractors::AdminKey,
        password::{hash_password, is_valid_email, normalize_email, MIN_PASSWORD_LEN},
        profiles::UserTypeChoice,
        repo_types::{NewUser, Region, User},
        services,
        tokens::TokenError,
    },
};

type ApiError = (StatusCode, String);

fn internal<E: std::fmt::Display>(e: E) -> ApiError {
    error!(error = %e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn token_rejection(e: TokenError, expired_msg: &str, invalid_msg: &str) -> ApiError {
    match e {
        TokenError::Expired => (StatusCode::BAD_REQUEST, expired_msg.into()),
        TokenError::Invalid => (StatusCode::BAD_REQUEST, invalid_msg.into()),
        TokenError::Store(e) => internal(e),
    }
}

fn check_password(password: &str) -> Result<(), ApiError> {
    if password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }
    Ok(())
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/activate", post(activate))
        .route("/auth/activation/resend", post(resend_activation))
        .route("/auth/password-reset", post(request_password_reset))
        .route("/auth/password-reset/confirm", post(confirm_password_reset))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/types", get(user_types))
        .route("/users/regions", get(regions))
        .route("/users/:id", get(get_user))
        .route("/users/:id/profiles/:user_type", post(promote_user))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }
    check_password(&payload.password)?;

    if state.users.find_by_email(&email).await.map_err(internal)?.is_some() {
        warn!(email = %email, "email already registered");
        return Err((StatusCode::CONFLICT, "Email already registered".into()));
    }

    let user = state
        .users
        .create(NewUser {
            email,
            first_name: payload.first_name.trim().to_string(),
            last_name: payload.last_name.trim().to_string(),
            password_hash: hash_password(&payload.password).map_err(internal)?,
            region: payload.region,
        })
        .await
        .map_err(internal)?;

    state
        .emails
        .send_activation_email(&user, true, false)
        .await
        .map_err(internal)?;

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, payload))]
pub async fn activate(
    State(state): State<AppState>,
    Json(payload): Json<ActivateRequest>,
) -> Result<Json<ActivateResponse>, ApiError> {
    let mut user = state
        .tokens
        .get_user_from_activation_token(state.users.as_ref(), &payload.token, None)
        .await
        .map_err(|e| {
            token_rejection(e, "Activation link has expired", "Invalid activation link")
        })?;

    if user.was_activated() {
        info!(user_id = user.id, "user already activated");
        return Ok(Json(ActivateResponse {
            user,
            already_activated: true,
        }));
    }

    services::activate(state.users.as_ref(), &mut user)
        .await
        .map_err(internal)?;
    Ok(Json(ActivateResponse {
        user,
        already_activated: false,
    }))
}

/// Always accepted so that callers cannot probe which addresses exist.
#[instrument(skip(state, payload))]
pub async fn resend_activation(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<StatusCode, ApiError> {
    let email = normalize_email(&payload.email);
    match state.users.find_by_email(&email).await.map_err(internal)? {
        Some(user) if !user.was_activated() => {
            state
                .emails
                .send_activation_email(&user, false, true)
                .await
                .map_err(internal)?;
        }
        Some(user) => info!(user_id = user.id, "resend skipped, already activated"),
        None => info!(email = %email, "resend for unknown email"),
    }
    Ok(StatusCode::ACCEPTED)
}

#[instrument(skip(state, payload))]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> Result<StatusCode, ApiError> {
    let email = normalize_email(&payload.email);
    match state.users.find_by_email(&email).await.map_err(internal)? {
        Some(user) => state
            .emails
            .send_password_reset_email(&user)
            .await
            .map_err(internal)?,
        None => info!(email = %email, "password reset for unknown email"),
    }
    Ok(StatusCode::ACCEPTED)
}

#[instrument(skip(state, payload))]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetConfirmRequest>,
) -> Result<StatusCode, ApiError> {
    check_password(&payload.password)?;
    let mut user = state
        .tokens
        .get_user_from_password_reset_token(state.users.as_ref(), &payload.token)
        .await
        .map_err(|e| token_rejection(e, "Reset link has expired", "Invalid reset link"))?;

    services::set_password(state.users.as_ref(), &mut user, &payload.password)
        .await
        .map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    _admin: AdminKey,
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Page<User>>, ApiError> {
    let user_type = match params.iter().find(|(k, _)| k == "userType") {
        Some((_, tag)) => Some(
            state
                .profiles
                .resolve(tag)
                .ok_or((StatusCode::BAD_REQUEST, format!("Unknown user type {tag}")))?,
        ),
        None => None,
    };

    let count = state.users.count(user_type).await.map_err(internal)?;
    let window = state
        .pagination
        .paginate(&params, count)
        .map_err(|e: PaginationError| (StatusCode::NOT_FOUND, e.to_string()))?;
    let users = state
        .users
        .list(user_type, window.limit(), window.offset())
        .await
        .map_err(internal)?;

    let base = state.config.absolute_url("/api/v1/users");
    Ok(Json(window.into_page(&base, &params, users)))
}

#[instrument(skip(state, _admin))]
pub async fn get_user(
    _admin: AdminKey,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserDetails>, ApiError> {
    let user = state
        .users
        .find_by_id(id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;
    let user_types = state.users.user_types_of(id).await.map_err(internal)?;
    Ok(Json(UserDetails { user, user_types }))
}

pub async fn user_types(State(state): State<AppState>) -> Json<Vec<UserTypeChoice>> {
    Json(state.profiles.choices())
}

pub async fn regions() -> Json<Vec<RegionChoice>> {
    Json(Region::ALL.into_iter().map(RegionChoice::from).collect())
}

#[instrument(skip(state, _admin))]
pub async fn promote_user(
    _admin: AdminKey,
    State(state): State<AppState>,
    Path((id, tag)): Path<(i64, String)>,
) -> Result<(StatusCode, Json<UserDetails>), ApiError> {
    let user_type = state
        .profiles
        .resolve(&tag)
        .ok_or((StatusCode::NOT_FOUND, format!("Unknown user type {tag}")))?;
    let user = state
        .users
        .find_by_id(id)
        .await
        .map_err(internal)?
        .ok_or((StatusCode::NOT_FOUND, "User not found".to_string()))?;

    let created = services::promote(state.users.as_ref(), &user, user_type)
        .await
        .map_err(internal)?;
    let user_types = state.users.user_types_of(id).await.map_err(internal)?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(UserDetails { user, user_types })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::{profiles::UserType, repo::UserStore};

    fn register_body(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: "long-enough-password".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            region: Some(Region::Europe),
        }
    }

    /// Pulls the token out of the most recent email's link.
    fn token_from_last_email(html: &str, marker: &str, end: char) -> String {
        let start = html.find(marker).expect("link in email") + marker.len();
        html[start..].chars().take_while(|c| *c != end).collect()
    }

    #[tokio::test]
    async fn register_creates_inactive_user_and_sends_activation() {
        let (state, _, mailer) = AppState::fake();
        let (status, Json(user)) = register(State(state), Json(register_body(" A@Example.com ")))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user.email, "a@example.com");
        assert!(!user.is_active);
        assert!(!user.was_activated());

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Activate your account");
        assert_eq!(sent[0].to, vec!["a@example.com".to_string()]);
    }

    #[tokio::test]
    async fn register_rejects_bad_input_and_duplicates() {
        let (state, _, _) = AppState::fake();
        let err = register(State(state.clone()), Json(register_body("nope")))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let mut short = register_body("a@example.com");
        short.password = "short".into();
        let err = register(State(state.clone()), Json(short)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        register(State(state.clone()), Json(register_body("a@example.com")))
            .await
            .unwrap();
        let err = register(State(state), Json(register_body("A@EXAMPLE.COM")))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn activation_link_activates_once() {
        let (state, users, mailer) = AppState::fake();
        register(State(state.clone()), Json(register_body("a@example.com")))
            .await
            .unwrap();
        let html = mailer.sent()[0].html.clone().unwrap();
        let token = token_from_last_email(&html, "/app/activate/", '/');

        let Json(first) = activate(
            State(state.clone()),
            Json(ActivateRequest { token: token.clone() }),
        )
        .await
        .unwrap();
        assert!(!first.already_activated);
        assert!(first.user.is_active);
        let stamped = first.user.activated_at;
        assert!(stamped.is_some());

        let Json(second) = activate(State(state), Json(ActivateRequest { token }))
            .await
            .unwrap();
        assert!(second.already_activated);
        assert_eq!(second.user.activated_at, stamped);
        assert_eq!(
            users.find_by_id(first.user.id).await.unwrap().unwrap().activated_at,
            stamped
        );
    }

    #[tokio::test]
    async fn activation_rejects_garbage_token() {
        let (state, _, _) = AppState::fake();
        let err = activate(
            State(state),
            Json(ActivateRequest {
                token: "not-a-token".into(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err, (StatusCode::BAD_REQUEST, "Invalid activation link".to_string()));
    }

    #[tokio::test]
    async fn resend_only_mails_inactive_known_users() {
        let (state, _, mailer) = AppState::fake();
        register(State(state.clone()), Json(register_body("a@example.com")))
            .await
            .unwrap();

        let status = resend_activation(
            State(state.clone()),
            Json(EmailRequest {
                email: "a@example.com".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(mailer.sent().len(), 2);

        let status = resend_activation(
            State(state),
            Json(EmailRequest {
                email: "ghost@example.com".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(mailer.sent().len(), 2);
    }

    #[tokio::test]
    async fn password_reset_flow_invalidates_used_token() {
        let (state, users, mailer) = AppState::fake();
        register(State(state.clone()), Json(register_body("a@example.com")))
            .await
            .unwrap();
        request_password_reset(
            State(state.clone()),
            Json(EmailRequest {
                email: "a@example.com".into(),
            }),
        )
        .await
        .unwrap();

        let sent = mailer.sent();
        let reset_email = sent.last().unwrap();
        assert_eq!(reset_email.subject, "Reset your password");
        // handlebars escapes `=` inside the href
        let html = reset_email.html.clone().unwrap().replace("&#x3D;", "=");
        let token = token_from_last_email(&html, "/app/reset_password/?token=", '"');
        assert!(!token.is_empty());
        let before = users.find_by_email("a@example.com").await.unwrap().unwrap();

        let confirm = |token: String| PasswordResetConfirmRequest {
            token,
            password: "another-long-password".into(),
        };
        let status = confirm_password_reset(State(state.clone()), Json(confirm(token.clone())))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        let after = users.find_by_email("a@example.com").await.unwrap().unwrap();
        assert_ne!(after.password_hash, before.password_hash);

        let err = confirm_password_reset(State(state), Json(confirm(token)))
            .await
            .unwrap_err();
        assert_eq!(err, (StatusCode::BAD_REQUEST, "Invalid reset link".to_string()));
    }

    #[tokio::test]
    async fn list_users_paginates_and_filters() {
        let (state, users, _) = AppState::fake();
        for i in 0..5 {
            register(
                State(state.clone()),
                Json(register_body(&format!("user{i}@example.com"))),
            )
            .await
            .unwrap();
        }
        users.add_profile(2, UserType::Admin).await.unwrap();

        let params = vec![("pageSize".to_string(), "2".to_string())];
        let Json(page) = list_users(AdminKey, State(state.clone()), Query(params)).await.unwrap();
        assert_eq!(page.count, 5);
        assert_eq!(page.results.len(), 2);
        assert_eq!(
            page.next.as_deref(),
            Some("http://testserver/api/v1/users?pageSize=2&page=2")
        );
        assert!(page.previous.is_none());

        let params = vec![("userType".to_string(), "admin".to_string())];
        let Json(admins) = list_users(AdminKey, State(state.clone()), Query(params)).await.unwrap();
        assert_eq!(admins.count, 1);
        assert_eq!(admins.results[0].id, 2);

        let params = vec![("page".to_string(), "9".to_string())];
        let err = list_users(AdminKey, State(state.clone()), Query(params)).await.unwrap_err();
        assert_eq!(err, (StatusCode::NOT_FOUND, "Invalid page.".to_string()));

        let params = vec![("userType".to_string(), "staff".to_string())];
        let err = list_users(AdminKey, State(state), Query(params)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn promote_and_describe_user() {
        let (state, _, _) = AppState::fake();
        let (_, Json(user)) = register(State(state.clone()), Json(register_body("a@example.com")))
            .await
            .unwrap();

        let (status, Json(details)) = promote_user(
            AdminKey,
            State(state.clone()),
            Path((user.id, "customer".to_string())),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(details.user_types, vec![UserType::Customer]);

        let (status, _) = promote_user(
            AdminKey,
            State(state.clone()),
            Path((user.id, "customer".to_string())),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);

        let err = promote_user(AdminKey, State(state.clone()), Path((user.id, "staff".to_string())))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);

        let Json(details) = get_user(AdminKey, State(state.clone()), Path(user.id)).await.unwrap();
        assert_eq!(details.user.email, "a@example.com");
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["user_types"], serde_json::json!(["customer"]));
        assert!(json.get("password_hash").is_none());

        let err = get_user(AdminKey, State(state), Path(999)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn choice_endpoints() {
        let (state, _, _) = AppState::fake();
        let Json(types) = user_types(State(state)).await;
        let pairs: Vec<_> = types.iter().map(|c| (c.value, c.label.as_str())).collect();
        assert_eq!(pairs, vec![("admin", "Admin"), ("customer", "Customer")]);

        let Json(regions) = regions().await;
        assert_eq!(regions.len(), 7);
        assert_eq!((regions[0].value, regions[0].label), (1, "Oceania"));
        assert_eq!((regions[6].value, regions[6].label), (7, "Atlantis"));
    }
}
