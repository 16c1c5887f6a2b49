//! Authentication route handlers.
//!
//! Handles login, registration and logout with email and password. A
//! successful sign-in moves the visitor's guest cart into their account
//! and deletes the guest cart cookie.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    http::{HeaderMap, header},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use crate::db::CartRepository;
use crate::error::{clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::{OptionalAuth, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::services::auth::{AuthError, AuthService};
use crate::services::guest_cookie;
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

/// Query parameters for error display.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub error: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub user: Option<CurrentUser>,
    pub error: Option<&'static str>,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub user: Option<CurrentUser>,
    pub error: Option<&'static str>,
}

/// Message shown for an `?error=` code.
fn error_message(code: Option<&str>) -> Option<&'static str> {
    Some(match code? {
        "credentials" => "Incorrect email or password.",
        "session" => "Could not start your session. Please try again.",
        "password_mismatch" => "Passwords do not match.",
        "password_too_short" => "Password must be at least 8 characters.",
        "email_taken" => "An account with this email already exists.",
        "invalid_email" => "Please enter a valid email address.",
        _ => "Something went wrong. Please try again.",
    })
}

// =============================================================================
// Sign-in
// =============================================================================

/// Store the user in the session and fold the guest cart into theirs.
///
/// Returns the response for a successful sign-in: a redirect home that
/// also deletes the guest cart cookie once its lines are safely stored.
async fn sign_in(state: &AppState, session: &Session, headers: &HeaderMap, user: &User) -> Response {
    let current = CurrentUser::from(user);
    if let Err(e) = set_current_user(session, &current).await {
        tracing::error!("Failed to set session: {}", e);
        return Redirect::to("/auth/login?error=session").into_response();
    }
    set_sentry_user(&user.id, Some(user.email.as_str()));

    let guest = guest_cookie::read(headers);
    if guest.is_empty() {
        return Redirect::to("/").into_response();
    }

    match CartRepository::new(state.pool())
        .merge_guest(&user.email, guest)
        .await
    {
        Ok(merged) => {
            tracing::info!(user_id = %user.id, merged, "Guest cart merged");
            state.cart_events().publish(&user.email);
            (
                AppendHeaders([(header::SET_COOKIE, guest_cookie::clear())]),
                Redirect::to("/"),
            )
                .into_response()
        }
        Err(e) => {
            // Keep the cookie so the lines are not lost.
            tracing::warn!(user_id = %user.id, error = %e, "Failed to merge guest cart");
            Redirect::to("/").into_response()
        }
    }
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<MessageQuery>,
) -> impl IntoResponse {
    LoginTemplate {
        user,
        error: error_message(query.error.as_deref()),
    }
}

/// Handle login form submission.
#[instrument(skip(state, session, headers, form), fields(email = %form.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let auth = AuthService::new(state.pool());
    match auth.login_with_password(&form.email, &form.password).await {
        Ok(user) => sign_in(&state, &session, &headers, &user).await,
        Err(AuthError::InvalidEmail(_)) => {
            Redirect::to("/auth/login?error=invalid_email").into_response()
        }
        Err(e) => {
            tracing::warn!("Login failed: {}", e);
            Redirect::to("/auth/login?error=credentials").into_response()
        }
    }
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page.
pub async fn register_page(
    OptionalAuth(user): OptionalAuth,
    Query(query): Query<MessageQuery>,
) -> impl IntoResponse {
    RegisterTemplate {
        user,
        error: error_message(query.error.as_deref()),
    }
}

/// Handle registration form submission.
///
/// New accounts are signed in straight away.
#[instrument(skip(state, session, headers, form), fields(email = %form.email))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    headers: HeaderMap,
    Form(form): Form<RegisterForm>,
) -> Response {
    if form.password != form.password_confirm {
        return Redirect::to("/auth/register?error=password_mismatch").into_response();
    }

    let auth = AuthService::new(state.pool());
    match auth.register_with_password(&form.email, &form.password).await {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "Account created");
            sign_in(&state, &session, &headers, &user).await
        }
        Err(e) => {
            tracing::warn!("Registration failed: {}", e);
            let code = match e {
                AuthError::UserAlreadyExists => "email_taken",
                AuthError::WeakPassword(_) => "password_too_short",
                AuthError::InvalidEmail(_) => "invalid_email",
                _ => "failed",
            };
            Redirect::to(&format!("/auth/register?error={code}")).into_response()
        }
    }
}

// =============================================================================
// Logout Route
// =============================================================================

/// Handle logout.
pub async fn logout(session: Session) -> Response {
    if let Err(e) = clear_current_user(&session).await {
        tracing::error!("Failed to clear session: {}", e);
    }

    if let Err(e) = session.flush().await {
        tracing::error!("Failed to flush session: {}", e);
    }
    clear_sentry_user();

    Redirect::to("/").into_response()
}
