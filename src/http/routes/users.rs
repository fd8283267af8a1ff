use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use serde::{Deserialize, Serialize};

use crate::application::auth_service::AuthService;
use crate::domain::user::{RegisterUser, UpdateProfile, User};
use crate::http::auth::{require_token, Principal};
use crate::http::types::ApiError;

#[derive(Clone)]
pub struct AppState<A: AuthService> {
    pub auth: A,
}

pub fn router<A: AuthService + Clone>(state: AppState<A>) -> Router {
    let protected = Router::new()
        .route("/users/me", get(me::<A>).patch(update_me::<A>))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_token::<A>,
        ));
    Router::new()
        .route("/users", post(register::<A>))
        .route("/users/token", post(issue_token::<A>))
        .merge(protected)
        .with_state(state)
}

#[derive(Serialize)]
struct UserBody {
    id: i64,
    email: String,
    first_name: String,
    last_name: String,
}

impl UserBody {
    fn from_user(user: &User) -> Self {
        Self {
            id: user.id.0,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

async fn register<A: AuthService>(
    State(state): State<AppState<A>>,
    Json(payload): Json<RegisterUser>,
) -> Result<(StatusCode, Json<UserBody>), ApiError> {
    let user = state.auth.register(payload).await?;
    Ok((StatusCode::CREATED, Json(UserBody::from_user(&user))))
}

#[derive(Deserialize)]
struct TokenRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct TokenBody {
    token: String,
}

async fn issue_token<A: AuthService>(
    State(state): State<AppState<A>>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<TokenBody>, ApiError> {
    let token = state.auth.issue_token(&payload.email, &payload.password).await?;
    Ok(Json(TokenBody { token: token.key }))
}

async fn me<A: AuthService>(
    State(state): State<AppState<A>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<UserBody>, ApiError> {
    let user = state.auth.get_user(principal.0).await?;
    Ok(Json(UserBody::from_user(&user)))
}

async fn update_me<A: AuthService>(
    State(state): State<AppState<A>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<UpdateProfile>,
) -> Result<Json<UserBody>, ApiError> {
    let user = state.auth.update_profile(principal.0, payload).await?;
    Ok(Json(UserBody::from_user(&user)))
}
