//! Identity introspection.

use axum::{Json, extract::State};
use serde::Serialize;

use crate::middleware::Authenticated;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub email: String,
    pub whitelisted: bool,
}

/// Report who the bearer token belongs to and whether they may use the API.
///
/// Only requires a valid token, so a rejected user can see why.
pub async fn whoami(
    State(state): State<AppState>,
    Authenticated(identity): Authenticated,
) -> Json<WhoAmI> {
    Json(WhoAmI {
        whitelisted: state.policy().permits(&identity.email),
        email: identity.email.into(),
    })
}
