use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::auth;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        // Onboarding: student or teacher only
        .route("/update-role", put(auth::update_role))
}
