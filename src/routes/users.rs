use axum::{
    routing::{get, put},
    Router,
};

use crate::handlers::users;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me", put(users::update_me))
        .route("/:id", get(users::get_user))
        .route("/:id/gigs", get(users::get_user_gigs))
}
