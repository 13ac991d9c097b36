use axum::{
    routing::{get, put},
    Router,
};

use crate::handlers::admin;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(admin::list_users))
        .route("/users/:id", get(admin::get_user))
        .route("/users/:id/role", put(admin::update_user_role))
        .route("/users/:id/activities", get(admin::get_user_activities))
        .route("/activities", get(admin::list_activities))
        .route("/analytics/classes", get(admin::get_class_analytics))
}
