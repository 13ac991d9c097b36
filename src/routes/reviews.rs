use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::reviews;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(reviews::get_reviews))
        .route("/batch-status", post(reviews::batch_review_status))
        .route(
            "/:id",
            get(reviews::get_review)
                .put(reviews::update_review)
                .delete(reviews::delete_review),
        )
        .route("/:id/reply", put(reviews::reply_review))
}
