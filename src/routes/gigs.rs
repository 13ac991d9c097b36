use axum::{routing::get, Router};

use crate::handlers::{gigs, reviews};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(gigs::get_gigs).post(gigs::create_gig))
        .route(
            "/:id",
            get(gigs::get_gig)
                .put(gigs::update_gig)
                .delete(gigs::delete_gig),
        )
        // Reviews scoped to a gig
        .route(
            "/:id/reviews",
            get(reviews::get_gig_reviews).post(reviews::create_review),
        )
        .route("/:id/reviews/me", get(reviews::get_my_gig_review))
}
