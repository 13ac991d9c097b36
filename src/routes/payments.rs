use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::payments;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/init", post(payments::init_payment))
        .route("/status/:gig_id", get(payments::get_gig_payment_status))
        .route(
            "/booking-status/batch",
            post(payments::batch_booking_payment_status),
        )
        .route(
            "/booking-status/:booking_id",
            get(payments::get_booking_payment_status),
        )

        // Gateway callbacks (unauthenticated)
        .route("/success/:tran_id", post(payments::payment_success))
        .route("/fail/:tran_id", post(payments::payment_fail))
        .route("/cancel/:tran_id", post(payments::payment_cancel))
        .route("/ipn", post(payments::payment_ipn))
}
