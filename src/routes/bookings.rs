use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{bookings, manual_payments};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(bookings::get_bookings).post(bookings::create_booking))
        .route("/room/:room_id", get(bookings::get_booking_by_room))
        .route(
            "/:id",
            get(bookings::get_booking).put(bookings::update_booking_status),
        )
        .route("/:id/join", get(bookings::join_booking))
        .route("/:id/attendance", post(bookings::mark_attendance))

        // Manual payment flow
        .route(
            "/:id/manual-payment-info",
            get(manual_payments::get_manual_payment_info),
        )
        .route("/:id/payment/submit", post(manual_payments::submit_payment_proof))
        .route("/:id/payment/verify", post(manual_payments::verify_payment))
        .route("/:id/payment/reject", post(manual_payments::reject_payment))
        .route("/:id/payment/status", get(manual_payments::get_payment_status))
}
