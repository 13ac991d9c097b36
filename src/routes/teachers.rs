use axum::{routing::get, Router};

use crate::handlers::manual_payments;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/me/payment-info",
        get(manual_payments::get_my_payment_info).put(manual_payments::upsert_my_payment_info),
    )
}
