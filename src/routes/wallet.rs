use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers::wallet;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        // Teacher
        .route("/balance", get(wallet::get_balance))
        .route("/transactions", get(wallet::get_transactions))
        .route("/withdraw", post(wallet::request_withdrawal))

        // Admin
        .route("/admin/withdrawals/pending", get(wallet::get_pending_withdrawals))
        .route("/admin/withdrawals/:id/approve", put(wallet::approve_withdrawal))
        .route("/admin/withdrawals/:id/reject", put(wallet::reject_withdrawal))
        .route("/admin/stats", get(wallet::get_wallet_stats))
}
