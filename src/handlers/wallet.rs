use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    Collection,
};
use validator::Validate;

use super::parse_id;
use crate::dtos::{ApiResponse, ListResponse, Pagination};
use crate::errors::Result;
use crate::middleware::auth::AuthUser;
use crate::models::user::Role;
use crate::models::wallet::{
    self, RejectWithdrawal, TransactionQuery, TransactionStatus, TransactionType, WalletResponse,
    WalletTransaction, WalletTransactionResponse, WithdrawRequest,
};
use crate::services::activity_service::{self, NewActivity};
use crate::services::wallet_service::{self, WalletStats};
use crate::state::AppState;

fn transactions(state: &AppState) -> Collection<WalletTransaction> {
    state.db.collection(wallet::TRANSACTIONS)
}

// GET /api/wallet/balance
pub async fn get_balance(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<WalletResponse>>> {
    auth.require_role(&[Role::Teacher])?;
    let summary = wallet_service::summary(&state.db, auth.id()).await?;

    Ok(Json(ApiResponse::success(WalletResponse {
        id: summary.wallet.id.to_hex(),
        balance: summary.wallet.balance,
        total_earned: summary.wallet.total_earned,
        total_withdrawn: summary.wallet.total_withdrawn,
        currency: summary.wallet.currency,
        pending_withdrawals: summary.pending_withdrawals,
        available_for_withdrawal: summary.available_for_withdrawal,
    })))
}

fn transaction_filter(teacher: Option<ObjectId>, query: &TransactionQuery) -> Document {
    let mut filter = Document::new();
    if let Some(teacher) = teacher {
        filter.insert("teacher", teacher);
    }
    if let Some(kind) = query.kind {
        filter.insert("type", kind.as_str());
    }
    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }
    filter
}

async fn transaction_page(
    state: &AppState,
    filter: Document,
    pagination: Pagination,
) -> Result<ListResponse<WalletTransactionResponse>> {
    let collection = transactions(state);
    let items: Vec<WalletTransaction> = collection
        .find(filter.clone())
        .sort(doc! { "createdAt": -1, "_id": -1 })
        .skip(pagination.skip())
        .limit(pagination.limit as i64)
        .await?
        .try_collect()
        .await?;
    let total = collection.count_documents(filter).await?;

    Ok(ListResponse::paged(
        items.into_iter().map(WalletTransactionResponse::from).collect(),
        pagination,
        total,
    ))
}

pub async fn get_transactions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<ListResponse<WalletTransactionResponse>>> {
    auth.require_role(&[Role::Teacher])?;
    let filter = transaction_filter(Some(auth.id()), &query);
    let pagination = Pagination::new(query.page, query.limit);
    Ok(Json(transaction_page(&state, filter, pagination).await?))
}

pub async fn request_withdrawal(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<WithdrawRequest>,
) -> Result<(StatusCode, Json<ApiResponse<WalletTransactionResponse>>)> {
    auth.require_role(&[Role::Teacher])?;
    payload.validate()?;

    let tx = wallet_service::request_withdrawal(&state.db, auth.id(), payload).await?;

    activity_service::record(
        &state.db,
        NewActivity::new("wallet.withdraw_requested")
            .by(auth.id())
            .target("wallet_transaction", tx.id.to_hex())
            .metadata(doc! { "amount": tx.amount })
            .request(&headers),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            WalletTransactionResponse::from(tx),
            "Withdrawal request submitted",
        )),
    ))
}

// Admin

pub async fn get_pending_withdrawals(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<ListResponse<WalletTransactionResponse>>> {
    auth.require_role(&[Role::Admin])?;
    let filter = doc! {
        "type": TransactionType::Withdrawal.as_str(),
        "status": TransactionStatus::Pending.as_str(),
    };
    let pagination = Pagination::new(query.page, query.limit);
    Ok(Json(transaction_page(&state, filter, pagination).await?))
}

pub async fn approve_withdrawal(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<WalletTransactionResponse>>> {
    auth.require_role(&[Role::Admin])?;
    let tx = wallet_service::approve_withdrawal(&state, parse_id(&id)?, auth.id()).await?;

    activity_service::record(
        &state.db,
        NewActivity::new("wallet.withdraw_approved")
            .by(auth.id())
            .target("wallet_transaction", tx.id.to_hex())
            .metadata(doc! { "amount": tx.amount, "teacherId": tx.teacher.to_hex() })
            .request(&headers),
    )
    .await;

    Ok(Json(ApiResponse::with_message(
        WalletTransactionResponse::from(tx),
        "Withdrawal approved",
    )))
}

pub async fn reject_withdrawal(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<RejectWithdrawal>,
) -> Result<Json<ApiResponse<WalletTransactionResponse>>> {
    auth.require_role(&[Role::Admin])?;
    payload.validate()?;

    let tx =
        wallet_service::reject_withdrawal(&state.db, parse_id(&id)?, auth.id(), &payload.reason)
            .await?;

    activity_service::record(
        &state.db,
        NewActivity::new("wallet.withdraw_rejected")
            .by(auth.id())
            .target("wallet_transaction", tx.id.to_hex())
            .metadata(doc! { "reason": payload.reason.trim() })
            .request(&headers),
    )
    .await;

    Ok(Json(ApiResponse::with_message(
        WalletTransactionResponse::from(tx),
        "Withdrawal rejected",
    )))
}

pub async fn get_wallet_stats(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<WalletStats>>> {
    auth.require_role(&[Role::Admin])?;
    Ok(Json(ApiResponse::success(wallet_service::stats(&state.db).await?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teacher_filter_combines_type_and_status() {
        let teacher = ObjectId::new();
        let query = TransactionQuery {
            kind: Some(TransactionType::Withdrawal),
            status: Some(TransactionStatus::Pending),
            ..Default::default()
        };
        let filter = transaction_filter(Some(teacher), &query);
        assert_eq!(filter.get_object_id("teacher").unwrap(), teacher);
        assert_eq!(filter.get_str("type").unwrap(), "WITHDRAWAL");
        assert_eq!(filter.get_str("status").unwrap(), "PENDING");
    }

    #[test]
    fn empty_query_filters_nothing_but_owner() {
        let filter = transaction_filter(None, &TransactionQuery::default());
        assert!(filter.is_empty());
    }
}
