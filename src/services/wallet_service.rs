// services/wallet_service.rs
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    options::{IndexOptions, ReturnDocument},
    ClientSession, Collection, Database, IndexModel,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::{AppError, Result};
use crate::models::payment::Payment;
use crate::models::user;
use crate::models::wallet::{
    TransactionStatus, TransactionType, Wallet, WalletTransaction, WithdrawRequest, TRANSACTIONS,
    WALLETS,
};
use crate::state::AppState;

pub const CURRENCY: &str = "BDT";

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Gross amount split into platform commission and teacher share.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommissionSplit {
    pub gross: f64,
    pub commission: f64,
    pub net: f64,
}

impl CommissionSplit {
    pub fn compute(gross: f64, rate: f64) -> Self {
        let commission = round2(gross * rate);
        CommissionSplit {
            gross,
            commission,
            net: round2(gross - commission),
        }
    }
}

/// Balance after debiting `amount`, or `None` when funds are short.
pub fn debit(balance: f64, amount: f64) -> Option<f64> {
    if amount > 0.0 && balance >= amount {
        Some(round2(balance - amount))
    } else {
        None
    }
}

/// Guarded debit: matches the wallet only while it still covers `amount`.
fn debit_filter(wallet: ObjectId, amount: f64) -> Document {
    doc! { "_id": wallet, "balance": { "$gte": amount } }
}

fn pending_withdrawal_match() -> Document {
    doc! {
        "type": TransactionType::Withdrawal.as_str(),
        "status": TransactionStatus::Pending.as_str(),
    }
}

/// At most one PENDING withdrawal per teacher, enforced by the store.
pub fn pending_withdrawal_index() -> IndexModel {
    IndexModel::builder()
        .keys(doc! { "teacher": 1 })
        .options(
            IndexOptions::builder()
                .name("teacher_pending_withdrawal".to_string())
                .unique(true)
                .partial_filter_expression(pending_withdrawal_match())
                .build(),
        )
        .build()
}

fn already_pending(err: AppError) -> AppError {
    match err {
        AppError::DuplicateKey => {
            AppError::bad_request("You already have a pending withdrawal request")
        }
        other => other,
    }
}

fn wallets(db: &Database) -> Collection<Wallet> {
    db.collection(WALLETS)
}

fn transactions(db: &Database) -> Collection<WalletTransaction> {
    db.collection(TRANSACTIONS)
}

fn new_wallet_fields() -> Document {
    let now = Utc::now();
    doc! {
        "_id": ObjectId::new(),
        "balance": 0.0,
        "totalEarned": 0.0,
        "totalWithdrawn": 0.0,
        "currency": CURRENCY,
        "createdAt": now,
        "updatedAt": now,
    }
}

pub async fn get_or_create(db: &Database, teacher: ObjectId) -> Result<Wallet> {
    let wallet = wallets(db)
        .find_one_and_update(
            doc! { "teacher": teacher },
            doc! { "$setOnInsert": new_wallet_fields() },
        )
        .upsert(true)
        .return_document(ReturnDocument::After)
        .await?
        .ok_or(AppError::NotFound("Wallet"))?;

    db.collection::<Document>(user::COLLECTION)
        .update_one(
            doc! { "_id": teacher, "wallet": { "$exists": false } },
            doc! { "$set": { "wallet": wallet.id } },
        )
        .await?;

    Ok(wallet)
}

/// Credits the teacher's share of a settled gateway payment. Runs inside the
/// caller's transaction so the payment status flip and the credit commit together.
pub async fn credit_payment(
    db: &Database,
    session: &mut ClientSession,
    payment: &Payment,
    commission_rate: f64,
) -> Result<WalletTransaction> {
    if payment.amount <= 0.0 {
        return Err(AppError::invalid_data("Credit amount must be positive"));
    }

    let split = CommissionSplit::compute(payment.amount, commission_rate);
    let now = Utc::now();

    let wallet = wallets(db)
        .find_one_and_update(
            doc! { "teacher": payment.teacher_id },
            doc! {
                "$setOnInsert": {
                    "_id": ObjectId::new(),
                    "totalWithdrawn": 0.0,
                    "currency": CURRENCY,
                    "createdAt": now,
                },
                "$inc": { "balance": split.net, "totalEarned": split.net },
                "$set": { "updatedAt": now },
            },
        )
        .upsert(true)
        .return_document(ReturnDocument::After)
        .session(&mut *session)
        .await?
        .ok_or(AppError::NotFound("Wallet"))?;

    let entry = WalletTransaction {
        id: ObjectId::new(),
        wallet: wallet.id,
        teacher: payment.teacher_id,
        kind: TransactionType::Credit,
        amount: split.gross,
        commission: split.commission,
        net_amount: split.net,
        status: TransactionStatus::Completed,
        description: "Payment received for class".to_string(),
        payment: Some(payment.id),
        booking: payment.booking_id,
        withdrawal_method: None,
        withdrawal_details: None,
        processed_by: None,
        processed_at: None,
        rejection_reason: None,
        created_at: now,
        updated_at: now,
    };
    transactions(db)
        .insert_one(&entry)
        .session(&mut *session)
        .await?;

    info!(
        target: "payment",
        teacher = %payment.teacher_id,
        payment = %payment.id,
        net = split.net,
        commission = split.commission,
        "wallet credited"
    );
    Ok(entry)
}

async fn pending_withdrawal_total(db: &Database, teacher: ObjectId) -> Result<f64> {
    let pipeline = vec![
        doc! { "$match": {
            "teacher": teacher,
            "type": "WITHDRAWAL",
            "status": TransactionStatus::Pending.as_str(),
        }},
        doc! { "$group": { "_id": null, "total": { "$sum": "$amount" } } },
    ];
    let rows: Vec<Document> = transactions(db).aggregate(pipeline).await?.try_collect().await?;
    Ok(rows.first().map(|row| number(row, "total")).unwrap_or(0.0))
}

#[derive(Debug)]
pub struct WalletSummary {
    pub wallet: Wallet,
    pub pending_withdrawals: f64,
    pub available_for_withdrawal: f64,
}

pub async fn summary(db: &Database, teacher: ObjectId) -> Result<WalletSummary> {
    let wallet = get_or_create(db, teacher).await?;
    let pending = pending_withdrawal_total(db, teacher).await?;
    Ok(WalletSummary {
        available_for_withdrawal: round2(wallet.balance - pending),
        pending_withdrawals: pending,
        wallet,
    })
}

pub async fn request_withdrawal(
    db: &Database,
    teacher: ObjectId,
    request: WithdrawRequest,
) -> Result<WalletTransaction> {
    let wallet = get_or_create(db, teacher).await?;

    if debit(wallet.balance, request.amount).is_none() {
        return Err(AppError::bad_request(format!(
            "Insufficient balance. Available: {}, Requested: {}",
            wallet.balance, request.amount
        )));
    }

    let mut filter = pending_withdrawal_match();
    filter.insert("teacher", teacher);
    if transactions(db).find_one(filter).await?.is_some() {
        return Err(already_pending(AppError::DuplicateKey));
    }

    let now = Utc::now();
    let entry = WalletTransaction {
        id: ObjectId::new(),
        wallet: wallet.id,
        teacher,
        kind: TransactionType::Withdrawal,
        amount: request.amount,
        commission: 0.0,
        net_amount: request.amount,
        status: TransactionStatus::Pending,
        description: format!(
            "Withdrawal request via {}",
            request.withdrawal_method.as_str()
        ),
        payment: None,
        booking: None,
        withdrawal_method: Some(request.withdrawal_method),
        withdrawal_details: Some(serde_json::Value::Object(request.withdrawal_details)),
        processed_by: None,
        processed_at: None,
        rejection_reason: None,
        created_at: now,
        updated_at: now,
    };
    transactions(db)
        .insert_one(&entry)
        .await
        .map_err(|e| already_pending(AppError::from(e)))?;
    Ok(entry)
}

async fn pending_withdrawal(
    db: &Database,
    session: Option<&mut ClientSession>,
    id: ObjectId,
) -> Result<WalletTransaction> {
    let collection = transactions(db);
    let find = collection.find_one(doc! { "_id": id });
    let tx = match session {
        Some(session) => find.session(session).await?,
        None => find.await?,
    }
    .ok_or(AppError::NotFound("Transaction"))?;

    if tx.kind != TransactionType::Withdrawal {
        return Err(AppError::bad_request("Transaction is not a withdrawal"));
    }
    if tx.status != TransactionStatus::Pending {
        return Err(AppError::bad_request(format!(
            "Cannot process transaction with status: {}",
            tx.status.as_str()
        )));
    }
    Ok(tx)
}

async fn approve_in_session(
    db: &Database,
    session: &mut ClientSession,
    id: ObjectId,
    admin: ObjectId,
) -> Result<WalletTransaction> {
    let tx = pending_withdrawal(db, Some(&mut *session), id).await?;
    let now = Utc::now();

    let debited = wallets(db)
        .update_one(
            debit_filter(tx.wallet, tx.amount),
            doc! {
                "$inc": { "balance": -tx.amount, "totalWithdrawn": tx.amount },
                "$set": { "updatedAt": now },
            },
        )
        .session(&mut *session)
        .await?;
    if debited.matched_count == 0 {
        return Err(AppError::bad_request("Insufficient wallet balance"));
    }

    transactions(db)
        .find_one_and_update(
            doc! { "_id": id, "status": TransactionStatus::Pending.as_str() },
            doc! { "$set": {
                "status": TransactionStatus::Completed.as_str(),
                "processedBy": admin,
                "processedAt": now,
                "updatedAt": now,
            }},
        )
        .return_document(ReturnDocument::After)
        .session(&mut *session)
        .await?
        .ok_or_else(|| AppError::conflict("Withdrawal was processed concurrently"))
}

pub async fn approve_withdrawal(
    state: &AppState,
    id: ObjectId,
    admin: ObjectId,
) -> Result<WalletTransaction> {
    let mut session = state.client.start_session().await?;
    session.start_transaction().await?;

    match approve_in_session(&state.db, &mut session, id, admin).await {
        Ok(tx) => {
            session.commit_transaction().await?;
            info!(withdrawal = %id, admin = %admin, amount = tx.amount, "withdrawal approved");
            Ok(tx)
        }
        Err(err) => {
            if let Err(abort_err) = session.abort_transaction().await {
                warn!("Failed to abort withdrawal transaction: {}", abort_err);
            }
            Err(err)
        }
    }
}

pub async fn reject_withdrawal(
    db: &Database,
    id: ObjectId,
    admin: ObjectId,
    reason: &str,
) -> Result<WalletTransaction> {
    pending_withdrawal(db, None, id).await?;
    let now = Utc::now();

    transactions(db)
        .find_one_and_update(
            doc! { "_id": id, "status": TransactionStatus::Pending.as_str() },
            doc! { "$set": {
                "status": TransactionStatus::Rejected.as_str(),
                "processedBy": admin,
                "processedAt": now,
                "rejectionReason": reason.trim(),
                "updatedAt": now,
            }},
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::conflict("Withdrawal was processed concurrently"))
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTotals {
    pub count: i64,
    pub amount: f64,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletStats {
    pub total_balance: f64,
    pub total_earned: f64,
    pub total_withdrawn: f64,
    pub teacher_count: i64,
    pub pending_withdrawals: PendingTotals,
}

fn number(row: &Document, key: &str) -> f64 {
    match row.get(key) {
        Some(mongodb::bson::Bson::Double(v)) => *v,
        Some(mongodb::bson::Bson::Int32(v)) => *v as f64,
        Some(mongodb::bson::Bson::Int64(v)) => *v as f64,
        _ => 0.0,
    }
}

pub async fn stats(db: &Database) -> Result<WalletStats> {
    let totals: Vec<Document> = wallets(db)
        .aggregate(vec![doc! { "$group": {
            "_id": null,
            "totalBalance": { "$sum": "$balance" },
            "totalEarned": { "$sum": "$totalEarned" },
            "totalWithdrawn": { "$sum": "$totalWithdrawn" },
            "teacherCount": { "$sum": 1 },
        }}])
        .await?
        .try_collect()
        .await?;

    let pending: Vec<Document> = transactions(db)
        .aggregate(vec![
            doc! { "$match": { "type": "WITHDRAWAL", "status": TransactionStatus::Pending.as_str() } },
            doc! { "$group": { "_id": null, "count": { "$sum": 1 }, "amount": { "$sum": "$amount" } } },
        ])
        .await?
        .try_collect()
        .await?;

    let mut stats = WalletStats::default();
    if let Some(row) = totals.first() {
        stats.total_balance = round2(number(row, "totalBalance"));
        stats.total_earned = round2(number(row, "totalEarned"));
        stats.total_withdrawn = round2(number(row, "totalWithdrawn"));
        stats.teacher_count = number(row, "teacherCount") as i64;
    }
    if let Some(row) = pending.first() {
        stats.pending_withdrawals = PendingTotals {
            count: number(row, "count") as i64,
            amount: round2(number(row, "amount")),
        };
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commission_is_rounded_to_cents() {
        let split = CommissionSplit::compute(1234.56, 0.10);
        assert_eq!(split.commission, 123.46);
        assert_eq!(split.net, 1111.10);
        assert_eq!(split.gross, 1234.56);
    }

    #[test]
    fn zero_commission_passes_everything_through() {
        let split = CommissionSplit::compute(500.0, 0.0);
        assert_eq!(split.commission, 0.0);
        assert_eq!(split.net, 500.0);
    }

    #[test]
    fn debit_never_goes_negative() {
        assert_eq!(debit(100.0, 40.0), Some(60.0));
        assert_eq!(debit(100.0, 100.0), Some(0.0));
        assert_eq!(debit(100.0, 100.01), None);
        assert_eq!(debit(100.0, 0.0), None);
    }

    #[test]
    fn approval_debit_requires_covering_balance() {
        let wallet = ObjectId::new();
        let filter = debit_filter(wallet, 250.0);
        assert_eq!(filter.get_object_id("_id").unwrap(), wallet);
        let guard = filter.get_document("balance").unwrap();
        assert_eq!(guard.get_f64("$gte").unwrap(), 250.0);
        assert_eq!(debit(249.99, 250.0), None);
    }

    #[test]
    fn only_pending_withdrawals_are_unique_per_teacher() {
        let index = pending_withdrawal_index();
        assert_eq!(index.keys, doc! { "teacher": 1 });
        let options = index.options.unwrap();
        assert_eq!(options.unique, Some(true));
        assert_eq!(
            options.partial_filter_expression,
            Some(doc! { "type": "WITHDRAWAL", "status": "PENDING" })
        );
    }

    #[test]
    fn concurrent_pending_insert_reads_as_existing_request() {
        let err = already_pending(AppError::DuplicateKey);
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("pending withdrawal"));

        let passthrough = already_pending(AppError::NotFound("Wallet"));
        assert_eq!(passthrough.status_code(), axum::http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn balance_equals_net_credits_minus_approved_withdrawals() {
        let rate = 0.10;
        let credits = [1500.0, 800.0, 999.99];
        let mut balance = 0.0;
        let mut net_total = 0.0;
        for gross in credits {
            let split = CommissionSplit::compute(gross, rate);
            balance = round2(balance + split.net);
            net_total = round2(net_total + split.net);
        }

        let mut withdrawn = 0.0;
        for amount in [1000.0, 5000.0, 900.0] {
            if let Some(next) = debit(balance, amount) {
                balance = next;
                withdrawn = round2(withdrawn + amount);
            }
        }

        assert_eq!(withdrawn, 1900.0);
        assert_eq!(balance, round2(net_total - withdrawn));
        assert!(balance >= 0.0);
    }
}
