//! Storage-level checks against a live MongoDB replica set.
//!
//! Set `TEST_MONGODB_URI` (for example `mongodb://127.0.0.1:27017/?replicaSet=rs0`)
//! to run them; without it every test returns early. Each test works in its own
//! throwaway database.

use chrono::Utc;
use mongodb::{
    bson::{doc, oid::ObjectId},
    Client, Collection,
};

use tutorconnected_api::{
    config::{AppConfig, PaymentRules},
    database::connection::ensure_indexes,
    errors::AppError,
    models::{
        payment::{self, Payment, PaymentStatus},
        review::{self, Review},
        wallet::{self, TransactionStatus, TransactionType, Wallet, WalletTransaction},
    },
    services::{
        payment_service::{self, Settlement},
        wallet_service,
    },
    state::AppState,
};

async fn state() -> Option<AppState> {
    let uri = std::env::var("TEST_MONGODB_URI").ok()?;
    let client = Client::with_uri_str(&uri).await.unwrap();
    let config = AppConfig {
        database_url: uri,
        database_name: format!("tutorconnected_store_{}", ObjectId::new().to_hex()),
        jwt_secret: "test-secret".into(),
        jwt_expire_hours: 1,
        host: "127.0.0.1".into(),
        port: 0,
        base_url: "http://localhost:5000".into(),
        frontend_url: "http://localhost:3000".into(),
        meeting_base_url: "https://meet.jit.si".into(),
        cors_origins: Vec::new(),
        gateway: None,
        payment_rules: PaymentRules::default(),
    };
    let state = AppState::new(client, config);
    ensure_indexes(&state.db).await.unwrap();
    Some(state)
}

fn pending_payment(teacher: ObjectId, amount: f64) -> Payment {
    let now = Utc::now();
    Payment {
        id: ObjectId::new(),
        gig_id: ObjectId::new(),
        student_id: ObjectId::new(),
        teacher_id: teacher,
        booking_id: None,
        amount,
        status: PaymentStatus::Pending,
        transaction_id: format!("TC-{}", ObjectId::new().to_hex()),
        status_history: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

fn withdrawal(wallet: ObjectId, teacher: ObjectId, amount: f64) -> WalletTransaction {
    let now = Utc::now();
    WalletTransaction {
        id: ObjectId::new(),
        wallet,
        teacher,
        kind: TransactionType::Withdrawal,
        amount,
        commission: 0.0,
        net_amount: amount,
        status: TransactionStatus::Pending,
        description: "Withdrawal request via BANK_TRANSFER".into(),
        payment: None,
        booking: None,
        withdrawal_method: None,
        withdrawal_details: None,
        processed_by: None,
        processed_at: None,
        rejection_reason: None,
        created_at: now,
        updated_at: now,
    }
}

fn transactions(state: &AppState) -> Collection<WalletTransaction> {
    state.db.collection(wallet::TRANSACTIONS)
}

#[tokio::test]
async fn repeated_success_callbacks_credit_the_wallet_once() {
    let Some(state) = state().await else { return };
    let teacher = ObjectId::new();
    let payment = pending_payment(teacher, 1000.0);
    let tran_id = payment.transaction_id.clone();
    state
        .db
        .collection::<Payment>(payment::COLLECTION)
        .insert_one(&payment)
        .await
        .unwrap();

    let first = payment_service::settle(&state, &tran_id, PaymentStatus::Success).await.unwrap();
    let second = payment_service::settle(&state, &tran_id, PaymentStatus::Success).await.unwrap();
    let late_fail = payment_service::settle(&state, &tran_id, PaymentStatus::Failed).await.unwrap();

    assert_eq!(first, Settlement::Applied(PaymentStatus::Success));
    assert_eq!(second, Settlement::Unchanged(PaymentStatus::Success));
    assert_eq!(late_fail, Settlement::Unchanged(PaymentStatus::Success));

    let wallet = wallet_service::get_or_create(&state.db, teacher).await.unwrap();
    assert_eq!(wallet.balance, 900.0);
    let credits = transactions(&state)
        .count_documents(doc! { "teacher": teacher, "type": "CREDIT" })
        .await
        .unwrap();
    assert_eq!(credits, 1);

    state.db.drop().await.unwrap();
}

#[tokio::test]
async fn failed_payment_recovers_on_later_success() {
    let Some(state) = state().await else { return };
    let teacher = ObjectId::new();
    let payment = pending_payment(teacher, 500.0);
    let tran_id = payment.transaction_id.clone();
    state
        .db
        .collection::<Payment>(payment::COLLECTION)
        .insert_one(&payment)
        .await
        .unwrap();

    let failed = payment_service::settle(&state, &tran_id, PaymentStatus::Failed).await.unwrap();
    let recovered = payment_service::settle(&state, &tran_id, PaymentStatus::Success).await.unwrap();

    assert_eq!(failed, Settlement::Applied(PaymentStatus::Failed));
    assert_eq!(recovered, Settlement::Applied(PaymentStatus::Success));
    let wallet = wallet_service::get_or_create(&state.db, teacher).await.unwrap();
    assert_eq!(wallet.balance, 450.0);

    state.db.drop().await.unwrap();
}

#[tokio::test]
async fn approval_without_covering_balance_leaves_wallet_untouched() {
    let Some(state) = state().await else { return };
    let teacher = ObjectId::new();
    let admin = ObjectId::new();
    let account = wallet_service::get_or_create(&state.db, teacher).await.unwrap();
    state
        .db
        .collection::<Wallet>(wallet::WALLETS)
        .update_one(doc! { "_id": account.id }, doc! { "$set": { "balance": 50.0 } })
        .await
        .unwrap();
    let request = withdrawal(account.id, teacher, 100.0);
    transactions(&state).insert_one(&request).await.unwrap();

    let result = wallet_service::approve_withdrawal(&state, request.id, admin).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let account = wallet_service::get_or_create(&state.db, teacher).await.unwrap();
    assert_eq!(account.balance, 50.0);
    assert_eq!(account.total_withdrawn, 0.0);
    let stored = transactions(&state)
        .find_one(doc! { "_id": request.id })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TransactionStatus::Pending);

    state.db.drop().await.unwrap();
}

#[tokio::test]
async fn second_pending_withdrawal_is_rejected_by_index() {
    let Some(state) = state().await else { return };
    let teacher = ObjectId::new();
    let wallet = ObjectId::new();

    transactions(&state)
        .insert_one(&withdrawal(wallet, teacher, 100.0))
        .await
        .unwrap();
    let second = transactions(&state)
        .insert_one(&withdrawal(wallet, teacher, 200.0))
        .await
        .map_err(AppError::from);
    assert!(matches!(second, Err(AppError::DuplicateKey)));

    let mut done = withdrawal(wallet, teacher, 300.0);
    done.status = TransactionStatus::Completed;
    transactions(&state).insert_one(&done).await.unwrap();

    state.db.drop().await.unwrap();
}

#[tokio::test]
async fn second_review_of_same_gig_is_duplicate() {
    let Some(state) = state().await else { return };
    let now = Utc::now();
    let first = Review {
        id: ObjectId::new(),
        gig: ObjectId::new(),
        teacher: ObjectId::new(),
        student: ObjectId::new(),
        booking: ObjectId::new(),
        rating: 5,
        title: None,
        comment: None,
        teacher_reply: None,
        teacher_reply_at: None,
        created_at: now,
        updated_at: now,
    };
    let second = Review {
        id: ObjectId::new(),
        rating: 1,
        ..first.clone()
    };

    let reviews = state.db.collection::<Review>(review::COLLECTION);
    reviews.insert_one(&first).await.unwrap();
    let duplicate = reviews.insert_one(&second).await.map_err(AppError::from);
    assert!(matches!(duplicate, Err(AppError::DuplicateKey)));

    state.db.drop().await.unwrap();
}
