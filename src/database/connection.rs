use mongodb::{
    bson::{doc, Document},
    options::IndexOptions,
    Client, Database, IndexModel,
};

use crate::config::AppConfig;
use crate::errors::Result;
use crate::models::{
    booking, payment, review, teacher_payment_info, trx_registry, user, wallet,
};
use crate::services::wallet_service;

pub async fn connect(config: &AppConfig) -> Result<Client> {
    let client = Client::with_uri_str(&config.database_url).await?;

    let db = client.database(&config.database_name);
    match db.run_command(doc! { "ping": 1 }).await {
        Ok(_) => tracing::info!("Connected to database: {}", config.database_name),
        Err(e) => tracing::warn!(
            "Database '{}' is not reachable yet: {}",
            config.database_name,
            e
        ),
    }

    Ok(client)
}

fn index(keys: Document, unique: bool) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(unique).build())
        .build()
}

/// Creates the indexes backing uniqueness rules and hot lookups.
pub async fn ensure_indexes(db: &Database) -> Result<()> {
    let specs: Vec<(&str, IndexModel)> = vec![
        (user::COLLECTION, index(doc! { "email": 1 }, true)),
        (review::COLLECTION, index(doc! { "student": 1, "gig": 1 }, true)),
        (review::COLLECTION, index(doc! { "gig": 1, "createdAt": -1 }, false)),
        (payment::COLLECTION, index(doc! { "transactionId": 1 }, true)),
        (payment::COLLECTION, index(doc! { "bookingId": 1, "status": 1 }, false)),
        (trx_registry::COLLECTION, index(doc! { "method": 1, "trxid": 1 }, true)),
        (wallet::WALLETS, index(doc! { "teacher": 1 }, true)),
        (wallet::TRANSACTIONS, index(doc! { "teacher": 1, "createdAt": -1 }, false)),
        (wallet::TRANSACTIONS, wallet_service::pending_withdrawal_index()),
        (teacher_payment_info::COLLECTION, index(doc! { "teacherId": 1 }, true)),
        (booking::COLLECTION, index(doc! { "paymentRefCode": 1 }, true)),
        (booking::COLLECTION, index(doc! { "meetingRoomId": 1 }, false)),
        (booking::COLLECTION, index(doc! { "student": 1, "createdAt": -1 }, false)),
        (booking::COLLECTION, index(doc! { "gig": 1, "status": 1 }, false)),
        (booking::COLLECTION, index(doc! { "scheduledAt": 1 }, false)),
    ];

    for (collection, model) in specs {
        db.collection::<Document>(collection)
            .create_index(model)
            .await?;
    }

    tracing::info!("Database indexes ensured");
    Ok(())
}
