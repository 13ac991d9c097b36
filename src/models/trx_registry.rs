use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Serialize};

use super::booking::ManualMethod;

pub const COLLECTION: &str = "payment_trx_registry";

/// One row per manual transfer id ever submitted; `(method, trxid)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTrxRegistry {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub method: ManualMethod,
    pub trxid: String,
    pub booking_id: ObjectId,
    pub teacher_id: ObjectId,
    pub student_id: ObjectId,
    pub amount: f64,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}
