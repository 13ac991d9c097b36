use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Serialize};

pub const COLLECTION: &str = "payments";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: PaymentStatus,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub gig_id: ObjectId,
    pub student_id: ObjectId,
    pub teacher_id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<ObjectId>,
    pub amount: f64,
    pub status: PaymentStatus,
    pub transaction_id: String,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayment {
    pub gig_id: String,
    pub booking_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPaymentResponse {
    pub success: bool,
    pub url: String,
    pub tran_id: String,
}

/// Callback body posted by the gateway (form or JSON).
#[derive(Debug, Default, Deserialize)]
pub struct GatewayCallback {
    pub tran_id: Option<String>,
    pub status: Option<String>,
    pub val_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchBookingStatus {
    pub booking_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PaidResponse {
    pub success: bool,
    pub paid: bool,
}
