use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::datetime;
use super::teacher_payment_info::ReceiverSnapshot;

pub const COLLECTION: &str = "bookings";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethodType {
    Manual,
    #[default]
    Gateway,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualPaymentStatus {
    PendingManual,
    Submitted,
    Verified,
    Rejected,
    Expired,
}

impl ManualPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManualPaymentStatus::PendingManual => "pending_manual",
            ManualPaymentStatus::Submitted => "submitted",
            ManualPaymentStatus::Verified => "verified",
            ManualPaymentStatus::Rejected => "rejected",
            ManualPaymentStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualMethod {
    Bkash,
    Nagad,
    Bank,
}

impl ManualMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManualMethod::Bkash => "bkash",
            ManualMethod::Nagad => "nagad",
            ManualMethod::Bank => "bank",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualPayment {
    pub status: ManualPaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<ManualMethod>,
    pub amount_expected: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_paid: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trxid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_url: Option<String>,
    #[serde(default, with = "datetime::optional", skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, with = "datetime::optional", skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<ObjectId>,
    #[serde(default, with = "datetime::optional", skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    #[serde(default)]
    pub submission_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_snapshot: Option<ReceiverSnapshot>,
    /// Start of the submission window.
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub accepted_at: DateTime<Utc>,
}

impl ManualPayment {
    pub fn awaiting_proof(amount_expected: f64, accepted_at: DateTime<Utc>) -> Self {
        ManualPayment {
            status: ManualPaymentStatus::PendingManual,
            method: None,
            amount_expected,
            amount_paid: None,
            trxid: None,
            sender_number: None,
            screenshot_url: None,
            submitted_at: None,
            verified_at: None,
            verified_by: None,
            rejected_at: None,
            reject_reason: None,
            submission_count: 0,
            receiver_snapshot: None,
            accepted_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_status: Option<ManualPaymentStatus>,
    pub to_status: ManualPaymentStatus,
    /// Absent for system actions such as window expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performed_by: Option<ObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub student: ObjectId,
    pub gig: ObjectId,
    pub status: BookingStatus,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub scheduled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_link: Option<String>,

    #[serde(default)]
    pub attended: bool,
    #[serde(default, with = "datetime::optional", skip_serializing_if = "Option::is_none")]
    pub attended_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub payment_method: PaymentMethodType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_payment: Option<ManualPayment>,
    pub payment_ref_code: String,
    #[serde(default)]
    pub payment_audit_log: Vec<AuditLogEntry>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBooking {
    #[validate(length(min = 24, max = 24, message = "A valid gig id is required"))]
    pub gig_id: String,
    /// RFC 3339 instant. Preferred over the date/time pair.
    pub scheduled_at: Option<String>,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    #[validate(length(max = 64))]
    pub time_zone: Option<String>,
    #[validate(length(max = 500))]
    pub message: Option<String>,
    pub payment_method: Option<PaymentMethodType>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookingStatus {
    pub status: BookingStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct BookingQuery {
    pub status: Option<BookingStatus>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualPaymentView {
    pub status: ManualPaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<ManualMethod>,
    pub amount_expected: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_paid: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trxid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
    pub submission_count: u32,
    pub accepted_at: DateTime<Utc>,
}

impl From<ManualPayment> for ManualPaymentView {
    fn from(mp: ManualPayment) -> Self {
        ManualPaymentView {
            status: mp.status,
            method: mp.method,
            amount_expected: mp.amount_expected,
            amount_paid: mp.amount_paid,
            trxid: mp.trxid,
            sender_number: mp.sender_number,
            screenshot_url: mp.screenshot_url,
            submitted_at: mp.submitted_at,
            verified_at: mp.verified_at,
            rejected_at: mp.rejected_at,
            reject_reason: mp.reject_reason,
            submission_count: mp.submission_count,
            accepted_at: mp.accepted_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub id: String,
    pub student: String,
    pub gig: String,
    pub status: BookingStatus,
    pub scheduled_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_link: Option<String>,
    pub attended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attended_at: Option<DateTime<Utc>>,
    pub payment_method: PaymentMethodType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_payment: Option<ManualPaymentView>,
    pub payment_ref_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        BookingResponse {
            id: booking.id.to_hex(),
            student: booking.student.to_hex(),
            gig: booking.gig.to_hex(),
            status: booking.status,
            scheduled_at: booking.scheduled_at,
            time_zone: booking.time_zone,
            message: booking.message,
            meeting_room_id: booking.meeting_room_id,
            meeting_link: booking.meeting_link,
            attended: booking.attended,
            attended_at: booking.attended_at,
            payment_method: booking.payment_method,
            manual_payment: booking.manual_payment.map(ManualPaymentView::from),
            payment_ref_code: booking.payment_ref_code,
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitManualPayment {
    pub method: ManualMethod,
    pub trxid: String,
    #[validate(length(max = 20))]
    pub sender_number: Option<String>,
    #[validate(range(min = 0.0))]
    pub amount_paid: Option<f64>,
    #[validate(length(max = 500))]
    pub screenshot_url: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectManualPayment {
    #[validate(length(min = 1, max = 500, message = "Rejection reason is required"))]
    pub reason: String,
}
