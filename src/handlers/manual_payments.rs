//! Proof-of-transfer payments: teacher receiving details, student
//! submissions and teacher review.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use chrono::{DateTime, Utc};
use mongodb::{
    bson::{self, doc, oid::ObjectId, Document},
    options::ReturnDocument,
    Collection,
};
use serde::Serialize;
use validator::Validate;

use super::bookings::{bookings, find_booking, find_gig, require_participant};
use super::parse_id;
use crate::dtos::ApiResponse;
use crate::errors::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::booking::{
    Booking, BookingStatus, ManualMethod, ManualPaymentStatus, PaymentMethodType,
    RejectManualPayment, SubmitManualPayment,
};
use crate::models::teacher_payment_info::{
    self, PaymentInfoResponse, TeacherPaymentInfo, UpsertPaymentInfo,
};
use crate::models::trx_registry::{self, PaymentTrxRegistry};
use crate::models::user::{self, Role, User};
use crate::services::activity_service::{self, NewActivity};
use crate::services::manual_payment_rules::{self, SubmitDecision};
use crate::state::AppState;

fn payment_infos(state: &AppState) -> Collection<TeacherPaymentInfo> {
    state.db.collection(teacher_payment_info::COLLECTION)
}

async fn find_payment_info(state: &AppState, teacher: ObjectId) -> Result<Option<TeacherPaymentInfo>> {
    Ok(payment_infos(state)
        .find_one(doc! { "teacherId": teacher })
        .await?)
}

pub async fn get_my_payment_info(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<ApiResponse<Option<PaymentInfoResponse>>>> {
    auth.require_role(&[Role::Teacher])?;
    let info = find_payment_info(&state, auth.id()).await?;
    Ok(Json(ApiResponse::success(info.map(PaymentInfoResponse::from))))
}

fn optional(value: Option<String>) -> bson::Bson {
    value.map(bson::Bson::String).unwrap_or(bson::Bson::Null)
}

pub async fn upsert_my_payment_info(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<UpsertPaymentInfo>,
) -> Result<Json<ApiResponse<PaymentInfoResponse>>> {
    auth.require_role(&[Role::Teacher])?;
    payload.validate()?;

    let info = payload.normalized();
    if !info.has_any_method() {
        return Err(AppError::invalid_data(
            "Please provide at least one payment method (bKash, Nagad, or Bank details)",
        ));
    }

    let saved = payment_infos(&state)
        .find_one_and_update(
            doc! { "teacherId": auth.id() },
            doc! {
                "$set": {
                    "bkashNumber": optional(info.bkash_number),
                    "nagadNumber": optional(info.nagad_number),
                    "bankAccountName": optional(info.bank_account_name),
                    "bankAccountNumber": optional(info.bank_account_number),
                    "bankName": optional(info.bank_name),
                    "bankBranch": optional(info.bank_branch),
                    "routingNumber": optional(info.routing_number),
                    "instructions": optional(info.instructions),
                    "updatedAt": Utc::now(),
                },
                "$setOnInsert": { "_id": ObjectId::new() },
            },
        )
        .upsert(true)
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::service("Payment info upsert returned no document"))?;

    activity_service::record(
        &state.db,
        NewActivity::new("teacher.payment_info.update")
            .by(auth.id())
            .target("teacher_payment_info", saved.id.to_hex())
            .request(&headers),
    )
    .await;

    Ok(Json(ApiResponse::with_message(
        PaymentInfoResponse::from(saved),
        "Payment info updated successfully",
    )))
}

/// Flips a lapsed submission window to `expired`, once, with a system audit entry.
async fn expire_submission(state: &AppState, booking: &Booking, from: ManualPaymentStatus) -> Result<()> {
    let now = Utc::now();
    let entry = manual_payment_rules::audit_entry(
        "payment.expired",
        Some(from),
        ManualPaymentStatus::Expired,
        None,
        Some("Submission window expired".to_string()),
        now,
    );
    let result = bookings(state)
        .update_one(
            doc! { "_id": booking.id, "manualPayment.status": from.as_str() },
            doc! {
                "$set": {
                    "manualPayment.status": ManualPaymentStatus::Expired.as_str(),
                    "updatedAt": now,
                },
                "$push": { "paymentAuditLog": bson::to_bson(&entry)? },
            },
        )
        .await?;
    if result.modified_count > 0 {
        tracing::info!(target: "payment", booking = %booking.id, "manual payment window expired");
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualPaymentInstructions {
    pub booking_id: String,
    pub payment_ref_code: String,
    pub amount_expected: f64,
    pub teacher_name: String,
    pub teacher_email: String,
    pub gig_title: String,
    pub payment_status: ManualPaymentStatus,
    pub submission_count: u32,
    pub max_submissions: u32,
    pub submission_window_hours: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    pub teacher_payment_info: PaymentInfoResponse,
}

pub async fn get_manual_payment_info(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ManualPaymentInstructions>>> {
    let booking = find_booking(&state, parse_id(&id)?).await?;
    let gig = find_gig(&state, booking.gig).await?;
    require_participant(&auth, &booking, &gig)?;

    let info = find_payment_info(&state, gig.teacher)
        .await?
        .ok_or_else(manual_payment_rules::payment_info_missing_error)?;
    let teacher = state
        .db
        .collection::<User>(user::COLLECTION)
        .find_one(doc! { "_id": gig.teacher })
        .await?;

    let rules = state.config.payment_rules;
    let mut payment_status = ManualPaymentStatus::PendingManual;
    if let Some(mp) = &booking.manual_payment {
        payment_status = mp.status;
        if mp.status == ManualPaymentStatus::PendingManual
            && manual_payment_rules::submission_window_expired(
                mp.accepted_at,
                Utc::now(),
                rules.submission_window_hours,
            )
        {
            expire_submission(&state, &booking, mp.status).await?;
            payment_status = ManualPaymentStatus::Expired;
        }
    }

    let manual = booking.manual_payment.as_ref();
    Ok(Json(ApiResponse::success(ManualPaymentInstructions {
        booking_id: booking.id.to_hex(),
        payment_ref_code: booking.payment_ref_code.clone(),
        amount_expected: manual.map(|mp| mp.amount_expected).unwrap_or(gig.price),
        teacher_name: teacher.as_ref().map(|t| t.name.clone()).unwrap_or_else(|| "Teacher".into()),
        teacher_email: teacher.map(|t| t.email).unwrap_or_default(),
        gig_title: gig.title,
        payment_status,
        submission_count: manual.map(|mp| mp.submission_count).unwrap_or(0),
        max_submissions: rules.max_submissions,
        submission_window_hours: rules.submission_window_hours,
        accepted_at: manual.map(|mp| mp.accepted_at),
        teacher_payment_info: PaymentInfoResponse::from(info),
    })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualPaymentOutcome {
    pub booking_id: String,
    pub payment_status: ManualPaymentStatus,
    pub submission_count: u32,
    pub max_submissions: u32,
}

async fn release_trxid(state: &AppState, method: ManualMethod, trxid: &str) {
    if let Err(e) = state
        .db
        .collection::<PaymentTrxRegistry>(trx_registry::COLLECTION)
        .delete_one(doc! { "method": method.as_str(), "trxid": trxid })
        .await
    {
        tracing::warn!(target: "payment", trxid, "Failed to release transaction id: {}", e);
    }
}

pub async fn submit_payment_proof(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<SubmitManualPayment>,
) -> Result<Json<ApiResponse<ManualPaymentOutcome>>> {
    payload.validate()?;
    let trxid = manual_payment_rules::normalize_trxid(&payload.trxid)?;

    let booking = find_booking(&state, parse_id(&id)?).await?;
    if booking.student != auth.id() {
        return Err(AppError::forbidden("Only the booking student can submit payment proof"));
    }

    let rules = state.config.payment_rules;
    let now = Utc::now();
    let decision = manual_payment_rules::check_submission(
        booking.status,
        booking.payment_method,
        booking.manual_payment.as_ref(),
        now,
        &rules,
    )?;
    let Some(manual) = booking.manual_payment.as_ref() else {
        return Err(AppError::bad_request("This booking does not use manual payment"));
    };
    if decision == SubmitDecision::WindowExpired {
        expire_submission(&state, &booking, manual.status).await?;
        return Err(manual_payment_rules::window_expired_error());
    }

    let gig = find_gig(&state, booking.gig).await?;
    let amount_paid = payload.amount_paid.unwrap_or(manual.amount_expected);

    let registry = PaymentTrxRegistry {
        id: ObjectId::new(),
        method: payload.method,
        trxid: trxid.clone(),
        booking_id: booking.id,
        teacher_id: gig.teacher,
        student_id: auth.id(),
        amount: amount_paid,
        created_at: now,
    };
    state
        .db
        .collection::<PaymentTrxRegistry>(trx_registry::COLLECTION)
        .insert_one(&registry)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::DuplicateKey => manual_payment_rules::duplicate_trxid_error(),
            other => other,
        })?;

    let snapshot = find_payment_info(&state, gig.teacher)
        .await?
        .map(|info| info.snapshot(now));

    let from = manual.status;
    let count = manual.submission_count + 1;
    let entry = manual_payment_rules::audit_entry(
        "payment.submitted",
        Some(from),
        ManualPaymentStatus::Submitted,
        Some(auth.id()),
        Some(format!("TrxID: {}", trxid)),
        now,
    );

    let mut set = doc! {
        "manualPayment.status": ManualPaymentStatus::Submitted.as_str(),
        "manualPayment.method": payload.method.as_str(),
        "manualPayment.trxid": &trxid,
        "manualPayment.amountPaid": amount_paid,
        "manualPayment.submittedAt": now,
        "manualPayment.submissionCount": i64::from(count),
        "updatedAt": now,
    };
    let optional_fields = [
        ("manualPayment.senderNumber", payload.sender_number.as_deref()),
        ("manualPayment.screenshotUrl", payload.screenshot_url.as_deref()),
    ];
    for (key, value) in optional_fields {
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            set.insert(key, value);
        }
    }
    if let Some(snapshot) = &snapshot {
        set.insert("manualPayment.receiverSnapshot", bson::to_bson(snapshot)?);
    }

    let updated = bookings(&state)
        .update_one(
            doc! {
                "_id": booking.id,
                "status": BookingStatus::Accepted.as_str(),
                "manualPayment.status": from.as_str(),
                "manualPayment.submissionCount": i64::from(manual.submission_count),
            },
            doc! {
                "$set": set,
                "$unset": { "manualPayment.rejectedAt": "", "manualPayment.rejectReason": "" },
                "$push": { "paymentAuditLog": bson::to_bson(&entry)? },
            },
        )
        .await;

    match updated {
        Ok(result) if result.matched_count == 1 => {}
        Ok(_) => {
            release_trxid(&state, payload.method, &trxid).await;
            return Err(AppError::conflict("Payment was updated by another request"));
        }
        Err(e) => {
            release_trxid(&state, payload.method, &trxid).await;
            return Err(e.into());
        }
    }

    tracing::info!(
        target: "payment",
        booking = %booking.id,
        method = payload.method.as_str(),
        submission = count,
        "manual payment proof submitted"
    );
    activity_service::record(
        &state.db,
        NewActivity::new("booking.payment.submitted")
            .by(auth.id())
            .target("booking", booking.id.to_hex())
            .metadata(doc! {
                "method": payload.method.as_str(),
                "trxid": &trxid,
                "submissionCount": i64::from(count),
            })
            .request(&headers),
    )
    .await;

    Ok(Json(ApiResponse::with_message(
        ManualPaymentOutcome {
            booking_id: booking.id.to_hex(),
            payment_status: ManualPaymentStatus::Submitted,
            submission_count: count,
            max_submissions: rules.max_submissions,
        },
        "Payment proof submitted successfully. Waiting for teacher verification.",
    )))
}

/// Loads a booking the caller teaches, for proof review.
async fn teacher_booking(state: &AppState, auth: &AuthUser, id: &str, verb: &str) -> Result<Booking> {
    let booking = find_booking(state, parse_id(id)?).await?;
    let gig = find_gig(state, booking.gig).await?;
    if gig.teacher != auth.id() {
        return Err(AppError::forbidden(format!(
            "Only the booking teacher can {} payment",
            verb
        )));
    }
    manual_payment_rules::check_reviewable(booking.manual_payment.as_ref(), verb)?;
    Ok(booking)
}

async fn apply_review(
    state: &AppState,
    booking: &Booking,
    set: Document,
    entry_doc: Document,
) -> Result<Booking> {
    bookings(state)
        .find_one_and_update(
            doc! {
                "_id": booking.id,
                "manualPayment.status": ManualPaymentStatus::Submitted.as_str(),
            },
            doc! { "$set": set, "$push": { "paymentAuditLog": entry_doc } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::conflict("Payment was updated by another request"))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ManualPaymentOutcome>>> {
    let booking = teacher_booking(&state, &auth, &id, "verify").await?;
    let now = Utc::now();
    let rules = state.config.payment_rules;

    let submitted_at = booking.manual_payment.as_ref().and_then(|mp| mp.submitted_at);
    if manual_payment_rules::verification_is_late(submitted_at, now, rules.verification_window_hours) {
        tracing::warn!(target: "payment", booking = %booking.id, "late manual payment verification");
    }

    let entry = manual_payment_rules::audit_entry(
        "payment.verified",
        Some(ManualPaymentStatus::Submitted),
        ManualPaymentStatus::Verified,
        Some(auth.id()),
        None,
        now,
    );
    let updated = apply_review(
        &state,
        &booking,
        doc! {
            "manualPayment.status": ManualPaymentStatus::Verified.as_str(),
            "manualPayment.verifiedAt": now,
            "manualPayment.verifiedBy": auth.id(),
            "updatedAt": now,
        },
        bson::to_document(&entry)?,
    )
    .await?;

    let trxid = updated
        .manual_payment
        .as_ref()
        .and_then(|mp| mp.trxid.clone())
        .unwrap_or_default();
    tracing::info!(target: "payment", booking = %updated.id, trxid = %trxid, "manual payment verified");
    activity_service::record(
        &state.db,
        NewActivity::new("booking.payment.verified")
            .by(auth.id())
            .target("booking", updated.id.to_hex())
            .metadata(doc! { "trxid": &trxid })
            .request(&headers),
    )
    .await;

    Ok(Json(ApiResponse::with_message(
        ManualPaymentOutcome {
            booking_id: updated.id.to_hex(),
            payment_status: ManualPaymentStatus::Verified,
            submission_count: updated
                .manual_payment
                .as_ref()
                .map(|mp| mp.submission_count)
                .unwrap_or(0),
            max_submissions: rules.max_submissions,
        },
        "Payment verified successfully. Student can now join the class.",
    )))
}

pub async fn reject_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<RejectManualPayment>,
) -> Result<Json<ApiResponse<ManualPaymentOutcome>>> {
    payload.validate()?;
    let reason = payload.reason.trim().to_string();
    if reason.is_empty() {
        return Err(AppError::invalid_data("Rejection reason is required"));
    }

    let booking = teacher_booking(&state, &auth, &id, "reject").await?;
    let now = Utc::now();
    let entry = manual_payment_rules::audit_entry(
        "payment.rejected",
        Some(ManualPaymentStatus::Submitted),
        ManualPaymentStatus::Rejected,
        Some(auth.id()),
        Some(reason.clone()),
        now,
    );
    let updated = apply_review(
        &state,
        &booking,
        doc! {
            "manualPayment.status": ManualPaymentStatus::Rejected.as_str(),
            "manualPayment.rejectedAt": now,
            "manualPayment.rejectReason": &reason,
            "updatedAt": now,
        },
        bson::to_document(&entry)?,
    )
    .await?;

    tracing::info!(target: "payment", booking = %updated.id, "manual payment rejected");
    activity_service::record(
        &state.db,
        NewActivity::new("booking.payment.rejected")
            .by(auth.id())
            .target("booking", updated.id.to_hex())
            .metadata(doc! { "reason": &reason })
            .request(&headers),
    )
    .await;

    Ok(Json(ApiResponse::with_message(
        ManualPaymentOutcome {
            booking_id: updated.id.to_hex(),
            payment_status: ManualPaymentStatus::Rejected,
            submission_count: updated
                .manual_payment
                .as_ref()
                .map(|mp| mp.submission_count)
                .unwrap_or(0),
            max_submissions: state.config.payment_rules.max_submissions,
        },
        "Payment rejected. Student can resubmit with correct details.",
    )))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualPaymentStatusView {
    pub booking_id: String,
    pub booking_status: BookingStatus,
    pub payment_ref_code: String,
    pub payment_method: PaymentMethodType,
    pub payment_status: ManualPaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<ManualMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trxid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_expected: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_paid: Option<f64>,
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
    pub max_submissions: u32,
}

fn status_view(booking: Booking, max_submissions: u32) -> ManualPaymentStatusView {
    let manual = booking.manual_payment;
    ManualPaymentStatusView {
        booking_id: booking.id.to_hex(),
        booking_status: booking.status,
        payment_ref_code: booking.payment_ref_code,
        payment_method: booking.payment_method,
        payment_status: manual
            .as_ref()
            .map(|mp| mp.status)
            .unwrap_or(ManualPaymentStatus::PendingManual),
        method: manual.as_ref().and_then(|mp| mp.method),
        trxid: manual.as_ref().and_then(|mp| mp.trxid.clone()),
        amount_expected: manual.as_ref().map(|mp| mp.amount_expected),
        amount_paid: manual.as_ref().and_then(|mp| mp.amount_paid),
        sender_number: manual.as_ref().and_then(|mp| mp.sender_number.clone()),
        screenshot_url: manual.as_ref().and_then(|mp| mp.screenshot_url.clone()),
        submitted_at: manual.as_ref().and_then(|mp| mp.submitted_at),
        verified_at: manual.as_ref().and_then(|mp| mp.verified_at),
        rejected_at: manual.as_ref().and_then(|mp| mp.rejected_at),
        reject_reason: manual.as_ref().and_then(|mp| mp.reject_reason.clone()),
        submission_count: manual.as_ref().map(|mp| mp.submission_count).unwrap_or(0),
        max_submissions,
    }
}

pub async fn get_payment_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ManualPaymentStatusView>>> {
    let booking = find_booking(&state, parse_id(&id)?).await?;
    let gig = find_gig(&state, booking.gig).await?;
    require_participant(&auth, &booking, &gig)?;

    Ok(Json(ApiResponse::success(status_view(
        booking,
        state.config.payment_rules.max_submissions,
    ))))
}
