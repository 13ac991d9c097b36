use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use axum::{
    extract::{FromRequest, Path, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    response::{Json, Redirect},
    Form,
};
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId},
    Collection,
};
use reqwest::Url;
use uuid::Uuid;

use super::bookings::{bookings, find_booking, find_gig, require_participant};
use super::parse_id;
use crate::dtos::ApiResponse;
use crate::errors::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::booking::Booking;
use crate::models::gig::{self, Gig};
use crate::models::payment::{
    self, BatchBookingStatus, GatewayCallback, InitPayment, InitPaymentResponse, PaidResponse,
    Payment, PaymentStatus, StatusChange,
};
use crate::services::activity_service::{self, NewActivity};
use crate::services::payment_service::{self, Settlement};
use crate::services::sslcommerz_service::CheckoutRequest;
use crate::state::AppState;

pub const MAX_BATCH: usize = 100;

fn payments(state: &AppState) -> Collection<Payment> {
    state.db.collection(payment::COLLECTION)
}

/// Gateway callback body. SSLCommerz posts forms; some integrations post JSON.
/// Anything else is read as an empty callback.
#[derive(Debug, Default)]
pub struct CallbackBody(pub GatewayCallback);

#[async_trait]
impl<S> FromRequest<S> for CallbackBody
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("application/json") {
            let Json(body) = Json::<GatewayCallback>::from_request(req, state)
                .await
                .map_err(|e| AppError::bad_request(e.body_text()))?;
            Ok(CallbackBody(body))
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(body) = Form::<GatewayCallback>::from_request(req, state)
                .await
                .map_err(|e| AppError::bad_request(e.body_text()))?;
            Ok(CallbackBody(body))
        } else {
            Ok(CallbackBody::default())
        }
    }
}

pub async fn init_payment(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<InitPayment>,
) -> Result<Json<InitPaymentResponse>> {
    let gateway = state
        .gateway
        .clone()
        .ok_or_else(|| AppError::ServiceUnavailable("Payment gateway is not configured".into()))?;

    let gig = find_gig(&state, parse_id(&payload.gig_id)?).await?;
    if !(gig.price.is_finite() && gig.price > 0.0) {
        return Err(AppError::bad_request("Invalid gig price for payment"));
    }

    let booking_id = match payload.booking_id.as_deref().filter(|b| !b.is_empty()) {
        Some(raw) => {
            let booking = find_booking(&state, parse_id(raw)?).await?;
            if booking.student != auth.id() || booking.gig != gig.id {
                return Err(AppError::forbidden("Booking does not belong to this student and gig"));
            }
            Some(booking.id)
        }
        None => None,
    };

    let now = Utc::now();
    let tran_id = Uuid::new_v4().to_string();
    let payment = Payment {
        id: ObjectId::new(),
        gig_id: gig.id,
        student_id: auth.id(),
        teacher_id: gig.teacher,
        booking_id,
        amount: gig.price,
        status: PaymentStatus::Pending,
        transaction_id: tran_id.clone(),
        status_history: vec![StatusChange {
            status: PaymentStatus::Pending,
            at: now,
        }],
        created_at: now,
        updated_at: now,
    };
    payments(&state).insert_one(&payment).await?;

    let checkout = CheckoutRequest {
        tran_id: &tran_id,
        amount: gig.price,
        product_name: &gig.title,
        customer_name: &auth.0.name,
        customer_email: &auth.0.email,
        customer_phone: auth.0.phone.as_deref(),
    };
    let url = match gateway.create_session(&checkout).await {
        Ok(url) => url,
        Err(e) => {
            payment_service::settle(&state, &tran_id, PaymentStatus::Failed).await?;
            return Err(e);
        }
    };

    activity_service::record(
        &state.db,
        NewActivity::new("payment.init")
            .by(auth.id())
            .target("gig", gig.id.to_hex())
            .metadata(doc! {
                "tranId": &tran_id,
                "bookingId": booking_id.map(|id| id.to_hex()),
                "amount": gig.price,
            })
            .request(&headers),
    )
    .await;

    Ok(Json(InitPaymentResponse {
        success: true,
        url,
        tran_id,
    }))
}

fn frontend_redirect(state: &AppState, page: &str, tran_id: Option<&str>) -> Result<Redirect> {
    let base = format!("{}/{}", state.config.frontend_url.trim_end_matches('/'), page);
    let url = match tran_id {
        Some(tran_id) => Url::parse_with_params(&base, &[("tran_id", tran_id)]),
        None => Url::parse(&base),
    }
    .map_err(|e| AppError::configuration(format!("Invalid FRONTEND_URL: {}", e)))?;
    Ok(Redirect::to(url.as_str()))
}

async fn log_callback(state: &AppState, headers: &HeaderMap, action: &str, tran_id: &str, settlement: Settlement) {
    let outcome = match settlement {
        Settlement::Applied(status) | Settlement::Unchanged(status) => status.as_str(),
        Settlement::Unknown => "UNKNOWN",
    };
    activity_service::record(
        &state.db,
        NewActivity::new(action)
            .target("payment", tran_id)
            .metadata(doc! { "tranId": tran_id, "status": outcome })
            .request(headers),
    )
    .await;
}

pub async fn payment_success(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tran_id): Path<String>,
    CallbackBody(callback): CallbackBody,
) -> Result<Redirect> {
    let val_id = callback.val_id.as_deref().filter(|v| !v.is_empty());

    let settlement = match (state.gateway.as_ref(), val_id) {
        (Some(gateway), Some(val_id)) => {
            let outcome = gateway
                .resolve(&tran_id, callback.status.as_deref(), Some(val_id))
                .await;
            payment_service::settle(&state, &tran_id, outcome).await?
        }
        _ => {
            tracing::warn!(target: "payment", tran_id = %tran_id, "success callback without a validatable val_id");
            Settlement::Unchanged(PaymentStatus::Pending)
        }
    };
    log_callback(&state, &headers, "payment.success", &tran_id, settlement).await;

    match settlement {
        Settlement::Applied(PaymentStatus::Success) | Settlement::Unchanged(PaymentStatus::Success) => {
            frontend_redirect(&state, "payment-success", Some(&tran_id))
        }
        _ => frontend_redirect(&state, "payment-failed", None),
    }
}

pub async fn payment_fail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tran_id): Path<String>,
) -> Result<Redirect> {
    let settlement = payment_service::settle(&state, &tran_id, PaymentStatus::Failed).await?;
    log_callback(&state, &headers, "payment.fail", &tran_id, settlement).await;
    frontend_redirect(&state, "payment-failed", None)
}

pub async fn payment_cancel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(tran_id): Path<String>,
) -> Result<Redirect> {
    let settlement = payment_service::settle(&state, &tran_id, PaymentStatus::Failed).await?;
    log_callback(&state, &headers, "payment.cancel", &tran_id, settlement).await;
    frontend_redirect(&state, "payment-failed", None)
}

pub async fn payment_ipn(
    State(state): State<AppState>,
    headers: HeaderMap,
    CallbackBody(callback): CallbackBody,
) -> Result<Json<serde_json::Value>> {
    let tran_id = callback
        .tran_id
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::bad_request("Missing tran_id"))?
        .to_string();

    let outcome = match state.gateway.as_ref() {
        Some(gateway) => {
            gateway
                .resolve(&tran_id, callback.status.as_deref(), callback.val_id.as_deref())
                .await
        }
        None => {
            tracing::warn!(target: "payment", tran_id = %tran_id, "IPN received while gateway is disabled");
            PaymentStatus::Failed
        }
    };

    let settlement = payment_service::settle(&state, &tran_id, outcome).await?;
    tracing::info!(target: "payment", tran_id = %tran_id, status = outcome.as_str(), "ipn");
    log_callback(&state, &headers, "payment.ipn", &tran_id, settlement).await;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "IPN received",
        "status": outcome.as_str(),
    })))
}

pub async fn get_gig_payment_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(gig_id): Path<String>,
) -> Result<Json<PaidResponse>> {
    let gig_id = parse_id(&gig_id)?;
    let paid = payments(&state)
        .find_one(doc! {
            "gigId": gig_id,
            "studentId": auth.id(),
            "status": PaymentStatus::Success.as_str(),
        })
        .await?
        .is_some();
    Ok(Json(PaidResponse { success: true, paid }))
}

pub async fn get_booking_payment_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(booking_id): Path<String>,
) -> Result<Json<PaidResponse>> {
    let booking = find_booking(&state, parse_id(&booking_id)?).await?;
    let gig = find_gig(&state, booking.gig).await?;
    require_participant(&auth, &booking, &gig)?;

    let paid = payments(&state)
        .find_one(doc! {
            "bookingId": booking.id,
            "studentId": booking.student,
            "status": PaymentStatus::Success.as_str(),
        })
        .await?
        .is_some();
    Ok(Json(PaidResponse { success: true, paid }))
}

/// Paid flag per requested booking id. Unknown, malformed and foreign
/// bookings report `false`.
pub async fn batch_booking_payment_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<BatchBookingStatus>,
) -> Result<Json<ApiResponse<BTreeMap<String, bool>>>> {
    if payload.booking_ids.is_empty() {
        return Err(AppError::invalid_data("bookingIds array is required"));
    }
    if payload.booking_ids.len() > MAX_BATCH {
        return Err(AppError::invalid_data(format!(
            "Maximum {} bookingIds per request",
            MAX_BATCH
        )));
    }

    let ids: Vec<ObjectId> = payload
        .booking_ids
        .iter()
        .filter_map(|raw| ObjectId::parse_str(raw.trim()).ok())
        .collect();

    let found: Vec<Booking> = bookings(&state)
        .find(doc! { "_id": { "$in": ids.clone() } })
        .await?
        .try_collect()
        .await?;

    let gig_ids: Vec<ObjectId> = found.iter().map(|b| b.gig).collect();
    let teachers: BTreeMap<ObjectId, ObjectId> = state
        .db
        .collection::<Gig>(gig::COLLECTION)
        .find(doc! { "_id": { "$in": gig_ids } })
        .await?
        .try_collect::<Vec<Gig>>()
        .await?
        .into_iter()
        .map(|g| (g.id, g.teacher))
        .collect();

    let accessible: Vec<ObjectId> = found
        .iter()
        .filter(|b| b.student == auth.id() || teachers.get(&b.gig) == Some(&auth.id()))
        .map(|b| b.id)
        .collect();

    let paid: HashSet<ObjectId> = payments(&state)
        .find(doc! {
            "bookingId": { "$in": accessible.clone() },
            "status": PaymentStatus::Success.as_str(),
        })
        .await?
        .try_collect::<Vec<Payment>>()
        .await?
        .into_iter()
        .filter_map(|p| p.booking_id)
        .collect();

    let result = payload
        .booking_ids
        .into_iter()
        .map(|raw| {
            let is_paid = ObjectId::parse_str(raw.trim())
                .map(|id| accessible.contains(&id) && paid.contains(&id))
                .unwrap_or(false);
            (raw, is_paid)
        })
        .collect();

    Ok(Json(ApiResponse::success(result)))
}
