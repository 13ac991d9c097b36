use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use chrono::{DateTime, Duration, Utc};
use futures_util::TryStreamExt;
use mongodb::{
    bson::{self, doc, oid::ObjectId, Document},
    options::ReturnDocument,
    Collection,
};
use serde::Serialize;
use validator::Validate;

use super::gigs::gigs;
use super::parse_id;
use crate::dtos::{ApiResponse, ListResponse, Pagination};
use crate::errors::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::booking::{
    self, Booking, BookingQuery, BookingResponse, BookingStatus, CreateBooking, ManualPayment,
    ManualPaymentStatus, PaymentMethodType, UpdateBookingStatus,
};
use crate::models::gig::Gig;
use crate::models::payment::{self, Payment, PaymentStatus};
use crate::models::user::{self, Role, User};
use crate::services::activity_service::{self, NewActivity};
use crate::services::booking_rules::{
    self, Participant, DEFAULT_DURATION_MINUTES, JOIN_CLOSES_AFTER_END_MINUTES,
    JOIN_OPENS_BEFORE_MINUTES,
};
use crate::services::manual_payment_rules;
use crate::state::AppState;

pub(crate) fn bookings(state: &AppState) -> Collection<Booking> {
    state.db.collection(booking::COLLECTION)
}

pub(crate) async fn find_booking(state: &AppState, id: ObjectId) -> Result<Booking> {
    bookings(state)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or(AppError::NotFound("Booking"))
}

pub(crate) async fn find_gig(state: &AppState, id: ObjectId) -> Result<Gig> {
    gigs(state)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or(AppError::NotFound("Gig"))
}

/// The caller's side of a booking, if any.
pub(crate) fn participant(auth: &AuthUser, booking: &Booking, gig: &Gig) -> Option<Participant> {
    if booking.student == auth.id() {
        Some(Participant::Student)
    } else if gig.teacher == auth.id() {
        Some(Participant::Teacher)
    } else {
        None
    }
}

pub(crate) fn require_participant(
    auth: &AuthUser,
    booking: &Booking,
    gig: &Gig,
) -> Result<Participant> {
    participant(auth, booking, gig)
        .ok_or_else(|| AppError::forbidden("Not authorized to access this booking"))
}

/// A SUCCESS gateway payment tied to this booking, or an unlinked one for the
/// same gig by the same student.
pub(crate) async fn has_successful_payment(state: &AppState, booking: &Booking) -> Result<bool> {
    let filter = doc! {
        "status": PaymentStatus::Success.as_str(),
        "$or": [
            { "bookingId": booking.id },
            {
                "gigId": booking.gig,
                "studentId": booking.student,
                "bookingId": { "$exists": false },
            },
        ],
    };
    let found = state
        .db
        .collection::<Payment>(payment::COLLECTION)
        .find_one(filter)
        .await?;
    Ok(found.is_some())
}

pub async fn get_bookings(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<BookingQuery>,
) -> Result<Json<ListResponse<BookingResponse>>> {
    let mut filter = match auth.role() {
        Role::Student => doc! { "student": auth.id() },
        Role::Teacher => {
            let gig_ids = gigs(&state)
                .distinct("_id", doc! { "teacher": auth.id() })
                .await?;
            doc! { "gig": { "$in": gig_ids } }
        }
        Role::Admin => Document::new(),
    };
    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }

    let pagination = Pagination::new(query.page, query.limit);
    let collection = bookings(&state);
    let items: Vec<Booking> = collection
        .find(filter.clone())
        .sort(doc! { "scheduledAt": -1, "_id": -1 })
        .skip(pagination.skip())
        .limit(pagination.limit as i64)
        .await?
        .try_collect()
        .await?;
    let total = collection.count_documents(filter).await?;

    Ok(Json(ListResponse::paged(
        items.into_iter().map(BookingResponse::from).collect(),
        pagination,
        total,
    )))
}

pub async fn get_booking(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<BookingResponse>>> {
    let booking = find_booking(&state, parse_id(&id)?).await?;
    if !auth.is_admin() {
        let gig = find_gig(&state, booking.gig).await?;
        require_participant(&auth, &booking, &gig)?;
    }
    Ok(Json(ApiResponse::success(BookingResponse::from(booking))))
}

pub async fn create_booking(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<CreateBooking>,
) -> Result<(StatusCode, Json<ApiResponse<BookingResponse>>)> {
    auth.require_role(&[Role::Student])?;
    payload.validate()?;

    let gig = find_gig(&state, parse_id(&payload.gig_id)?).await?;
    let scheduled_at = booking_rules::resolve_scheduled_at(
        payload.scheduled_at.as_deref(),
        payload.scheduled_date.as_deref(),
        payload.scheduled_time.as_deref(),
    )?;

    let now = Utc::now();
    let booking = Booking {
        id: ObjectId::new(),
        student: auth.id(),
        gig: gig.id,
        status: BookingStatus::Pending,
        scheduled_at,
        time_zone: payload.time_zone.map(|tz| tz.trim().to_string()).filter(|tz| !tz.is_empty()),
        message: payload.message.map(|m| m.trim().to_string()).filter(|m| !m.is_empty()),
        meeting_room_id: None,
        meeting_link: None,
        attended: false,
        attended_at: None,
        payment_method: payload.payment_method.unwrap_or_default(),
        manual_payment: None,
        payment_ref_code: booking_rules::payment_ref_code(),
        payment_audit_log: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    bookings(&state).insert_one(&booking).await?;

    tracing::info!(booking = %booking.id, gig = %gig.id, student = %auth.id(), "booking created");
    activity_service::record(
        &state.db,
        NewActivity::new("booking.create")
            .by(auth.id())
            .target("booking", booking.id.to_hex())
            .metadata(doc! {
                "gigId": gig.id.to_hex(),
                "scheduledAt": booking.scheduled_at,
                "paymentMethod": bson::to_bson(&booking.payment_method)?,
            })
            .request(&headers),
    )
    .await;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(BookingResponse::from(booking)))))
}

/// `$set`/`$push` for a status change. Acceptance also fills in the meeting
/// room (once) and opens the manual payment window for manual bookings.
fn transition_update(
    booking: &Booking,
    gig: &Gig,
    to: BookingStatus,
    meeting_base_url: &str,
    actor: ObjectId,
    now: DateTime<Utc>,
) -> Result<Document> {
    let mut set = doc! { "status": to.as_str(), "updatedAt": now };
    let mut update = Document::new();

    if to == BookingStatus::Accepted {
        if booking.meeting_link.is_none() {
            let room_id = booking_rules::meeting_room_id(&gig.title);
            set.insert("meetingLink", booking_rules::meeting_link(meeting_base_url, &room_id));
            set.insert("meetingRoomId", room_id);
        }
        if booking.payment_method == PaymentMethodType::Manual && booking.manual_payment.is_none() {
            set.insert(
                "manualPayment",
                bson::to_bson(&ManualPayment::awaiting_proof(gig.price, now))?,
            );
            let entry = manual_payment_rules::audit_entry(
                "payment.window_opened",
                None,
                ManualPaymentStatus::PendingManual,
                Some(actor),
                None,
                now,
            );
            update.insert("$push", doc! { "paymentAuditLog": bson::to_bson(&entry)? });
        }
    }

    update.insert("$set", set);
    Ok(update)
}

pub async fn update_booking_status(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateBookingStatus>,
) -> Result<Json<ApiResponse<BookingResponse>>> {
    auth.require_role(&[Role::Teacher])?;

    let booking = find_booking(&state, parse_id(&id)?).await?;
    let gig = find_gig(&state, booking.gig).await?;
    if gig.teacher != auth.id() {
        return Err(AppError::forbidden("Not authorized to update this booking"));
    }

    let from = booking.status;
    let to = payload.status;
    booking_rules::check_transition(from, to)?;

    let update = transition_update(
        &booking,
        &gig,
        to,
        &state.config.meeting_base_url,
        auth.id(),
        Utc::now(),
    )?;

    // Conditional on the status we validated against.
    let updated = bookings(&state)
        .find_one_and_update(doc! { "_id": booking.id, "status": from.as_str() }, update)
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::conflict("Booking status was changed by another request"))?;

    if to == BookingStatus::Completed {
        gigs(&state)
            .update_one(
                doc! { "_id": gig.id },
                doc! { "$inc": { "completedBookingsCount": 1_i64 } },
            )
            .await?;
    }

    tracing::info!(
        booking = %updated.id,
        from = from.as_str(),
        to = to.as_str(),
        "booking status changed"
    );
    activity_service::record(
        &state.db,
        NewActivity::new("booking.status")
            .by(auth.id())
            .target("booking", updated.id.to_hex())
            .metadata(doc! { "from": from.as_str(), "to": to.as_str() })
            .request(&headers),
    )
    .await;

    Ok(Json(ApiResponse::success(BookingResponse::from(updated))))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTeacher {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGig {
    pub id: String,
    pub title: String,
    pub duration: i32,
    pub teacher: JoinTeacher,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinWindow {
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub booking_id: String,
    pub meeting_room_id: String,
    pub meeting_link: String,
    pub role_for_this_booking: &'static str,
    pub scheduled_at: DateTime<Utc>,
    pub gig: JoinGig,
    pub window: JoinWindow,
}

fn window_bounds(scheduled_at: DateTime<Utc>, duration: i32) -> JoinWindow {
    let duration = if duration > 0 {
        i64::from(duration)
    } else {
        DEFAULT_DURATION_MINUTES
    };
    JoinWindow {
        opens_at: scheduled_at - Duration::minutes(JOIN_OPENS_BEFORE_MINUTES),
        closes_at: scheduled_at + Duration::minutes(duration + JOIN_CLOSES_AFTER_END_MINUTES),
    }
}

/// Applies the join gate for the caller and builds the meeting details.
async fn admit(state: &AppState, auth: &AuthUser, booking: Booking) -> Result<JoinResponse> {
    let gig = find_gig(state, booking.gig).await?;
    let who = require_participant(auth, &booking, &gig)?;

    let payment_cleared = match who {
        Participant::Teacher => true,
        Participant::Student => {
            manual_payment_rules::is_verified(booking.manual_payment.as_ref())
                || has_successful_payment(state, &booking).await?
        }
    };
    let window = booking_rules::join_window(
        Utc::now(),
        booking.scheduled_at,
        Some(i64::from(gig.duration)),
    );

    if let Err(denied) = booking_rules::check_join(who, booking.status, payment_cleared, window) {
        tracing::debug!(booking = %booking.id, role = who.as_str(), ?denied, "join denied");
        return Err(denied.into());
    }
    let (Some(room_id), Some(link)) = (booking.meeting_room_id.clone(), booking.meeting_link.clone())
    else {
        return Err(AppError::conflict("Meeting room has not been created for this booking"));
    };

    let teacher_name = state
        .db
        .collection::<User>(user::COLLECTION)
        .find_one(doc! { "_id": gig.teacher })
        .await?
        .map(|t| t.name)
        .unwrap_or_default();

    Ok(JoinResponse {
        booking_id: booking.id.to_hex(),
        meeting_room_id: room_id,
        meeting_link: link,
        role_for_this_booking: who.as_str(),
        scheduled_at: booking.scheduled_at,
        window: window_bounds(booking.scheduled_at, gig.duration),
        gig: JoinGig {
            id: gig.id.to_hex(),
            title: gig.title,
            duration: gig.duration,
            teacher: JoinTeacher {
                id: gig.teacher.to_hex(),
                name: teacher_name,
            },
        },
    })
}

pub async fn join_booking(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<JoinResponse>>> {
    let booking = find_booking(&state, parse_id(&id)?).await?;
    Ok(Json(ApiResponse::success(admit(&state, &auth, booking).await?)))
}

pub async fn get_booking_by_room(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(room_id): Path<String>,
) -> Result<Json<ApiResponse<JoinResponse>>> {
    let booking = bookings(&state)
        .find_one(doc! { "meetingRoomId": room_id.trim() })
        .await?
        .ok_or(AppError::NotFound("Booking"))?;
    Ok(Json(ApiResponse::success(admit(&state, &auth, booking).await?)))
}

pub async fn mark_attendance(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<BookingResponse>>> {
    let booking = find_booking(&state, parse_id(&id)?).await?;
    if booking.student != auth.id() {
        return Err(AppError::forbidden("Only the booking student can mark attendance"));
    }

    let now = Utc::now();
    if !booking_rules::can_mark_attendance(booking.status, now, booking.scheduled_at) {
        return Err(AppError::bad_request(
            "Attendance can only be marked for an accepted class once it is about to start",
        ));
    }
    if booking.attended {
        return Ok(Json(ApiResponse::success(BookingResponse::from(booking))));
    }

    let updated = bookings(&state)
        .find_one_and_update(
            doc! { "_id": booking.id },
            doc! { "$set": { "attended": true, "attendedAt": now, "updatedAt": now } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or(AppError::NotFound("Booking"))?;

    activity_service::record(
        &state.db,
        NewActivity::new("booking.attendance")
            .by(auth.id())
            .target("booking", updated.id.to_hex())
            .request(&headers),
    )
    .await;

    Ok(Json(ApiResponse::success(BookingResponse::from(updated))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(method: PaymentMethodType) -> (Booking, Gig) {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let gig = Gig {
            id: ObjectId::new(),
            teacher: ObjectId::new(),
            title: "Intro to Calculus".into(),
            description: "Limits".into(),
            price: 800.0,
            category: "math".into(),
            duration: 60,
            average_rating: 0.0,
            reviews_count: 0,
            completed_bookings_count: 0,
            thumbnail_url: None,
            availability: None,
            created_at: now,
            updated_at: now,
        };
        let booking = Booking {
            id: ObjectId::new(),
            student: ObjectId::new(),
            gig: gig.id,
            status: BookingStatus::Pending,
            scheduled_at: now,
            time_zone: None,
            message: None,
            meeting_room_id: None,
            meeting_link: None,
            attended: false,
            attended_at: None,
            payment_method: method,
            manual_payment: None,
            payment_ref_code: "TC-BOOK-00000000".into(),
            payment_audit_log: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        (booking, gig)
    }

    #[test]
    fn accepting_a_manual_booking_opens_the_payment_window() {
        let (booking, gig) = sample(PaymentMethodType::Manual);
        let update = transition_update(
            &booking,
            &gig,
            BookingStatus::Accepted,
            "https://meet.jit.si/",
            gig.teacher,
            Utc::now(),
        )
        .unwrap();

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("status").unwrap(), "accepted");
        let room = set.get_str("meetingRoomId").unwrap();
        assert!(room.starts_with("tutorconnected-intro-to-calculus-"));
        assert_eq!(
            set.get_str("meetingLink").unwrap(),
            format!("https://meet.jit.si/{}", room)
        );
        let manual = set.get_document("manualPayment").unwrap();
        assert_eq!(manual.get_str("status").unwrap(), "pending_manual");
        assert_eq!(manual.get_f64("amountExpected").unwrap(), 800.0);
        assert!(update.contains_key("$push"));
    }

    #[test]
    fn existing_meeting_link_is_kept() {
        let (mut booking, gig) = sample(PaymentMethodType::Gateway);
        booking.meeting_link = Some("https://meet.jit.si/existing".into());
        let update = transition_update(
            &booking,
            &gig,
            BookingStatus::Accepted,
            "https://meet.jit.si",
            gig.teacher,
            Utc::now(),
        )
        .unwrap();
        let set = update.get_document("$set").unwrap();
        assert!(!set.contains_key("meetingLink"));
        assert!(!set.contains_key("manualPayment"));
        assert!(!update.contains_key("$push"));
    }

    #[test]
    fn window_bounds_default_duration() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let w = window_bounds(start, 0);
        assert_eq!(w.opens_at, start - Duration::minutes(15));
        assert_eq!(w.closes_at, start + Duration::minutes(150));
    }
}
