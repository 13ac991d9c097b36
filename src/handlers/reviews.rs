use std::collections::{BTreeMap, HashSet};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    options::ReturnDocument,
    Collection,
};
use validator::Validate;

use super::bookings::{bookings, find_gig};
use super::parse_id;
use crate::dtos::{ApiResponse, ListResponse, Pagination};
use crate::errors::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::booking::BookingStatus;
use crate::models::review::{
    self, BatchReviewStatus, CreateReview, ReplyReview, Review, ReviewQuery, ReviewResponse,
    UpdateReview,
};
use crate::models::user::Role;
use crate::services::activity_service::{self, NewActivity};
use crate::services::rating_service;
use crate::state::AppState;

pub const MAX_BATCH: usize = 100;

fn reviews(state: &AppState) -> Collection<Review> {
    state.db.collection(review::COLLECTION)
}

async fn find_review(state: &AppState, id: &str) -> Result<Review> {
    reviews(state)
        .find_one(doc! { "_id": parse_id(id)? })
        .await?
        .ok_or(AppError::NotFound("Review"))
}

fn list_filter(query: &ReviewQuery) -> Result<Document> {
    let mut filter = Document::new();
    for (field, value) in [
        ("gig", &query.gig),
        ("teacher", &query.teacher),
        ("student", &query.student),
    ] {
        if let Some(raw) = value.as_deref().filter(|v| !v.is_empty()) {
            filter.insert(field, parse_id(raw)?);
        }
    }
    Ok(filter)
}

async fn list_page(
    state: &AppState,
    filter: Document,
    pagination: Pagination,
) -> Result<ListResponse<ReviewResponse>> {
    let collection = reviews(state);
    let items: Vec<Review> = collection
        .find(filter.clone())
        .sort(doc! { "createdAt": -1, "_id": -1 })
        .skip(pagination.skip())
        .limit(pagination.limit as i64)
        .await?
        .try_collect()
        .await?;
    let total = collection.count_documents(filter).await?;

    Ok(ListResponse::paged(
        items.into_iter().map(ReviewResponse::from).collect(),
        pagination,
        total,
    ))
}

pub async fn get_reviews(
    State(state): State<AppState>,
    Query(query): Query<ReviewQuery>,
) -> Result<Json<ListResponse<ReviewResponse>>> {
    let filter = list_filter(&query)?;
    let pagination = Pagination::new(query.page, query.limit);
    Ok(Json(list_page(&state, filter, pagination).await?))
}

pub async fn get_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ReviewResponse>>> {
    let review = find_review(&state, &id).await?;
    Ok(Json(ApiResponse::success(ReviewResponse::from(review))))
}

pub async fn get_gig_reviews(
    State(state): State<AppState>,
    Path(gig_id): Path<String>,
    Query(query): Query<ReviewQuery>,
) -> Result<Json<ListResponse<ReviewResponse>>> {
    let filter = doc! { "gig": parse_id(&gig_id)? };
    let pagination = Pagination::new(query.page, query.limit);
    Ok(Json(list_page(&state, filter, pagination).await?))
}

pub async fn get_my_gig_review(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(gig_id): Path<String>,
) -> Result<Json<ApiResponse<Option<ReviewResponse>>>> {
    let review = reviews(&state)
        .find_one(doc! { "gig": parse_id(&gig_id)?, "student": auth.id() })
        .await?;
    Ok(Json(ApiResponse::success(review.map(ReviewResponse::from))))
}

/// The completed booking a review attaches to: the named one, or the
/// student's most recent completed booking for the gig.
async fn completed_booking(
    state: &AppState,
    student: ObjectId,
    gig: ObjectId,
    booking_id: Option<&str>,
) -> Result<ObjectId> {
    let mut filter = doc! {
        "gig": gig,
        "student": student,
        "status": BookingStatus::Completed.as_str(),
    };
    if let Some(raw) = booking_id.filter(|b| !b.is_empty()) {
        filter.insert("_id", parse_id(raw)?);
    }

    bookings(state)
        .find_one(filter)
        .sort(doc! { "updatedAt": -1 })
        .await?
        .map(|booking| booking.id)
        .ok_or_else(|| {
            AppError::bad_request(
                "You can review only after the class is marked as completed for this gig",
            )
        })
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn already_reviewed(err: AppError) -> AppError {
    match err {
        AppError::DuplicateKey => AppError::conflict("You have already reviewed this gig"),
        other => other,
    }
}

pub async fn create_review(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(gig_id): Path<String>,
    Json(payload): Json<CreateReview>,
) -> Result<(StatusCode, Json<ApiResponse<ReviewResponse>>)> {
    auth.require_role(&[Role::Student])?;
    payload.validate()?;

    let gig = find_gig(&state, parse_id(&gig_id)?).await?;
    let booking =
        completed_booking(&state, auth.id(), gig.id, payload.booking_id.as_deref()).await?;

    let already = reviews(&state)
        .find_one(doc! { "gig": gig.id, "student": auth.id() })
        .await?;
    if already.is_some() {
        return Err(already_reviewed(AppError::DuplicateKey));
    }

    let now = Utc::now();
    let review = Review {
        id: ObjectId::new(),
        gig: gig.id,
        teacher: gig.teacher,
        student: auth.id(),
        booking,
        rating: payload.rating,
        title: trimmed(payload.title),
        comment: trimmed(payload.comment),
        teacher_reply: None,
        teacher_reply_at: None,
        created_at: now,
        updated_at: now,
    };

    reviews(&state)
        .insert_one(&review)
        .await
        .map_err(|e| already_reviewed(AppError::from(e)))?;

    rating_service::recompute_gig(&state.db, gig.id).await?;
    rating_service::apply_teacher_delta(&state.db, gig.teacher, f64::from(review.rating), 1)
        .await?;

    activity_service::record(
        &state.db,
        NewActivity::new("review.create")
            .by(auth.id())
            .target("review", review.id.to_hex())
            .metadata(doc! {
                "gigId": gig.id.to_hex(),
                "teacherId": gig.teacher.to_hex(),
                "rating": review.rating,
            })
            .request(&headers),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(ReviewResponse::from(review))),
    ))
}

fn update_set(payload: &UpdateReview) -> Document {
    let mut set = Document::new();
    if let Some(rating) = payload.rating {
        set.insert("rating", rating);
    }
    if let Some(title) = &payload.title {
        set.insert("title", title.trim());
    }
    if let Some(comment) = &payload.comment {
        set.insert("comment", comment.trim());
    }
    set
}

/// Rating change relative to the document the update actually replaced.
fn rating_delta(payload: &UpdateReview, before: &Review) -> i32 {
    payload.rating.map_or(0, |rating| rating - before.rating)
}

fn apply_update(mut review: Review, payload: &UpdateReview, at: DateTime<Utc>) -> Review {
    if let Some(rating) = payload.rating {
        review.rating = rating;
    }
    if let Some(title) = &payload.title {
        review.title = Some(title.trim().to_string());
    }
    if let Some(comment) = &payload.comment {
        review.comment = Some(comment.trim().to_string());
    }
    review.updated_at = at;
    review
}

pub async fn update_review(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateReview>,
) -> Result<Json<ApiResponse<ReviewResponse>>> {
    payload.validate()?;
    let current = find_review(&state, &id).await?;
    if current.student != auth.id() {
        return Err(AppError::forbidden("Not authorized to update this review"));
    }

    let mut set = update_set(&payload);
    let changed: Vec<String> = set.keys().cloned().collect();
    let now = Utc::now();
    set.insert("updatedAt", now);

    let before = reviews(&state)
        .find_one_and_update(
            doc! { "_id": current.id, "student": auth.id() },
            doc! { "$set": set },
        )
        .return_document(ReturnDocument::Before)
        .await?
        .ok_or(AppError::NotFound("Review"))?;
    let delta = rating_delta(&payload, &before);
    let updated = apply_update(before, &payload, now);

    rating_service::recompute_gig(&state.db, current.gig).await?;
    if delta != 0 {
        rating_service::apply_teacher_delta(&state.db, current.teacher, f64::from(delta), 0)
            .await?;
    }

    activity_service::record(
        &state.db,
        NewActivity::new("review.update")
            .by(auth.id())
            .target("review", current.id.to_hex())
            .metadata(doc! { "changed": changed, "delta": delta })
            .request(&headers),
    )
    .await;

    Ok(Json(ApiResponse::success(ReviewResponse::from(updated))))
}

pub async fn reply_review(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<ReplyReview>,
) -> Result<Json<ApiResponse<ReviewResponse>>> {
    auth.require_role(&[Role::Teacher])?;
    payload.validate()?;
    let reply = payload.reply.trim().to_string();
    if reply.is_empty() {
        return Err(AppError::invalid_data("Reply text is required"));
    }

    let current = find_review(&state, &id).await?;
    if current.teacher != auth.id() {
        return Err(AppError::forbidden(
            "You can only reply to reviews on your own gigs",
        ));
    }

    let now = Utc::now();
    let updated = reviews(&state)
        .find_one_and_update(
            doc! { "_id": current.id },
            doc! { "$set": { "teacherReply": &reply, "teacherReplyAt": now, "updatedAt": now } },
        )
        .return_document(ReturnDocument::After)
        .await?
        .ok_or(AppError::NotFound("Review"))?;

    activity_service::record(
        &state.db,
        NewActivity::new("review.reply")
            .by(auth.id())
            .target("review", current.id.to_hex())
            .metadata(doc! { "gigId": current.gig.to_hex() })
            .request(&headers),
    )
    .await;

    Ok(Json(ApiResponse::success(ReviewResponse::from(updated))))
}

pub async fn delete_review(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>> {
    let current = find_review(&state, &id).await?;
    if current.student != auth.id() && !auth.is_admin() {
        return Err(AppError::forbidden("Not authorized to delete this review"));
    }

    let deleted = reviews(&state)
        .delete_one(doc! { "_id": current.id })
        .await?;
    if deleted.deleted_count > 0 {
        rating_service::recompute_gig(&state.db, current.gig).await?;
        rating_service::apply_teacher_delta(
            &state.db,
            current.teacher,
            -f64::from(current.rating),
            -1,
        )
        .await?;
    }

    activity_service::record(
        &state.db,
        NewActivity::new("review.delete")
            .by(auth.id())
            .target("review", current.id.to_hex())
            .metadata(doc! { "gigId": current.gig.to_hex() })
            .request(&headers),
    )
    .await;

    Ok(Json(ApiResponse::success(serde_json::json!({}))))
}

/// Reviewed flag per gig id for the calling student. Requests past
/// the batch cap are truncated.
pub async fn batch_review_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<BatchReviewStatus>,
) -> Result<Json<ApiResponse<BTreeMap<String, bool>>>> {
    let mut gig_ids = payload.gig_ids;
    gig_ids.truncate(MAX_BATCH);
    if gig_ids.is_empty() {
        return Ok(Json(ApiResponse::success(BTreeMap::new())));
    }

    let ids: Vec<ObjectId> = gig_ids
        .iter()
        .filter_map(|raw| ObjectId::parse_str(raw.trim()).ok())
        .collect();

    let reviewed: HashSet<ObjectId> = reviews(&state)
        .find(doc! { "student": auth.id(), "gig": { "$in": ids } })
        .await?
        .try_collect::<Vec<Review>>()
        .await?
        .into_iter()
        .map(|r| r.gig)
        .collect();

    let result = gig_ids
        .into_iter()
        .map(|raw| {
            let done = ObjectId::parse_str(raw.trim())
                .map(|id| reviewed.contains(&id))
                .unwrap_or(false);
            (raw, done)
        })
        .collect();

    Ok(Json(ApiResponse::success(result)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(rating: i32) -> Review {
        let now = Utc::now();
        Review {
            id: ObjectId::new(),
            gig: ObjectId::new(),
            teacher: ObjectId::new(),
            student: ObjectId::new(),
            booking: ObjectId::new(),
            rating,
            title: None,
            comment: None,
            teacher_reply: None,
            teacher_reply_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn update_reports_rating_delta() {
        let current = review(4);
        let patch = UpdateReview {
            rating: Some(2),
            title: Some("  Solid class ".into()),
            comment: None,
        };
        let set = update_set(&patch);
        assert_eq!(rating_delta(&patch, &current), -2);
        assert_eq!(set.get_i32("rating").unwrap(), 2);
        assert_eq!(set.get_str("title").unwrap(), "Solid class");
        assert!(set.get("comment").is_none());
    }

    #[test]
    fn text_only_update_keeps_delta_zero() {
        let patch = UpdateReview {
            rating: None,
            title: None,
            comment: Some("Great".into()),
        };
        let set = update_set(&patch);
        assert_eq!(rating_delta(&patch, &review(5)), 0);
        assert!(set.get("rating").is_none());
    }

    #[test]
    fn interleaved_updates_sum_to_final_rating() {
        let first = UpdateReview {
            rating: Some(2),
            title: None,
            comment: None,
        };
        let second = UpdateReview {
            rating: Some(3),
            title: None,
            comment: None,
        };

        // Both requests read rating 5, but each delta is taken from the
        // document its own update replaced.
        let stale = review(5);
        let mut stored = review(5);
        let mut teacher_sum = 5;
        for patch in [&first, &second] {
            let before = stored.clone();
            teacher_sum += rating_delta(patch, &before);
            stored = apply_update(before, patch, Utc::now());
        }

        assert_eq!(stored.rating, 3);
        assert_eq!(teacher_sum, 3);
        assert_ne!(rating_delta(&second, &stale), rating_delta(&second, &review(2)));
    }

    #[test]
    fn apply_update_mirrors_the_stored_patch() {
        let at = Utc::now();
        let patch = UpdateReview {
            rating: Some(4),
            title: None,
            comment: Some("  Clear explanations ".into()),
        };
        let updated = apply_update(review(1), &patch, at);
        assert_eq!(updated.rating, 4);
        assert_eq!(updated.comment.as_deref(), Some("Clear explanations"));
        assert!(updated.title.is_none());
        assert_eq!(updated.updated_at, at);
    }

    #[test]
    fn duplicate_review_is_conflict() {
        let err = already_reviewed(AppError::DuplicateKey);
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "You have already reviewed this gig");

        let other = already_reviewed(AppError::NotFound("Gig"));
        assert_eq!(other.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn list_filter_rejects_malformed_ids() {
        let query = ReviewQuery {
            gig: Some("nope".into()),
            ..Default::default()
        };
        assert!(list_filter(&query).is_err());

        let query = ReviewQuery {
            teacher: Some(ObjectId::new().to_hex()),
            ..Default::default()
        };
        let filter = list_filter(&query).unwrap();
        assert!(filter.get_object_id("teacher").is_ok());
        assert!(filter.get("gig").is_none());
    }
}
