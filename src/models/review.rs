use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::datetime;

pub const COLLECTION: &str = "reviews";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub gig: ObjectId,
    pub teacher: ObjectId,
    pub student: ObjectId,
    pub booking: ObjectId,
    pub rating: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_reply: Option<String>,
    #[serde(default, with = "datetime::optional", skip_serializing_if = "Option::is_none")]
    pub teacher_reply_at: Option<DateTime<Utc>>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReview {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,
    #[validate(length(max = 120))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
    /// Optional; the latest completed booking is used otherwise.
    pub booking_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateReview {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<i32>,
    #[validate(length(max = 120))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReplyReview {
    #[validate(length(min = 1, max = 1000, message = "Reply must be between 1 and 1000 characters"))]
    pub reply: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReviewStatus {
    pub gig_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewQuery {
    pub gig: Option<String>,
    pub teacher: Option<String>,
    pub student: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub id: String,
    pub gig: String,
    pub teacher: String,
    pub student: String,
    pub booking: String,
    pub rating: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher_reply: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher_reply_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Review> for ReviewResponse {
    fn from(review: Review) -> Self {
        ReviewResponse {
            id: review.id.to_hex(),
            gig: review.gig.to_hex(),
            teacher: review.teacher.to_hex(),
            student: review.student.to_hex(),
            booking: review.booking.to_hex(),
            rating: review.rating,
            title: review.title,
            comment: review.comment,
            teacher_reply: review.teacher_reply,
            teacher_reply_at: review.teacher_reply_at,
            created_at: review.created_at,
            updated_at: review.updated_at,
        }
    }
}
