use chrono::{DateTime, Utc};
use mongodb::bson::{self, oid::ObjectId};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const COLLECTION: &str = "gigs";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Availability {
    #[serde(default)]
    pub days: Vec<String>,
    #[serde(default)]
    pub times: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gig {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub teacher: ObjectId,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    /// Minutes.
    pub duration: i32,
    #[serde(default)]
    pub average_rating: f64,
    #[serde(default)]
    pub reviews_count: i64,
    #[serde(default)]
    pub completed_bookings_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<Availability>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateGig {
    #[validate(length(min = 1, max = 100, message = "Title is required and must not exceed 100 characters"))]
    pub title: String,

    #[validate(length(min = 1, max = 500, message = "Description is required and must not exceed 500 characters"))]
    pub description: String,

    #[validate(range(exclusive_min = 0.0, max = 100000.0, message = "Price must be greater than 0 and at most 100000"))]
    pub price: f64,

    #[validate(length(min = 1, max = 50, message = "Category is required"))]
    pub category: String,

    #[validate(range(min = 15, max = 480, message = "Duration must be between 15 and 480 minutes"))]
    pub duration: i32,

    pub thumbnail_url: Option<String>,
    pub availability: Option<Availability>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGig {
    #[validate(length(min = 1, max = 100))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 500))]
    pub description: Option<String>,
    #[validate(range(exclusive_min = 0.0, max = 100000.0))]
    pub price: Option<f64>,
    #[validate(length(min = 1, max = 50))]
    pub category: Option<String>,
    #[validate(range(min = 15, max = 480))]
    pub duration: Option<i32>,
    pub thumbnail_url: Option<String>,
    pub availability: Option<Availability>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GigQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub teacher: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub sort: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GigResponse {
    pub id: String,
    pub teacher: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub category: String,
    pub duration: i32,
    pub average_rating: f64,
    pub reviews_count: i64,
    pub completed_bookings_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<Availability>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Gig> for GigResponse {
    fn from(gig: Gig) -> Self {
        GigResponse {
            id: gig.id.to_hex(),
            teacher: gig.teacher.to_hex(),
            title: gig.title,
            description: gig.description,
            price: gig.price,
            category: gig.category,
            duration: gig.duration,
            average_rating: gig.average_rating,
            reviews_count: gig.reviews_count,
            completed_bookings_count: gig.completed_bookings_count,
            thumbnail_url: gig.thumbnail_url,
            availability: gig.availability,
            created_at: gig.created_at,
            updated_at: gig.updated_at,
        }
    }
}
