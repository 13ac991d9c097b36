pub mod admin;
pub mod auth;
pub mod bookings;
pub mod gigs;
pub mod health;
pub mod manual_payments;
pub mod payments;
pub mod reviews;
pub mod users;
pub mod wallet;

use mongodb::bson::oid::ObjectId;

use crate::errors::{AppError, Result};

/// Parses a path or body id, mapping malformed input to a 400.
pub(crate) fn parse_id(raw: &str) -> Result<ObjectId> {
    ObjectId::parse_str(raw.trim()).map_err(|_| AppError::InvalidObjectId(raw.to_string()))
}
