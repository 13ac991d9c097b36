use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, Document},
    options::ReturnDocument,
    Database,
};

use crate::errors::Result;
use crate::models::{gig, review, user};
use crate::services::wallet_service::round2;

/// Mean rating rounded to two decimals; zero when there is nothing to average.
pub fn average(sum: f64, count: i64) -> f64 {
    if count <= 0 {
        0.0
    } else {
        round2(sum / count as f64)
    }
}

/// Recomputes `averageRating` and `reviewsCount` for one gig from its reviews.
pub async fn recompute_gig(db: &Database, gig_id: ObjectId) -> Result<()> {
    let pipeline = vec![
        doc! { "$match": { "gig": gig_id } },
        doc! { "$group": {
            "_id": "$gig",
            "avg": { "$avg": "$rating" },
            "count": { "$sum": 1 },
        }},
    ];
    let rows: Vec<Document> = db
        .collection::<Document>(review::COLLECTION)
        .aggregate(pipeline)
        .await?
        .try_collect()
        .await?;

    let (avg, count) = rows
        .first()
        .map(|row| {
            let avg = match row.get("avg") {
                Some(Bson::Double(v)) => *v,
                _ => 0.0,
            };
            let count = match row.get("count") {
                Some(Bson::Int32(v)) => *v as i64,
                Some(Bson::Int64(v)) => *v,
                _ => 0,
            };
            (avg, count)
        })
        .unwrap_or((0.0, 0));

    db.collection::<Document>(gig::COLLECTION)
        .update_one(
            doc! { "_id": gig_id },
            doc! { "$set": {
                "averageRating": round2(avg),
                "reviewsCount": count,
                "updatedAt": Utc::now(),
            }},
        )
        .await?;
    Ok(())
}

/// Applies a rating change to the teacher's running totals.
/// `count_delta` is +1 on create, 0 on edit and -1 on delete.
pub async fn apply_teacher_delta(
    db: &Database,
    teacher: ObjectId,
    sum_delta: f64,
    count_delta: i64,
) -> Result<()> {
    let users = db.collection::<Document>(user::COLLECTION);

    let updated = users
        .find_one_and_update(
            doc! { "_id": teacher },
            doc! { "$inc": {
                "teacherRatingSum": sum_delta,
                "teacherReviewsCount": count_delta,
            }},
        )
        .return_document(ReturnDocument::After)
        .await?;

    let Some(updated) = updated else {
        tracing::warn!(teacher = %teacher, "rating update for missing teacher");
        return Ok(());
    };

    let sum = match updated.get("teacherRatingSum") {
        Some(Bson::Double(v)) => *v,
        Some(Bson::Int32(v)) => *v as f64,
        Some(Bson::Int64(v)) => *v as f64,
        _ => 0.0,
    };
    let count = match updated.get("teacherReviewsCount") {
        Some(Bson::Int32(v)) => *v as i64,
        Some(Bson::Int64(v)) => *v,
        _ => 0,
    };

    let set = if count <= 0 {
        doc! { "teacherRatingSum": 0.0, "teacherReviewsCount": 0_i64, "teacherRatingAverage": 0.0 }
    } else {
        doc! { "teacherRatingAverage": average(sum, count) }
    };
    users
        .update_one(doc! { "_id": teacher }, doc! { "$set": set })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_rounds_to_two_decimals() {
        assert_eq!(average(14.0, 3), 4.67);
        assert_eq!(average(10.0, 2), 5.0);
    }

    #[test]
    fn empty_average_is_zero() {
        assert_eq!(average(0.0, 0), 0.0);
        assert_eq!(average(4.0, -1), 0.0);
    }
}
