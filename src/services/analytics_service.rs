//! Class analytics for the admin dashboard.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, Document},
    Database,
};
use serde::Serialize;

use crate::errors::Result;
use crate::models::booking::{self, BookingStatus};
use crate::models::payment::{self, PaymentStatus};
use crate::services::wallet_service::round2;

pub const DEFAULT_RANGE_DAYS: i64 = 30;
const TOP_TEACHERS: i64 = 5;

#[derive(Debug, Clone)]
pub struct AnalyticsFilter {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub teacher: Option<ObjectId>,
    pub status: Option<BookingStatus>,
}

impl AnalyticsFilter {
    /// Missing bounds default to the last 30 days ending now.
    pub fn new(
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        teacher: Option<ObjectId>,
        status: Option<BookingStatus>,
    ) -> Self {
        let to = to.unwrap_or_else(Utc::now);
        let from = from.unwrap_or(to - Duration::days(DEFAULT_RANGE_DAYS));
        AnalyticsFilter {
            from,
            to,
            teacher,
            status,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: i64,
    pub pending: i64,
    pub accepted: i64,
    pub rejected: i64,
    pub completed: i64,
    pub attended: i64,
    pub conversion_rate: f64,
    pub attendance_rate: f64,
}

impl Summary {
    pub fn with_rates(mut self) -> Self {
        let base = self.pending + self.accepted + self.rejected;
        self.conversion_rate = percent(self.accepted, base);
        self.attendance_rate = percent(self.attended, self.completed);
        self
    }
}

fn percent(part: i64, whole: i64) -> f64 {
    if whole > 0 {
        round2(part as f64 / whole as f64 * 100.0)
    } else {
        0.0
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct DayPoint {
    pub date: String,
    pub pending: i64,
    pub accepted: i64,
    pub rejected: i64,
    pub completed: i64,
    pub total: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopTeacher {
    pub teacher_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub bookings: i64,
    pub completed: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct Revenue {
    pub count: i64,
    pub amount: f64,
}

#[derive(Debug, Serialize)]
pub struct Range {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAnalytics {
    pub summary: Summary,
    pub revenue: Revenue,
    pub timeseries: Vec<DayPoint>,
    pub top_teachers: Vec<TopTeacher>,
    pub range: Range,
}

fn int(row: &Document, key: &str) -> i64 {
    match row.get(key) {
        Some(Bson::Int32(v)) => *v as i64,
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Double(v)) => *v as i64,
        _ => 0,
    }
}

fn float(row: &Document, key: &str) -> f64 {
    match row.get(key) {
        Some(Bson::Double(v)) => *v,
        Some(Bson::Int32(v)) => *v as f64,
        Some(Bson::Int64(v)) => *v as f64,
        _ => 0.0,
    }
}

/// One point per UTC day in `[from, to)`, zero-filled where nothing happened.
pub fn fill_days(
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    counts: &BTreeMap<(String, String), i64>,
) -> Vec<DayPoint> {
    let mut out = Vec::new();
    let mut cursor = from;
    while cursor < to {
        let date = cursor.format("%Y-%m-%d").to_string();
        let get = |status: BookingStatus| {
            counts
                .get(&(date.clone(), status.as_str().to_string()))
                .copied()
                .unwrap_or(0)
        };
        let mut point = DayPoint {
            pending: get(BookingStatus::Pending),
            accepted: get(BookingStatus::Accepted),
            rejected: get(BookingStatus::Rejected),
            completed: get(BookingStatus::Completed),
            date,
            total: 0,
        };
        point.total = point.pending + point.accepted + point.rejected + point.completed;
        out.push(point);
        cursor += Duration::days(1);
    }
    out
}

fn booking_stages(filter: &AnalyticsFilter, always_join_gig: bool) -> Vec<Document> {
    let mut stages = Vec::new();
    if filter.teacher.is_some() || always_join_gig {
        stages.push(doc! { "$lookup": {
            "from": "gigs",
            "localField": "gig",
            "foreignField": "_id",
            "as": "gigDoc",
        }});
        stages.push(doc! { "$unwind": "$gigDoc" });
    }

    let mut matcher = doc! {
        "scheduledAt": { "$gte": filter.from, "$lt": filter.to },
    };
    if let Some(status) = filter.status {
        matcher.insert("status", status.as_str());
    }
    if let Some(teacher) = filter.teacher {
        matcher.insert("gigDoc.teacher", teacher);
    }
    stages.push(doc! { "$match": matcher });
    stages
}

async fn run(db: &Database, collection: &str, pipeline: Vec<Document>) -> Result<Vec<Document>> {
    let rows = db
        .collection::<Document>(collection)
        .aggregate(pipeline)
        .await?
        .try_collect()
        .await?;
    Ok(rows)
}

async fn summary(db: &Database, filter: &AnalyticsFilter) -> Result<Summary> {
    let count_status = |status: BookingStatus| {
        doc! { "$sum": { "$cond": [{ "$eq": ["$status", status.as_str()] }, 1, 0] } }
    };
    let mut pipeline = booking_stages(filter, false);
    pipeline.push(doc! { "$group": {
        "_id": null,
        "total": { "$sum": 1 },
        "pending": count_status(BookingStatus::Pending),
        "accepted": count_status(BookingStatus::Accepted),
        "rejected": count_status(BookingStatus::Rejected),
        "completed": count_status(BookingStatus::Completed),
        "attended": { "$sum": { "$cond": [{ "$eq": ["$attended", true] }, 1, 0] } },
    }});

    let rows = run(db, booking::COLLECTION, pipeline).await?;
    let summary = rows
        .first()
        .map(|row| Summary {
            total: int(row, "total"),
            pending: int(row, "pending"),
            accepted: int(row, "accepted"),
            rejected: int(row, "rejected"),
            completed: int(row, "completed"),
            attended: int(row, "attended"),
            ..Summary::default()
        })
        .unwrap_or_default();
    Ok(summary.with_rates())
}

async fn timeseries(db: &Database, filter: &AnalyticsFilter) -> Result<Vec<DayPoint>> {
    let mut pipeline = booking_stages(filter, false);
    pipeline.push(doc! { "$group": {
        "_id": {
            "day": { "$dateToString": { "format": "%Y-%m-%d", "date": "$scheduledAt" } },
            "status": "$status",
        },
        "count": { "$sum": 1 },
    }});

    let rows = run(db, booking::COLLECTION, pipeline).await?;
    let mut counts = BTreeMap::new();
    for row in &rows {
        let Ok(key) = row.get_document("_id") else {
            continue;
        };
        if let (Ok(day), Ok(status)) = (key.get_str("day"), key.get_str("status")) {
            counts.insert((day.to_string(), status.to_string()), int(row, "count"));
        }
    }
    Ok(fill_days(filter.from, filter.to, &counts))
}

async fn top_teachers(db: &Database, filter: &AnalyticsFilter) -> Result<Vec<TopTeacher>> {
    let mut pipeline = booking_stages(filter, true);
    pipeline.extend([
        doc! { "$group": {
            "_id": "$gigDoc.teacher",
            "bookings": { "$sum": 1 },
            "completed": { "$sum": { "$cond": [{ "$eq": ["$status", "completed"] }, 1, 0] } },
        }},
        doc! { "$sort": { "completed": -1, "bookings": -1 } },
        doc! { "$limit": TOP_TEACHERS },
        doc! { "$lookup": {
            "from": "users",
            "localField": "_id",
            "foreignField": "_id",
            "as": "teacher",
        }},
        doc! { "$unwind": { "path": "$teacher", "preserveNullAndEmptyArrays": true } },
    ]);

    let rows = run(db, booking::COLLECTION, pipeline).await?;
    Ok(rows
        .iter()
        .filter_map(|row| {
            let id = row.get_object_id("_id").ok()?;
            let teacher = row.get_document("teacher").ok();
            Some(TopTeacher {
                teacher_id: id.to_hex(),
                name: teacher.and_then(|t| t.get_str("name").ok()).map(str::to_string),
                email: teacher.and_then(|t| t.get_str("email").ok()).map(str::to_string),
                bookings: int(row, "bookings"),
                completed: int(row, "completed"),
            })
        })
        .collect())
}

async fn revenue(db: &Database, filter: &AnalyticsFilter) -> Result<Revenue> {
    let mut matcher = doc! {
        "status": PaymentStatus::Success.as_str(),
        "createdAt": { "$gte": filter.from, "$lt": filter.to },
    };
    if let Some(teacher) = filter.teacher {
        matcher.insert("teacherId", teacher);
    }
    let pipeline = vec![
        doc! { "$match": matcher },
        doc! { "$group": { "_id": null, "count": { "$sum": 1 }, "amount": { "$sum": "$amount" } } },
    ];
    let rows = run(db, payment::COLLECTION, pipeline).await?;
    Ok(rows
        .first()
        .map(|row| Revenue {
            count: int(row, "count"),
            amount: round2(float(row, "amount")),
        })
        .unwrap_or_default())
}

pub async fn class_analytics(db: &Database, filter: AnalyticsFilter) -> Result<ClassAnalytics> {
    let (summary, timeseries, top_teachers, revenue) = tokio::try_join!(
        summary(db, &filter),
        timeseries(db, &filter),
        top_teachers(db, &filter),
        revenue(db, &filter),
    )?;

    Ok(ClassAnalytics {
        summary,
        revenue,
        timeseries,
        top_teachers,
        range: Range {
            from: filter.from,
            to: filter.to,
        },
    })
}

/// Accepts either an RFC 3339 instant or a bare `YYYY-MM-DD` (UTC midnight).
pub fn parse_bound(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_follow_their_definitions() {
        let summary = Summary {
            total: 10,
            pending: 2,
            accepted: 3,
            rejected: 1,
            completed: 4,
            attended: 3,
            ..Summary::default()
        }
        .with_rates();
        assert_eq!(summary.conversion_rate, 50.0);
        assert_eq!(summary.attendance_rate, 75.0);
    }

    #[test]
    fn empty_summary_has_zero_rates() {
        let summary = Summary::default().with_rates();
        assert_eq!(summary.conversion_rate, 0.0);
        assert_eq!(summary.attendance_rate, 0.0);
    }

    #[test]
    fn days_are_zero_filled_across_range() {
        let from = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2025, 2, 4, 0, 0, 0).unwrap();
        let mut counts = BTreeMap::new();
        counts.insert(("2025-02-02".to_string(), "accepted".to_string()), 2);
        counts.insert(("2025-02-02".to_string(), "pending".to_string()), 1);

        let days = fill_days(from, to, &counts);
        assert_eq!(days.len(), 3);
        assert_eq!(days[0].date, "2025-02-01");
        assert_eq!(days[0].total, 0);
        assert_eq!(days[1].accepted, 2);
        assert_eq!(days[1].total, 3);
        assert_eq!(days[2].date, "2025-02-03");
    }

    #[test]
    fn default_range_is_thirty_days() {
        let to = Utc.with_ymd_and_hms(2025, 3, 31, 12, 0, 0).unwrap();
        let filter = AnalyticsFilter::new(None, Some(to), None, None);
        assert_eq!(filter.to - filter.from, Duration::days(30));
    }

    #[test]
    fn bounds_accept_dates_and_instants() {
        assert_eq!(
            parse_bound("2025-02-01"),
            Some(Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_bound("2025-02-01T06:00:00+06:00"),
            Some(Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_bound("soon"), None);
        assert_eq!(parse_bound(""), None);
    }
}
