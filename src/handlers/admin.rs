use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Json,
};
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    options::ReturnDocument,
    Collection,
};
use serde::Deserialize;

use super::gigs::escape_regex;
use super::parse_id;
use crate::dtos::{ApiResponse, ListResponse, Pagination};
use crate::errors::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::activity::{self, Activity, ActivityQuery, ActivityResponse};
use crate::models::booking::BookingStatus;
use crate::models::user::{self, Role, UpdateRole, User, UserQuery, UserResponse};
use crate::services::activity_service::{self, NewActivity};
use crate::services::analytics_service::{self, AnalyticsFilter, ClassAnalytics};
use crate::state::AppState;

fn users(state: &AppState) -> Collection<User> {
    state.db.collection(user::COLLECTION)
}

fn activities(state: &AppState) -> Collection<Activity> {
    state.db.collection(activity::COLLECTION)
}

fn user_filter(query: &UserQuery) -> Document {
    let mut filter = Document::new();
    if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = escape_regex(q);
        filter.insert(
            "$or",
            vec![
                doc! { "name": { "$regex": &pattern, "$options": "i" } },
                doc! { "email": { "$regex": &pattern, "$options": "i" } },
            ],
        );
    }
    if let Some(role) = query.role {
        filter.insert("role", role.as_str());
    }
    if let Some(onboarded) = query.is_onboarded {
        filter.insert("isOnboarded", onboarded);
    }
    filter
}

// GET /api/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<UserQuery>,
) -> Result<Json<ListResponse<UserResponse>>> {
    auth.require_role(&[Role::Admin])?;
    let filter = user_filter(&query);
    let pagination = Pagination::new(query.page, query.limit);
    let collection = users(&state);

    let items: Vec<User> = collection
        .find(filter.clone())
        .sort(doc! { "createdAt": -1, "_id": -1 })
        .skip(pagination.skip())
        .limit(pagination.limit as i64)
        .await?
        .try_collect()
        .await?;
    let total = collection.count_documents(filter).await?;

    Ok(Json(ListResponse::paged(
        items.into_iter().map(UserResponse::from).collect(),
        pagination,
        total,
    )))
}

// GET /api/admin/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    auth.require_role(&[Role::Admin])?;
    let user = users(&state)
        .find_one(doc! { "_id": parse_id(&id)? })
        .await?
        .ok_or(AppError::NotFound("User"))?;
    Ok(Json(ApiResponse::success(UserResponse::from(user))))
}

// PUT /api/admin/users/:id/role - admins may grant any role
pub async fn update_user_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateRole>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    auth.require_role(&[Role::Admin])?;
    let id = parse_id(&id)?;

    let previous = users(&state)
        .find_one_and_update(
            doc! { "_id": id },
            doc! { "$set": { "role": payload.role.as_str(), "updatedAt": Utc::now() } },
        )
        .return_document(ReturnDocument::Before)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    activity_service::record(
        &state.db,
        NewActivity::new("admin.user.role")
            .by(auth.id())
            .target("user", id.to_hex())
            .metadata(doc! { "from": previous.role.as_str(), "to": payload.role.as_str() })
            .request(&headers),
    )
    .await;

    let mut updated = previous;
    updated.role = payload.role;
    Ok(Json(ApiResponse::success(UserResponse::from(updated))))
}

fn activity_filter(query: &ActivityQuery) -> Result<Document> {
    let mut filter = Document::new();
    if let Some(user_id) = query.user_id.as_deref().filter(|u| !u.is_empty()) {
        filter.insert("user", parse_id(user_id)?);
    }
    if let Some(action) = query.action.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
        filter.insert("action", action);
    }
    if let Some(kind) = query.target_type.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        filter.insert("targetType", kind);
    }

    let mut created = Document::new();
    if let Some(from) = bound(query.from.as_deref(), "from")? {
        created.insert("$gte", from);
    }
    if let Some(to) = bound(query.to.as_deref(), "to")? {
        created.insert("$lte", to);
    }
    if !created.is_empty() {
        filter.insert("createdAt", created);
    }
    Ok(filter)
}

fn bound(raw: Option<&str>, name: &str) -> Result<Option<mongodb::bson::DateTime>> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        None => Ok(None),
        Some(raw) => analytics_service::parse_bound(raw)
            .map(|dt| Some(mongodb::bson::DateTime::from_chrono(dt)))
            .ok_or_else(|| AppError::invalid_data(format!("Invalid '{}' date", name))),
    }
}

async fn activity_page(
    state: &AppState,
    filter: Document,
    pagination: Pagination,
) -> Result<ListResponse<ActivityResponse>> {
    let collection = activities(state);
    let items: Vec<Activity> = collection
        .find(filter.clone())
        .sort(doc! { "createdAt": -1, "_id": -1 })
        .skip(pagination.skip())
        .limit(pagination.limit as i64)
        .await?
        .try_collect()
        .await?;
    let total = collection.count_documents(filter).await?;

    Ok(ListResponse::paged(
        items.into_iter().map(ActivityResponse::from).collect(),
        pagination,
        total,
    ))
}

// GET /api/admin/activities
pub async fn list_activities(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<ListResponse<ActivityResponse>>> {
    auth.require_role(&[Role::Admin])?;
    let filter = activity_filter(&query)?;
    let pagination = Pagination::new(query.page, query.limit);
    Ok(Json(activity_page(&state, filter, pagination).await?))
}

// GET /api/admin/users/:id/activities
pub async fn get_user_activities(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<ActivityQuery>,
) -> Result<Json<ListResponse<ActivityResponse>>> {
    auth.require_role(&[Role::Admin])?;
    let pagination = Pagination::new(query.page, query.limit);
    let mut filter = activity_filter(&ActivityQuery {
        user_id: None,
        ..query
    })?;
    filter.insert("user", parse_id(&id)?);

    Ok(Json(activity_page(&state, filter, pagination).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub teacher_id: Option<String>,
    pub status: Option<BookingStatus>,
}

// GET /api/admin/analytics/classes
pub async fn get_class_analytics(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<ApiResponse<ClassAnalytics>>> {
    auth.require_role(&[Role::Admin])?;

    let from = bound(query.from.as_deref(), "from")?.map(|d| d.to_chrono());
    let to = bound(query.to.as_deref(), "to")?.map(|d| d.to_chrono());
    if let (Some(from), Some(to)) = (from, to) {
        if from >= to {
            return Err(AppError::invalid_data("'from' must be earlier than 'to'"));
        }
    }
    let teacher: Option<ObjectId> = query
        .teacher_id
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(parse_id)
        .transpose()?;

    let filter = AnalyticsFilter::new(from, to, teacher, query.status);
    let analytics = analytics_service::class_analytics(&state.db, filter).await?;
    Ok(Json(ApiResponse::success(analytics)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_search_escapes_and_filters_role() {
        let query = UserQuery {
            q: Some("a.b".into()),
            role: Some(Role::Teacher),
            ..Default::default()
        };
        let filter = user_filter(&query);
        assert_eq!(filter.get_str("role").unwrap(), "teacher");
        let or = filter.get_array("$or").unwrap();
        let name = or[0].as_document().unwrap().get_document("name").unwrap();
        assert_eq!(name.get_str("$regex").unwrap(), "a\\.b");
    }

    #[test]
    fn activity_filter_builds_date_range() {
        let query = ActivityQuery {
            action: Some("booking.create".into()),
            from: Some("2024-01-01".into()),
            to: Some("2024-02-01T00:00:00Z".into()),
            ..Default::default()
        };
        let filter = activity_filter(&query).unwrap();
        assert_eq!(filter.get_str("action").unwrap(), "booking.create");
        let created = filter.get_document("createdAt").unwrap();
        assert!(created.get_datetime("$gte").is_ok());
        assert!(created.get_datetime("$lte").is_ok());
    }

    #[test]
    fn activity_filter_rejects_bad_dates_and_ids() {
        let query = ActivityQuery {
            from: Some("yesterday".into()),
            ..Default::default()
        };
        assert!(activity_filter(&query).is_err());

        let query = ActivityQuery {
            user_id: Some("123".into()),
            ..Default::default()
        };
        assert!(activity_filter(&query).is_err());
    }
}
