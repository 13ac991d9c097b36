use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{self, doc, Document},
    options::ReturnDocument,
    Collection,
};
use validator::Validate;

use super::parse_id;
use crate::dtos::{ApiResponse, ListResponse, MessageResponse, Pagination};
use crate::errors::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::gig::{self, CreateGig, Gig, GigQuery, GigResponse, UpdateGig};
use crate::models::user::Role;
use crate::services::activity_service::{self, NewActivity};
use crate::state::AppState;

pub(crate) fn gigs(state: &AppState) -> Collection<Gig> {
    state.db.collection(gig::COLLECTION)
}

/// Escapes regex metacharacters so search text matches literally.
pub(crate) fn escape_regex(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn list_filter(query: &GigQuery) -> Result<Document> {
    let mut filter = Document::new();

    if let Some(category) = query.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        filter.insert("category", category);
    }
    if let Some(teacher) = query.teacher.as_deref().filter(|t| !t.is_empty()) {
        filter.insert("teacher", parse_id(teacher)?);
    }
    if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = escape_regex(search);
        filter.insert(
            "$or",
            vec![
                doc! { "title": { "$regex": &pattern, "$options": "i" } },
                doc! { "description": { "$regex": &pattern, "$options": "i" } },
            ],
        );
    }

    let mut price = Document::new();
    if let Some(min) = query.min_price {
        price.insert("$gte", min);
    }
    if let Some(max) = query.max_price {
        price.insert("$lte", max);
    }
    if !price.is_empty() {
        filter.insert("price", price);
    }

    Ok(filter)
}

fn list_sort(sort: Option<&str>) -> Document {
    match sort {
        Some("price_asc") => doc! { "price": 1, "_id": 1 },
        Some("price_desc") => doc! { "price": -1, "_id": 1 },
        Some("rating") => doc! { "averageRating": -1, "reviewsCount": -1, "_id": 1 },
        Some("popular") => doc! { "completedBookingsCount": -1, "_id": 1 },
        _ => doc! { "createdAt": -1, "_id": -1 },
    }
}

pub async fn get_gigs(
    State(state): State<AppState>,
    Query(query): Query<GigQuery>,
) -> Result<Json<ListResponse<GigResponse>>> {
    let filter = list_filter(&query)?;
    let pagination = Pagination::new(query.page, query.limit);
    let collection = gigs(&state);

    let items: Vec<Gig> = collection
        .find(filter.clone())
        .sort(list_sort(query.sort.as_deref()))
        .skip(pagination.skip())
        .limit(pagination.limit as i64)
        .await?
        .try_collect()
        .await?;
    let total = collection.count_documents(filter).await?;

    Ok(Json(ListResponse::paged(
        items.into_iter().map(GigResponse::from).collect(),
        pagination,
        total,
    )))
}

pub async fn get_gig(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<GigResponse>>> {
    let id = parse_id(&id)?;
    let gig = gigs(&state)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or(AppError::NotFound("Gig"))?;

    Ok(Json(ApiResponse::success(GigResponse::from(gig))))
}

pub async fn create_gig(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<CreateGig>,
) -> Result<(StatusCode, Json<ApiResponse<GigResponse>>)> {
    auth.require_role(&[Role::Teacher])?;
    payload.validate()?;

    let now = Utc::now();
    let gig = Gig {
        id: bson::oid::ObjectId::new(),
        teacher: auth.id(),
        title: payload.title.trim().to_string(),
        description: payload.description.trim().to_string(),
        price: payload.price,
        category: payload.category.trim().to_string(),
        duration: payload.duration,
        average_rating: 0.0,
        reviews_count: 0,
        completed_bookings_count: 0,
        thumbnail_url: payload.thumbnail_url,
        availability: payload.availability,
        created_at: now,
        updated_at: now,
    };
    gigs(&state).insert_one(&gig).await?;

    tracing::info!(gig = %gig.id, teacher = %gig.teacher, "gig created");
    activity_service::record(
        &state.db,
        NewActivity::new("gig.create")
            .by(auth.id())
            .target("gig", gig.id.to_hex())
            .metadata(doc! { "title": &gig.title, "price": gig.price })
            .request(&headers),
    )
    .await;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(GigResponse::from(gig)))))
}

/// Loads a gig and checks that the caller owns it.
async fn owned_gig(state: &AppState, auth: &AuthUser, id: &str) -> Result<Gig> {
    auth.require_role(&[Role::Teacher])?;
    let id = parse_id(id)?;
    let gig = gigs(state)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or(AppError::NotFound("Gig"))?;
    if gig.teacher != auth.id() {
        return Err(AppError::forbidden("Not authorized to modify this gig"));
    }
    Ok(gig)
}

fn update_set(payload: &UpdateGig) -> Result<Document> {
    let mut set = Document::new();
    if let Some(title) = &payload.title {
        set.insert("title", title.trim());
    }
    if let Some(description) = &payload.description {
        set.insert("description", description.trim());
    }
    if let Some(price) = payload.price {
        set.insert("price", price);
    }
    if let Some(category) = &payload.category {
        set.insert("category", category.trim());
    }
    if let Some(duration) = payload.duration {
        set.insert("duration", duration);
    }
    if let Some(url) = &payload.thumbnail_url {
        set.insert("thumbnailUrl", url.as_str());
    }
    if let Some(availability) = &payload.availability {
        set.insert("availability", bson::to_bson(availability)?);
    }
    set.insert("updatedAt", Utc::now());
    Ok(set)
}

pub async fn update_gig(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateGig>,
) -> Result<Json<ApiResponse<GigResponse>>> {
    payload.validate()?;
    let gig = owned_gig(&state, &auth, &id).await?;

    let updated = gigs(&state)
        .find_one_and_update(doc! { "_id": gig.id }, doc! { "$set": update_set(&payload)? })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or(AppError::NotFound("Gig"))?;

    Ok(Json(ApiResponse::success(GigResponse::from(updated))))
}

pub async fn delete_gig(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    let gig = owned_gig(&state, &auth, &id).await?;
    gigs(&state).delete_one(doc! { "_id": gig.id }).await?;

    activity_service::record(
        &state.db,
        NewActivity::new("gig.delete")
            .by(auth.id())
            .target("gig", gig.id.to_hex())
            .metadata(doc! { "title": &gig.title })
            .request(&headers),
    )
    .await;

    Ok(Json(MessageResponse::new("Gig deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_text_is_matched_literally() {
        assert_eq!(escape_regex("c++ (basics)"), "c\\+\\+ \\(basics\\)");
    }

    #[test]
    fn filter_combines_price_bounds_and_search() {
        let query = GigQuery {
            search: Some("  physics ".into()),
            min_price: Some(100.0),
            max_price: Some(500.0),
            ..Default::default()
        };
        let filter = list_filter(&query).unwrap();
        let price = filter.get_document("price").unwrap();
        assert_eq!(price.get_f64("$gte").unwrap(), 100.0);
        assert_eq!(price.get_f64("$lte").unwrap(), 500.0);
        assert_eq!(filter.get_array("$or").unwrap().len(), 2);
        assert!(!filter.contains_key("category"));
    }

    #[test]
    fn malformed_teacher_filter_is_rejected() {
        let query = GigQuery {
            teacher: Some("not-an-id".into()),
            ..Default::default()
        };
        assert!(list_filter(&query).is_err());
    }
}
