use axum::{
    extract::{Path, State},
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
use crate::dtos::{ApiResponse, ListResponse};
use crate::errors::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::gig::{self, Gig, GigResponse};
use crate::models::user::{self, ProfilePatch, UpdateMe, User, UserResponse};
use crate::state::AppState;

fn users(state: &AppState) -> Collection<User> {
    state.db.collection(user::COLLECTION)
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    let id = parse_id(&id)?;
    let user = users(&state)
        .find_one(doc! { "_id": id })
        .await?
        .ok_or(AppError::NotFound("User"))?;

    Ok(Json(ApiResponse::success(UserResponse::from(user))))
}

pub async fn get_user_gigs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ListResponse<GigResponse>>> {
    let id = parse_id(&id)?;
    if users(&state).find_one(doc! { "_id": id }).await?.is_none() {
        return Err(AppError::NotFound("User"));
    }

    let gigs: Vec<Gig> = state
        .db
        .collection::<Gig>(gig::COLLECTION)
        .find(doc! { "teacher": id })
        .sort(doc! { "createdAt": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(Json(ListResponse::all(
        gigs.into_iter().map(GigResponse::from).collect(),
    )))
}

/// Dot-path `$set` entries for the profile fields present in the patch, so
/// fields left out of the request keep their stored values.
fn profile_set(patch: &ProfilePatch, set: &mut Document) -> Result<()> {
    if let Some(bio) = &patch.bio {
        set.insert("profile.bio", bio.trim());
    }
    let lists = [
        ("profile.experiences", &patch.experiences),
        ("profile.education", &patch.education),
        ("profile.work", &patch.work),
        ("profile.demoVideos", &patch.demo_videos),
    ];
    for (key, value) in lists {
        if let Some(value) = value {
            set.insert(key, bson::to_bson(value)?);
        }
    }
    let tags = [
        ("profile.skills", &patch.skills),
        ("profile.languages", &patch.languages),
        ("profile.subjects", &patch.subjects),
    ];
    for (key, value) in tags {
        if let Some(value) = value {
            set.insert(key, value.clone());
        }
    }
    if let Some(rate) = patch.hourly_rate {
        set.insert("profile.hourlyRate", rate);
    }
    if let Some(availability) = &patch.availability {
        set.insert("profile.availability", availability.as_str());
    }
    if let Some(timezone) = &patch.timezone {
        set.insert("profile.timezone", timezone.as_str());
    }
    Ok(())
}

fn update_me_set(payload: &UpdateMe) -> Result<Document> {
    let mut set = Document::new();

    let strings = [
        ("name", &payload.name),
        ("headline", &payload.headline),
        ("phone", &payload.phone),
        ("location", &payload.location),
        ("avatar", &payload.avatar),
        ("coverImage", &payload.cover_image),
        ("marketingSource", &payload.marketing_source),
    ];
    for (key, value) in strings {
        if let Some(value) = value {
            set.insert(key, value.trim());
        }
    }

    if let Some(onboarded) = payload.is_onboarded {
        set.insert("isOnboarded", onboarded);
    }
    if let Some(role) = payload.role {
        if !role.is_self_assignable() {
            return Err(AppError::forbidden("Admin role can only be granted by an admin"));
        }
        set.insert("role", role.as_str());
    }
    if let Some(profile) = &payload.profile {
        profile_set(profile, &mut set)?;
    }

    set.insert("updatedAt", Utc::now());
    Ok(set)
}

pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UpdateMe>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    payload.validate()?;
    if let Some(profile) = &payload.profile {
        profile.validate()?;
    }

    let set = update_me_set(&payload)?;
    let updated = users(&state)
        .find_one_and_update(doc! { "_id": auth.id() }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    Ok(Json(ApiResponse::success(UserResponse::from(updated))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;

    #[test]
    fn patch_only_sets_present_fields() {
        let payload = UpdateMe {
            name: Some("  Rafi  ".into()),
            profile: Some(ProfilePatch {
                skills: Some(vec!["algebra".into()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let set = update_me_set(&payload).unwrap();
        assert_eq!(set.get_str("name").unwrap(), "Rafi");
        assert!(set.contains_key("profile.skills"));
        assert!(!set.contains_key("profile.bio"));
        assert!(!set.contains_key("headline"));
        assert!(set.contains_key("updatedAt"));
    }

    #[test]
    fn admin_role_cannot_be_self_assigned() {
        let payload = UpdateMe {
            role: Some(Role::Admin),
            ..Default::default()
        };
        assert!(update_me_set(&payload).is_err());
    }
}
