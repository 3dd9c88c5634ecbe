//! Generic CRUD handlers for content resources

use super::{created, no_content, success, success_list, ApiJson, ApiPath, ApiQuery, ListQuery};
use crate::auth::AuthUser;
use crate::content::ContentResource;
use crate::error::AppError;
use crate::AppState;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// `GET|POST {base}` and `GET|PATCH|DELETE {base}/:id`
pub fn routes<T: ContentResource>(base: &str) -> Router<Arc<AppState>> {
    Router::new()
        .route(base, get(list::<T>).post(create::<T>))
        .route(
            &format!("{}/:id", base),
            get(fetch::<T>).patch(update::<T>).delete(remove::<T>),
        )
}

fn forbidden() -> AppError {
    AppError::forbidden("You do not have permission to perform this action")
}

async fn load<T: ContentResource>(state: &AppState, id: Uuid) -> Result<T, AppError> {
    state
        .db
        .get_content::<T>(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("{} not found", T::NAME)))
}

async fn list<T: ContentResource>(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = query.page_request(T::SORTABLE)?;
    let parent = T::PARENT.and_then(|(_, param)| query.parent(param));

    let items = state.db.list_content::<T>(&page, parent).await?;
    Ok(success_list(query.project(&items)?))
}

async fn fetch<T: ContentResource>(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let item = load::<T>(&state, id).await?;
    Ok(success(item))
}

async fn create<T: ContentResource>(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiJson(new): ApiJson<T::New>,
) -> Result<Response, AppError> {
    if !T::can_create(&user) {
        return Err(forbidden());
    }

    let item = T::create(new, user.id, Utc::now());
    item.validate()?;
    state.db.insert_content(&item).await?;

    info!("{} {} created by {}", T::NAME, item.id(), user.id);
    Ok(created(item))
}

async fn update<T: ContentResource>(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(patch): ApiJson<T::Update>,
) -> Result<impl IntoResponse, AppError> {
    let mut item = load::<T>(&state, id).await?;
    if !item.can_modify(&user) {
        return Err(forbidden());
    }

    item.apply(patch, Utc::now());
    item.validate()?;
    state.db.update_content(&item).await?;
    Ok(success(item))
}

async fn remove<T: ContentResource>(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Response, AppError> {
    let item = load::<T>(&state, id).await?;
    if !item.can_modify(&user) {
        return Err(forbidden());
    }

    state.db.delete_content::<T>(id).await?;
    info!("{} {} deleted by {}", T::NAME, id, user.id);
    Ok(no_content())
}
