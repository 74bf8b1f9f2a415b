use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};

use crate::error::{AppError, Result};
use crate::models::ImageInfo;
use crate::services::{ImageService, ServedImage};
use crate::AppState;

/// Serve a random image
/// GET / (and every unmatched path)
pub async fn random_image(State(state): State<AppState>) -> Result<(CookieJar, Response)> {
    let served = ImageService::random_image(&state.db, state.blobs.as_ref()).await?;
    image_response(served)
}

/// Serve a specific image
/// GET /id/:id
///
/// A non-numeric id matches no image route, so it falls back to a random image.
pub async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(CookieJar, Response)> {
    let served = match id.parse::<i64>() {
        Ok(id) => ImageService::image_by_id(&state.db, state.blobs.as_ref(), id).await?,
        Err(_) => ImageService::random_image(&state.db, state.blobs.as_ref()).await?,
    };
    image_response(served)
}

/// Get image metadata
/// GET /info/id/:id
pub async fn get_image_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ImageInfo>> {
    let not_found = || AppError::NotFound(format!("Image {} not found", id));
    let image_id = id.parse::<i64>().map_err(|_| not_found())?;
    let image = ImageService::get(&state.db, image_id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(image.to_info()))
}

fn image_response(served: ServedImage) -> Result<(CookieJar, Response)> {
    let ServedImage { image, data } = served;

    // Session cookies: no Expires/Max-Age. The jar percent-encodes values.
    let jar = CookieJar::new()
        .add(Cookie::build(("Permalink", image.permalink.clone())).path("/"))
        .add(Cookie::build(("Id", image.id.to_string())).path("/"));

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &image.content_type)
        .header(header::CONTENT_LENGTH, data.len())
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok((jar, response))
}
