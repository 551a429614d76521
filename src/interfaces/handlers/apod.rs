use std::collections::HashMap;

use actix_web::{web, HttpResponse, Responder};
use tracing::instrument;
use validator::Validate;

use crate::{
    constants::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT},
    entities::daily_picture::{ApodQuery, BackfillRequest, PictureEnvelope, PictureListEnvelope},
    errors::AppError,
    use_cases::extractors::AdminKey,
    utils::valid_date::requested_date,
    AppState,
};

#[instrument(skip(state, query))]
pub async fn get_picture_of_the_day(
    state: web::Data<AppState>,
    query: web::Query<ApodQuery>,
) -> Result<impl Responder, AppError> {
    let picture = match query.date.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
        None => state.apod_handler.resolve(None).await,
        Some(raw) => match requested_date("date", raw) {
            Some(date) => state.apod_handler.resolve(Some(date)).await,
            None => None,
        },
    };

    Ok(HttpResponse::Ok().json(PictureEnvelope { status: true, data: picture }))
}

#[instrument(skip(state, query))]
pub async fn get_all_pictures(
    state: web::Data<AppState>,
    query: web::Query<HashMap<String, String>>,
) -> Result<impl Responder, AppError> {
    let limit = query.get("limit")
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .min(MAX_PAGE_LIMIT);
    let offset = query.get("offset")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0);

    let pictures = state.apod_handler.list_pictures(limit, offset).await;

    Ok(HttpResponse::Ok().json(PictureListEnvelope {
        status: true,
        count: pictures.len(),
        data: pictures,
    }))
}

#[instrument(skip(state))]
pub async fn get_picture_by_date(
    date: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<impl Responder, AppError> {
    let picture = match requested_date("date", &date) {
        Some(date) => state.apod_handler.get_picture_by_date(date).await,
        None => None,
    };

    Ok(HttpResponse::Ok().json(PictureEnvelope { status: true, data: picture }))
}

#[instrument(skip(_admin, state, data))]
pub async fn backfill_pictures(
    _admin: AdminKey,
    state: web::Data<AppState>,
    data: web::Json<BackfillRequest>,
) -> Result<impl Responder, AppError> {
    let request = data.into_inner();
    request.validate()?;

    let report = state.apod_handler
        .backfill(request.start_date, request.end_date)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": true,
        "data": report
    })))
}
