use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures::TryStreamExt;
use serde::Deserialize;

use crate::directory::{DirectoryPage, PublicPortfolio};
use crate::errors::AppError;
use crate::state::AppState;

const MAX_PAGE_SIZE: usize = 500;

#[derive(Deserialize)]
pub struct PageQuery {
    pub cursor: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/v1/portfolios?cursor=&limit=
///
/// One scan batch. Keep following `next_cursor` until it is null; a batch may be
/// empty before the end.
pub async fn handle_list_portfolios(
    State(state): State<AppState>,
    Query(params): Query<PageQuery>,
) -> Result<Json<DirectoryPage>, AppError> {
    let limit = params
        .limit
        .unwrap_or(state.directory.default_page_size())
        .clamp(1, MAX_PAGE_SIZE);
    let cursor = params.cursor.filter(|c| !c.is_empty());
    Ok(Json(state.directory.page(cursor.as_deref(), limit).await?))
}

/// GET /api/v1/portfolios/:username
pub async fn handle_get_portfolio(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<PublicPortfolio>, AppError> {
    state
        .directory
        .portfolio(&username)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No published portfolio for '{username}'")))
}

/// GET /sitemap.txt
///
/// Streams one portfolio url per line, fetching the keyspace batch by batch.
pub async fn handle_sitemap(State(state): State<AppState>) -> Response {
    let base = state.config.public_base_url.trim_end_matches('/').to_string();
    let lines = state
        .directory
        .list_published(state.directory.default_page_size(), None)
        .map_ok(move |entry| format!("{base}/{}\n", entry.username));

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(lines),
    )
        .into_response()
}
