//! Catalog read routes.

use axum::{
    Json,
    extract::{Path, Query, State},
};

use marketplace_core::pagination::{Cursor, Page, PageLimit};
use marketplace_core::{Product, ProductId};

use crate::error::{AppError, Result};
use crate::routes::PageQuery;
use crate::state::AppState;

/// Active listings, newest first.
///
/// GET /products?cursor=&limit=
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Product>>> {
    let cursor = Cursor::parse_optional(query.cursor.as_deref())?;
    let limit = PageLimit::clamped(query.limit());
    let rows = state.stores().catalog.list_active(cursor, limit).await?;
    Ok(Json(Page::from_overfetch(rows, limit)))
}

/// One listing, whatever its status.
///
/// GET /products/{id}
pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    state
        .stores()
        .catalog
        .get_product(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))
}
