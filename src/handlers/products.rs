//! Products API Handlers
//! /api/products エンドポイント（カタログ閲覧）

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{error_response, error_with_details, ApiError};
use crate::models::{Product, ProductResponse};
use crate::AppState;

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
pub struct ProductListResponse {
    pub success: bool,
    pub products: Vec<ProductResponse>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct ProductDetailResponse {
    pub success: bool,
    pub product: ProductResponse,
}

// ========================================
// Query Parameters
// ========================================

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    pub category: Option<String>,
}

// ========================================
// Handlers
// ========================================

/// GET /api/products - 商品一覧取得
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Json<ProductListResponse>, ApiError> {
    let category = query
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let products: Vec<Product> = if let Some(category) = category {
        sqlx::query_as(
            "SELECT * FROM products WHERE is_active = 1 AND category = ? ORDER BY is_featured DESC, name ASC"
        )
        .bind(category)
        .fetch_all(&state.db)
        .await
    } else {
        sqlx::query_as(
            "SELECT * FROM products WHERE is_active = 1 ORDER BY is_featured DESC, name ASC"
        )
        .fetch_all(&state.db)
        .await
    }
    .map_err(|e| catalog_error(&e, &state))?;

    let responses: Vec<ProductResponse> =
        products.iter().map(ProductResponse::from_product).collect();

    let total = responses.len();
    Ok(Json(ProductListResponse {
        success: true,
        products: responses,
        total,
    }))
}

/// GET /api/products/:product_id - 商品詳細取得
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
) -> Result<Json<ProductDetailResponse>, ApiError> {
    let product: Option<Product> = sqlx::query_as(
        "SELECT * FROM products WHERE id = ? AND is_active = 1"
    )
    .bind(product_id.trim())
    .fetch_optional(&state.db)
    .await
    .map_err(|e| catalog_error(&e, &state))?;

    match product {
        Some(p) => Ok(Json(ProductDetailResponse {
            success: true,
            product: ProductResponse::from_product(&p),
        })),
        None => Err(error_response(StatusCode::NOT_FOUND, "Product not found".to_string())),
    }
}

/// DB エラーの内容は production では返さない
fn catalog_error(e: &sqlx::Error, state: &AppState) -> ApiError {
    error_with_details(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Could not load products. Please try again.".to_string(),
        format!("DB error: {}", e),
        state.config.environment,
    )
}
