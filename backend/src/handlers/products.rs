//! HTTP handlers for the product catalog

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use shared::{Product, ProductMatch};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::product::{
    CreateProductInput, ProductFilter, ProductService, UpdateProductInput,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct MatchQuery {
    pub code: String,
}

pub async fn list_products(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(filter): Query<ProductFilter>,
) -> AppResult<Json<Vec<Product>>> {
    let products = ProductService::new(state.db.clone()).list(filter).await?;
    Ok(Json(products))
}

/// Catalog candidates for a code read off a purchase order
pub async fn match_product(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Query(query): Query<MatchQuery>,
) -> AppResult<Json<Vec<ProductMatch>>> {
    let matches = ProductService::new(state.db.clone())
        .match_code(&query.code)
        .await?;
    Ok(Json(matches))
}

pub async fn get_product(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Path(product_code): Path<String>,
) -> AppResult<Json<Product>> {
    let product = ProductService::new(state.db.clone()).get(&product_code).await?;
    Ok(Json(product))
}

pub async fn create_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateProductInput>,
) -> AppResult<Json<Product>> {
    current_user.0.require_admin("manage products")?;
    let product = ProductService::new(state.db.clone()).create(input).await?;
    Ok(Json(product))
}

pub async fn update_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_code): Path<String>,
    Json(input): Json<UpdateProductInput>,
) -> AppResult<Json<Product>> {
    current_user.0.require_admin("manage products")?;
    let product = ProductService::new(state.db.clone())
        .update(&product_code, input)
        .await?;
    Ok(Json(product))
}

/// Deactivates; the code stays referenced by cartons and orders
pub async fn delete_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_code): Path<String>,
) -> AppResult<Json<Product>> {
    current_user.0.require_admin("manage products")?;
    let product = ProductService::new(state.db.clone())
        .deactivate(&product_code)
        .await?;
    Ok(Json(product))
}
