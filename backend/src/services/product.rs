//! Product catalog service
//!
//! Products gate label printing and are what extracted order lines are
//! matched against. Deleting a product only deactivates it; cartons and
//! order lines keep referring to its code.

use serde::Deserialize;
use shared::{escape_like, match_products, validate_product_code, Product, ProductMatch};
use sqlx::PgPool;
use validator::Validate;

use crate::error::{map_unique_violation, AppError, AppResult};

#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
}

/// Filters for the catalog list
#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    /// Matches product code or description
    pub search: Option<String>,
    pub customer: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(custom = "validate_product_code")]
    pub product_code: String,
    #[validate(custom = "shared::validate_not_blank")]
    pub product_description: String,
    pub customer_name: Option<String>,
    #[serde(default = "default_stockable")]
    pub is_stockable: bool,
}

fn default_stockable() -> bool {
    true
}

/// Fields left out are unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductInput {
    pub product_description: Option<String>,
    pub customer_name: Option<String>,
    pub is_active: Option<bool>,
    pub is_stockable: Option<bool>,
}

fn contains_pattern(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(|v| format!("%{}%", escape_like(&v)))
}

impl ProductService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list(&self, filter: ProductFilter) -> AppResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE ($1::TEXT IS NULL OR product_code ILIKE $1 OR product_description ILIKE $1)
              AND ($2::TEXT IS NULL OR customer_name ILIKE $2)
            ORDER BY product_code
            "#,
        )
        .bind(contains_pattern(filter.search))
        .bind(contains_pattern(filter.customer))
        .fetch_all(&self.db)
        .await?;

        Ok(products)
    }

    /// Catalog candidates for an extracted code, best first
    pub async fn match_code(&self, code: &str) -> AppResult<Vec<ProductMatch>> {
        let Some(pattern) = contains_pattern(Some(code.to_string())) else {
            return Ok(Vec::new());
        };

        let candidates = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE is_active AND (product_code ILIKE $1 OR product_description ILIKE $1)
            ORDER BY product_code
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.db)
        .await?;

        Ok(match_products(code, &candidates))
    }

    pub async fn get(&self, product_code: &str) -> AppResult<Product> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE product_code = $1")
            .bind(product_code)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {}", product_code)))
    }

    pub async fn create(&self, input: CreateProductInput) -> AppResult<Product> {
        input.validate()?;

        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (product_code, product_description, customer_name, is_stockable)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&input.product_code)
        .bind(input.product_description.trim())
        .bind(input.customer_name.as_deref().map(str::trim).filter(|c| !c.is_empty()))
        .bind(input.is_stockable)
        .fetch_one(&self.db)
        .await
        .map_err(|e| map_unique_violation(e, "product_code"))?;

        tracing::info!(
            product = %product.product_code,
            stockable = product.is_stockable,
            "Product created"
        );

        Ok(product)
    }

    pub async fn update(&self, product_code: &str, input: UpdateProductInput) -> AppResult<Product> {
        if input
            .product_description
            .as_deref()
            .is_some_and(|d| d.trim().is_empty())
        {
            return Err(AppError::Validation {
                field: "product_description".to_string(),
                message: "Description must not be blank".to_string(),
            });
        }

        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET product_description = COALESCE($2, product_description),
                customer_name = COALESCE($3, customer_name),
                is_active = COALESCE($4, is_active),
                is_stockable = COALESCE($5, is_stockable),
                updated_at = NOW()
            WHERE product_code = $1
            RETURNING *
            "#,
        )
        .bind(product_code)
        .bind(input.product_description.as_deref().map(str::trim))
        .bind(input.customer_name.as_deref().map(str::trim))
        .bind(input.is_active)
        .bind(input.is_stockable)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {}", product_code)))?;

        tracing::info!(
            product = %product.product_code,
            active = product.is_active,
            stockable = product.is_stockable,
            "Product updated"
        );

        Ok(product)
    }

    /// Soft delete
    pub async fn deactivate(&self, product_code: &str) -> AppResult<Product> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET is_active = FALSE, updated_at = NOW()
            WHERE product_code = $1
            RETURNING *
            "#,
        )
        .bind(product_code)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {}", product_code)))?;

        tracing::info!(product = %product.product_code, "Product deactivated");
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern(Some(" tub_5 ".to_string())), Some("%tub\\_5%".to_string()));
        assert_eq!(contains_pattern(Some("   ".to_string())), None);
        assert_eq!(contains_pattern(None), None);
    }

    #[test]
    fn test_create_input_validation() {
        let input: CreateProductInput = serde_json::from_value(serde_json::json!({
            "product_code": "tub-500",
            "product_description": " "
        }))
        .unwrap();
        assert!(input.is_stockable);

        let errors = input.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("product_code"));
        assert!(fields.contains_key("product_description"));
    }
}
