//! Route definitions for the plastics back office

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes; everything under them requires a bearer token
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/products", product_routes())
        .nest("/stock", stock_routes())
        .nest("/orders", order_routes())
        .nest("/stock-verifications", verification_routes())
        .nest("/stocktake", stocktake_routes())
        .nest("/inbox", inbox_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Catalog; writes are admin only
fn product_routes() -> Router<AppState> {
    use handlers::products;

    Router::new()
        .route(
            "/",
            get(products::list_products).post(products::create_product),
        )
        .route("/match", get(products::match_product))
        .route(
            "/:code",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
}

/// Carton lifecycle, labels, queries and thresholds
fn stock_routes() -> Router<AppState> {
    use handlers::stock;

    Router::new()
        .route("/labels", post(stock::generate_labels))
        .route("/labels/:barcode", get(stock::reprint_label))
        .route("/scan-in", post(stock::scan_in))
        .route("/scan-out", post(stock::scan_out))
        .route("/partial-repack", post(stock::partial_repack))
        .route("/adjust", post(stock::adjust))
        .route("/levels", get(stock::stock_levels))
        .route("/summary", get(stock::stock_summary))
        .route("/items", get(stock::list_items))
        .route("/items/:id", get(stock::get_item))
        .route(
            "/thresholds",
            get(stock::list_thresholds).post(stock::create_threshold),
        )
        .route(
            "/thresholds/:id",
            put(stock::update_threshold).delete(stock::delete_threshold),
        )
}

/// Order review, approval and documents
fn order_routes() -> Router<AppState> {
    use handlers::orders;

    Router::new()
        .route("/", get(orders::list_orders).post(orders::create_order))
        .route("/:id", get(orders::get_order).put(orders::update_order))
        .route("/:id/line-items/:line_id", put(orders::update_line_item))
        .route("/:id/approve", post(orders::approve_order))
        .route("/:id/reject", post(orders::reject_order))
        .route("/:id/check-completion", post(orders::check_completion))
        .route("/:id/forms/office-order", get(orders::download_office_order))
        .route(
            "/:id/forms/works-order/:line_id",
            get(orders::download_works_order),
        )
}

fn verification_routes() -> Router<AppState> {
    use handlers::verification;

    Router::new()
        .route("/pending", get(verification::list_pending))
        .route("/order/:order_id", get(verification::order_verifications))
        .route("/:id/confirm", post(verification::confirm_verification))
        .route("/:id/expire", post(verification::expire_verification))
}

fn stocktake_routes() -> Router<AppState> {
    use handlers::stocktake;

    Router::new()
        .route(
            "/sessions",
            get(stocktake::list_sessions).post(stocktake::start_session),
        )
        .route("/sessions/:id", get(stocktake::get_session))
        .route(
            "/sessions/:id/scan",
            get(stocktake::list_scans).post(stocktake::scan),
        )
        .route("/sessions/:id/progress", get(stocktake::progress))
        .route("/sessions/:id/complete", post(stocktake::complete_session))
        .route("/sessions/:id/cancel", post(stocktake::cancel_session))
        .route(
            "/sessions/:id/discrepancies",
            get(stocktake::discrepancies),
        )
}

fn inbox_routes() -> Router<AppState> {
    use handlers::inbox;

    Router::new()
        .route(
            "/emails",
            get(inbox::list_emails).post(inbox::ingest_email),
        )
        .route("/status", get(inbox::monitor_status))
        .route("/start", post(inbox::start_monitor))
        .route("/stop", post(inbox::stop_monitor))
        .route("/poll", post(inbox::poll_now))
}
