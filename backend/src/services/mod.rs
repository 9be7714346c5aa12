//! Business logic services for the plastics back office

pub mod barcode;
pub mod inbox;
pub mod order;
pub mod product;
pub mod stock;
pub mod stock_verification;
pub mod stocktake;

pub use inbox::{DbEmailProcessor, InboxMonitor, InboxService};
pub use order::OrderService;
pub use stock::StockService;
pub use stock_verification::StockVerificationService;
pub use stocktake::StocktakeService;
