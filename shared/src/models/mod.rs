//! Domain models for the plastics back office

mod barcode;
mod carton;
mod extraction;
mod order;
mod product;
mod stock;
mod stocktake;
mod verification;

pub use barcode::*;
pub use carton::*;
pub use extraction::*;
pub use order::*;
pub use product::*;
pub use stock::*;
pub use stocktake::*;
pub use verification::*;
