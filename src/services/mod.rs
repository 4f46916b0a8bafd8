pub mod bom;
pub mod builds;
pub mod stock;

pub use bom::BomService;
pub use builds::BuildOrderService;
pub use stock::StockService;
