//! SeaORM entities for the build-order engine.
//!
//! `part`, `bom_line` and `stock_item` are the external collaborators the
//! engine reads (and, on completion, writes); `build_order` and `build_item`
//! are the aggregate this crate owns.

pub mod bom_line;
pub mod build_item;
pub mod build_order;
pub mod part;
pub mod stock_item;
pub mod stock_movement;
