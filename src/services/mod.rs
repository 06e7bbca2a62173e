//! Core services: identity extraction, catalog fetching, inventory
//! building, reconciliation, and their supporting utilities.

pub mod catalog;
pub mod checksum;
pub mod confirm;
pub mod fs_utils;
pub mod identity;
pub mod inventory;
pub mod reconcile;
pub mod report;

pub use catalog::CatalogClient;
pub use confirm::{AutoConfirm, Confirm, TerminalConfirm};
pub use inventory::InventoryBuilder;
