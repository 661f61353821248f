pub mod config;
pub mod db;
pub mod ledger;
pub mod validation;

#[cfg(any(test, feature = "fuzztesting"))]
pub mod fuzz;
