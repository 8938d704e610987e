pub mod audit_logs;
pub mod common;
pub mod credentials;
pub mod photos;
pub mod workers;

pub use common::*;
