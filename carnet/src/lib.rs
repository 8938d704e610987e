pub mod badge_rpc;
pub mod cli;
pub mod config;
pub mod error;
pub mod http_server;
pub mod lifecycle;
pub mod photo;
pub mod qr;
pub mod status;
pub mod utils;
pub mod verify;
