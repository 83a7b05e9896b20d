// Local Line backoffice command boundary - library root

pub mod auth;
pub mod commands;
pub mod config;
pub mod error;
pub mod http_client;
pub mod week;
