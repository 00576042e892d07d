//! Bootwise kernel: resolves which boot artifact a network-booting device
//! should receive, registering and discovering unknown hardware on the way.

pub mod bridge;
pub mod config;
pub mod discovery;
pub mod error;
pub mod health;
pub mod http;
pub mod identity;
pub mod lookup;
pub mod models;
pub mod mqtt;
pub mod ports;
pub mod profiles;
pub mod protocol;
pub mod render;
pub mod service;
pub mod state;
