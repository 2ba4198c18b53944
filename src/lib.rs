pub mod api;
pub mod client;
pub mod config;
pub mod events;
pub mod gateway;
pub mod models;
pub mod service;
pub mod storage;
