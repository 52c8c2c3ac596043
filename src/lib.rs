pub mod app;
pub mod clock;
pub mod config;
pub mod error;
pub mod formatter;
pub mod http_client;
pub mod persistence;
pub mod persister;
pub mod settings;
pub mod state;
pub mod storage;
pub mod task_model;
pub mod task_parser;
