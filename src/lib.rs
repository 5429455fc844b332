pub mod aggregate;
pub mod api;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod output;
pub mod queue;
pub mod store;
pub mod worker;
