pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod icons;
pub mod matcher;
pub mod model;
pub mod search;
pub mod sources;
pub mod store;
