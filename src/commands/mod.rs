// HTTP Handlers Module

pub mod connection;
pub mod metrics;
pub mod mutation;
pub mod query;
pub mod roles;
