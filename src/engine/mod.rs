// Data Engine Module
// Sessions, pools and query execution for PostgreSQL

pub mod connection_url;
pub mod drivers;
pub mod error;
pub mod gateway;
pub mod normalizer;
pub mod registry;
pub mod session_manager;
pub mod sql_generator;
pub mod sql_statements;
pub mod traits;
pub mod types;

pub use error::{EngineError, EngineResult, ErrorKind};
pub use gateway::QueryGateway;
pub use registry::{PoolRegistry, Session};
pub use session_manager::SessionManager;
pub use traits::DataEngine;
pub use types::*;
