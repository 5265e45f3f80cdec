// SPDX-License-Identifier: Apache-2.0

//! JSON HTTP surface

pub mod error;
pub mod extractors;
pub mod gate;
pub mod server;

pub use error::{ApiError, ApiResponse, ApiResult};
pub use extractors::ApiJson;
pub use server::{build_router, serve, shutdown_signal, ServerError};
