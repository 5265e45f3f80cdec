// SPDX-License-Identifier: Apache-2.0

//! Saved connection profiles
//!
//! Profiles are the connection details a user asked to remember. Passwords are
//! never persisted.

pub mod storage;

pub use storage::{FileProfileStore, ProfileStore, SavedProfile};
