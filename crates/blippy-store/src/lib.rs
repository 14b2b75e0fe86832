// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod error;
mod models;
mod schema;
mod store;

pub use error::{StoreError, StoreResult};
pub use models::*;
pub use store::Store;
