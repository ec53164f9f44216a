// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! IM adapter management for the Chatflow runtime.
//!
//! Adapter types are registered in the [`ImRegistry`]; the [`ImManager`]
//! instantiates the configured adapters and tracks whether each is
//! running.

pub mod manager;
pub mod registry;

pub use manager::ImManager;
pub use registry::{ImAdapterFactory, ImAdapterInfo, ImRegistry};
