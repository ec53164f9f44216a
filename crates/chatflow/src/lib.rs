// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chatflow runtime: lifecycle orchestration behind the `chatflow` binary.

pub mod app;
pub mod check;
pub mod shutdown;
pub mod web;

pub use app::Application;
