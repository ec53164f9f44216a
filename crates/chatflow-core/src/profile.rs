// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User profile returned by adapters that support profile lookups.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Platform-reported profile of a user or of the bot account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}
