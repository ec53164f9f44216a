// SPDX-FileCopyrightText: 2026 Chatflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin system for the Chatflow runtime.
//!
//! Plugins are compiled into the binary and registered in a
//! [`PluginCatalog`]. The [`PluginLoader`] discovers which of them to run
//! from the internal plugin directory and from installed package manifests,
//! then drives their `on_load` / `on_start` / `on_stop` hooks.

pub mod catalog;
pub mod event_bus;
pub mod loader;
pub mod manifest;
pub mod package;
pub mod plugin;

pub use catalog::{CatalogEntry, PluginCatalog};
pub use event_bus::PluginEventBus;
pub use loader::PluginLoader;
pub use manifest::{ENTRY_POINT_GROUP, MANIFEST_FILE, PluginManifest, parse_plugin_manifest, read_manifest};
pub use package::{CommandPackageManager, PackageManager};
pub use plugin::{Plugin, PluginFactory, PluginInfo};
