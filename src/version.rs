// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the Historic Overlay Node

/// Full version string with feature description
pub const VERSION: &str = "v0.1.0-multi-task-analysis-2025-11-03";

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Build date
pub const BUILD_DATE: &str = "2025-11-03";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "object-detection",
    "visual-question-answering",
    "landmark-detection",
    "partial-results",
    "debug-overlay",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("Historic Overlay Node {} ({})", VERSION_NUMBER, BUILD_DATE)
}
