// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod analysis;
pub mod api;
pub mod cli;
pub mod config;
pub mod version;
pub mod vision;

// Re-export main types
pub use analysis::{AnalysisResponse, CapabilityClient, TaskDispatcher, TaskKind, TaskOutcome};
pub use config::{ConfigError, NodeConfig};
pub use vision::{DecodedImage, OverlayRenderer};
