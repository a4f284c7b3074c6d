// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use clap::Parser;
use std::path::PathBuf;

use crate::config::NodeConfig;

/// Historic Overlay Node
#[derive(Parser, Debug, Default)]
#[command(name = "historic-overlay-node")]
#[command(version)]
#[command(about = "Multi-task image analysis server", long_about = None)]
pub struct Cli {
    /// Host to bind (overrides API_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (overrides API_PORT)
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Disable the debug overlay artifact
    #[arg(long)]
    pub no_debug_overlay: bool,

    /// Directory for debug overlays (overrides DEBUG_OUTPUT_DIR)
    #[arg(long)]
    pub debug_output_dir: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    /// Apply command-line overrides on top of the environment configuration
    pub fn apply(&self, config: &mut NodeConfig) {
        if let Some(ref host) = self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.no_debug_overlay {
            config.debug_overlay = false;
        }
        if let Some(ref dir) = self.debug_output_dir {
            config.debug_output_dir = dir.clone();
        }
    }
}
