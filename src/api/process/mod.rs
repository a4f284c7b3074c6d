// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Multi-task image analysis endpoint
//!
//! Provides POST /process, which runs the requested analysis tasks
//! against one uploaded image.

pub mod handler;
pub mod request;

pub use handler::process_handler;
pub use request::ProcessRequest;
