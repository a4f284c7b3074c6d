// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Multi-task image analysis
//!
//! Resolves requested task kinds, fans them out to the external
//! capability backends and folds the outcomes into a single response.

pub mod aggregator;
pub mod client;
pub mod dispatcher;
pub mod landmark;
pub mod moondream;
pub mod registry;
pub mod types;

pub use aggregator::AnalysisResponse;
pub use client::CapabilityClient;
pub use dispatcher::{BackendStatus, TaskDispatcher, TaskReport};
pub use landmark::LandmarkClient;
pub use moondream::{
    CoordinateConvention, DetectionClient, MoondreamClient, QuestionAnsweringClient,
};
pub use registry::{ResolvedTask, TaskArguments, TaskDescriptor, TaskRegistry};
pub use types::{BoundingBox, CapabilityError, Landmark, TaskKind, TaskOutcome, TaskParams};
