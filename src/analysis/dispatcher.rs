// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Task dispatch with per-task failure isolation
//!
//! Every resolved task runs concurrently against its capability client.
//! A failing, slow or cancelled task produces its own error outcome and
//! never affects the others. After a successful detection the overlay
//! step renders and persists a debug artifact on a blocking thread.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::client::CapabilityClient;
use super::landmark::LandmarkClient;
use super::moondream::{DetectionClient, MoondreamClient, QuestionAnsweringClient};
use super::registry::{ResolvedTask, TaskRegistry};
use super::types::{BoundingBox, CapabilityError, TaskKind, TaskOutcome};
use crate::config::NodeConfig;
use crate::vision::artifact::{ArtifactError, ArtifactSink, FileArtifactSink};
use crate::vision::image_utils::DecodedImage;
use crate::vision::overlay::{OverlayConfig, OverlayRenderer};

/// Final state of one task within a request
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub kind: TaskKind,
    pub outcome: TaskOutcome,
    pub elapsed_ms: u64,
}

/// Backend wiring reported by `/health`
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub task: TaskKind,
    pub backend: &'static str,
    pub configured: bool,
}

struct OverlayStep {
    renderer: Arc<OverlayRenderer>,
    sink: Arc<dyn ArtifactSink>,
}

pub struct TaskDispatcher {
    registry: TaskRegistry,
    clients: HashMap<TaskKind, Arc<dyn CapabilityClient>>,
    overlay: Option<OverlayStep>,
    deadline: Duration,
}

impl TaskDispatcher {
    /// A dispatcher with no clients; every task resolves to "no backend"
    pub fn new(registry: TaskRegistry, deadline: Duration) -> Self {
        Self {
            registry,
            clients: HashMap::new(),
            overlay: None,
            deadline,
        }
    }

    pub fn with_client(mut self, kind: TaskKind, client: Arc<dyn CapabilityClient>) -> Self {
        self.clients.insert(kind, client);
        self
    }

    pub fn with_overlay(mut self, renderer: OverlayRenderer, sink: Arc<dyn ArtifactSink>) -> Self {
        self.overlay = Some(OverlayStep {
            renderer: Arc::new(renderer),
            sink,
        });
        self
    }

    /// Build the full dispatch table from configuration
    pub fn from_config(config: &NodeConfig) -> anyhow::Result<Self> {
        let backend_timeout = Duration::from_secs(config.backend_timeout_secs);

        let moondream = Arc::new(MoondreamClient::new(
            &config.moondream_endpoint,
            config.moondream_api_key.clone(),
            backend_timeout,
        )?);
        let landmark = LandmarkClient::new(
            &config.google_vision_endpoint,
            config.google_vision_api_key.clone(),
            config.landmark_max_results,
            backend_timeout,
        )?;

        let mut dispatcher = Self::new(
            TaskRegistry::new(),
            Duration::from_secs(config.request_timeout_secs),
        )
        .with_client(
            TaskKind::ObjectDetection,
            Arc::new(DetectionClient::new(
                Arc::clone(&moondream),
                config.moondream_coordinates,
            )),
        )
        .with_client(
            TaskKind::Vqa,
            Arc::new(QuestionAnsweringClient::new(moondream)),
        )
        .with_client(TaskKind::LandmarkDetection, Arc::new(landmark));

        if config.debug_overlay {
            let overlay_config = match config.overlay_font_path {
                Some(ref path) => OverlayConfig::with_font_path(path)?,
                None => OverlayConfig::with_system_font(),
            };
            dispatcher = dispatcher.with_overlay(
                OverlayRenderer::new(overlay_config),
                Arc::new(FileArtifactSink::new(&config.debug_output_dir)),
            );
        }

        for status in dispatcher.backends() {
            if !status.configured {
                warn!(
                    "Backend {} for {} has no credentials; its tasks will report errors",
                    status.backend, status.task
                );
            }
        }

        Ok(dispatcher)
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Deadline applied to every task of a request
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn overlay_enabled(&self) -> bool {
        self.overlay.is_some()
    }

    pub fn backends(&self) -> Vec<BackendStatus> {
        let mut statuses: Vec<BackendStatus> = self
            .clients
            .iter()
            .map(|(kind, client)| BackendStatus {
                task: *kind,
                backend: client.name(),
                configured: client.is_configured(),
            })
            .collect();
        statuses.sort_by_key(|s| s.task);
        statuses
    }

    /// Run every task concurrently and report each one's outcome
    ///
    /// Returns one report per distinct task kind. Tasks still running when
    /// the deadline passes or `cancel` fires report an error; tasks that
    /// already finished keep their outcomes.
    pub async fn dispatch(
        &self,
        request_id: Uuid,
        image: Arc<DecodedImage>,
        tasks: Vec<ResolvedTask>,
        cancel: &CancellationToken,
    ) -> Vec<TaskReport> {
        use futures::future::join_all;

        let mut seen: Vec<TaskKind> = Vec::with_capacity(tasks.len());
        let tasks: Vec<ResolvedTask> = tasks
            .into_iter()
            .filter(|t| {
                let first = !seen.contains(&t.kind);
                seen.push(t.kind);
                first
            })
            .collect();

        debug!(
            "[{}] Dispatching {} tasks on {}x{} image",
            request_id,
            tasks.len(),
            image.width(),
            image.height()
        );

        let deadline = tokio::time::Instant::now() + self.deadline;

        // Every backend sends the same JPEG; encode it once off the async workers
        if !tasks.is_empty() {
            let encoding = Arc::clone(&image);
            match tokio::task::spawn_blocking(move || encoding.prepare_transport()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("[{}] Transport encoding failed: {}", request_id, e),
                Err(e) => warn!("[{}] Transport encoding task failed: {}", request_id, e),
            }
        }

        let futures = tasks
            .into_iter()
            .map(|task| self.run_task(request_id, &image, task, deadline, cancel));

        join_all(futures).await
    }

    async fn run_task(
        &self,
        request_id: Uuid,
        image: &Arc<DecodedImage>,
        task: ResolvedTask,
        deadline: tokio::time::Instant,
        cancel: &CancellationToken,
    ) -> TaskReport {
        let started = Instant::now();
        let kind = task.kind;

        let result = match self.clients.get(&kind) {
            None => Err(CapabilityError::Unavailable(kind)),
            Some(client) => {
                debug!("[{}] {} started via {}", request_id, kind, client.name());
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(CapabilityError::Cancelled),
                    result = tokio::time::timeout_at(deadline, client.invoke(image, &task.params)) => {
                        result.unwrap_or_else(|_| {
                            Err(CapabilityError::Timeout {
                                timeout_ms: self.deadline.as_millis() as u64,
                            })
                        })
                    }
                }
            }
        };

        let outcome = match result {
            Ok(TaskOutcome::Detection(boxes)) if kind == TaskKind::ObjectDetection => {
                let boxes: Vec<BoundingBox> = boxes.into_iter().map(BoundingBox::clamped).collect();
                self.render_overlay(request_id, image, &boxes).await;
                TaskOutcome::Detection(boxes)
            }
            Ok(TaskOutcome::Error(message)) => {
                warn!("[{}] {} failed: {}", request_id, kind, message);
                TaskOutcome::Error(message)
            }
            Ok(outcome) if outcome.kind() == Some(kind) => outcome,
            Ok(outcome) => {
                let returned = outcome.kind().map_or("unknown".to_string(), |k| k.to_string());
                let e = CapabilityError::MalformedResponse(format!(
                    "{} backend returned a {} result",
                    kind, returned
                ));
                warn!("[{}] {} failed: {}", request_id, kind, e);
                TaskOutcome::Error(e.to_string())
            }
            Err(e) => {
                warn!("[{}] {} failed: {}", request_id, kind, e);
                TaskOutcome::Error(e.to_string())
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "[{}] {} finished in {}ms ({})",
            request_id,
            kind,
            elapsed_ms,
            if outcome.is_success() { "ok" } else { "error" }
        );

        TaskReport {
            kind,
            outcome,
            elapsed_ms,
        }
    }

    /// Best effort; failures are logged and never touch the detection outcome
    async fn render_overlay(&self, request_id: Uuid, image: &Arc<DecodedImage>, boxes: &[BoundingBox]) {
        let Some(ref step) = self.overlay else {
            return;
        };

        let renderer = Arc::clone(&step.renderer);
        let sink = Arc::clone(&step.sink);
        let image = Arc::clone(image);
        let boxes = boxes.to_vec();

        let result = tokio::task::spawn_blocking(move || -> Result<_, ArtifactError> {
            let artifact = renderer.render(&image, &boxes)?;
            sink.persist(request_id, &artifact)
        })
        .await;

        match result {
            Ok(Ok(path)) => info!("[{}] Saved debug overlay to {}", request_id, path.display()),
            Ok(Err(e)) => warn!("[{}] Debug overlay skipped: {}", request_id, e),
            Err(e) => warn!("[{}] Debug overlay task failed: {}", request_id, e),
        }
    }
}
