// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Task registry: supported task kinds and their parameter defaults

use serde::Serialize;
use tracing::debug;

use super::types::{TaskKind, TaskParams};

/// Default detection target when the request names none
pub const DEFAULT_DETECT_CLASS: &str = "object";

/// Default question when the request asks none
pub const DEFAULT_QUESTION: &str = "What is in the image?";

/// One parameter a task accepts
#[derive(Debug, Clone, Serialize)]
pub struct ParameterSpec {
    /// Request field carrying the value
    pub name: &'static str,
    /// Value used when the field is absent or blank
    pub default: &'static str,
    pub description: &'static str,
}

/// Registry entry for one task kind
#[derive(Debug, Clone, Serialize)]
pub struct TaskDescriptor {
    pub kind: TaskKind,
    pub token: &'static str,
    pub parameters: Vec<ParameterSpec>,
}

/// Caller-supplied parameter values, before defaults are applied
#[derive(Debug, Clone, Default)]
pub struct TaskArguments<'a> {
    pub detect_class: Option<&'a str>,
    pub question: Option<&'a str>,
}

/// A recognized task with its parameters resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTask {
    pub kind: TaskKind,
    pub params: TaskParams,
}

#[derive(Debug, Clone)]
pub struct TaskRegistry {
    descriptors: Vec<TaskDescriptor>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl TaskRegistry {
    pub fn new() -> Self {
        let descriptors = TaskKind::ALL
            .into_iter()
            .map(|kind| TaskDescriptor {
                kind,
                token: kind.token(),
                parameters: match kind {
                    TaskKind::ObjectDetection => vec![ParameterSpec {
                        name: "detect_class",
                        default: DEFAULT_DETECT_CLASS,
                        description: "Class label to locate in the image",
                    }],
                    TaskKind::Vqa => vec![ParameterSpec {
                        name: "question",
                        default: DEFAULT_QUESTION,
                        description: "Question to answer about the image",
                    }],
                    TaskKind::LandmarkDetection => vec![],
                },
            })
            .collect();

        Self { descriptors }
    }

    /// Look up a task token; `None` means unknown
    pub fn lookup(&self, token: &str) -> Option<&TaskDescriptor> {
        let token = token.trim();
        self.descriptors.iter().find(|d| d.token == token)
    }

    pub fn is_known(&self, token: &str) -> bool {
        self.lookup(token).is_some()
    }

    pub fn descriptors(&self) -> &[TaskDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Parameters for `kind` with defaults filled in
    pub fn params_for(&self, kind: TaskKind, args: &TaskArguments<'_>) -> TaskParams {
        match kind {
            TaskKind::ObjectDetection => TaskParams::Detection {
                class_label: non_blank(args.detect_class)
                    .unwrap_or(DEFAULT_DETECT_CLASS)
                    .to_string(),
            },
            TaskKind::Vqa => TaskParams::Question {
                question: non_blank(args.question)
                    .unwrap_or(DEFAULT_QUESTION)
                    .to_string(),
            },
            TaskKind::LandmarkDetection => TaskParams::Landmark,
        }
    }

    /// Resolve requested tokens into tasks
    ///
    /// Unknown tokens are skipped. A kind requested more than once is
    /// resolved once, in first-seen order.
    pub fn resolve<S: AsRef<str>>(&self, tokens: &[S], args: &TaskArguments<'_>) -> Vec<ResolvedTask> {
        let mut resolved: Vec<ResolvedTask> = Vec::with_capacity(self.len());

        for token in tokens {
            let token = token.as_ref();
            let Some(descriptor) = self.lookup(token) else {
                debug!("Ignoring unknown task kind: {:?}", token);
                continue;
            };

            if resolved.iter().any(|t| t.kind == descriptor.kind) {
                continue;
            }

            resolved.push(ResolvedTask {
                kind: descriptor.kind,
                params: self.params_for(descriptor.kind, args),
            });
        }

        resolved
    }
}
