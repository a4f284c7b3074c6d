// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Response aggregation
//!
//! Folds per-task reports into one flat JSON object. Each requested kind
//! contributes exactly one key: its result key on success or its error key
//! on failure. Kinds that were not requested are absent.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

use super::dispatcher::TaskReport;
use super::types::{TaskKind, TaskOutcome};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisResponse {
    outcomes: BTreeMap<TaskKind, TaskOutcome>,
}

impl AnalysisResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_reports(reports: impl IntoIterator<Item = TaskReport>) -> Self {
        let mut response = Self::new();
        for report in reports {
            response.insert(report.kind, report.outcome);
        }
        response
    }

    /// Record an outcome; the first outcome for a kind wins
    pub fn insert(&mut self, kind: TaskKind, outcome: TaskOutcome) {
        self.outcomes.entry(kind).or_insert(outcome);
    }

    pub fn get(&self, kind: TaskKind) -> Option<&TaskOutcome> {
        self.outcomes.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.outcomes.values().filter(|o| !o.is_success()).count()
    }
}

impl Serialize for AnalysisResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.outcomes.len()))?;
        for (kind, outcome) in &self.outcomes {
            match outcome {
                TaskOutcome::Detection(boxes) => map.serialize_entry(kind.result_key(), boxes)?,
                TaskOutcome::Answer(answer) => map.serialize_entry(kind.result_key(), answer)?,
                TaskOutcome::Landmarks(landmarks) => {
                    map.serialize_entry(kind.result_key(), landmarks)?
                }
                TaskOutcome::Error(message) => map.serialize_entry(kind.error_key(), message)?,
            }
        }
        map.end()
    }
}
