//! Boundary types for incoming defect submissions.
//!
//! Callers hand the engine a loosely-typed [`RawSubmission`] (usually straight
//! from JSON). [`Submission::try_from_raw`] applies the *structural* checks and
//! produces the fixed internal shape. Content quality (short descriptions,
//! shouting, missing environment) is judged later by the quality checker and
//! is never a validation failure.

use serde::{Deserialize, Serialize};

use super::report::{Metadata, Severity};
use crate::error::DetectError;

/// Longest title accepted at the boundary, in characters.
pub const MAX_TITLE_CHARS: usize = 200;
/// Longest description accepted at the boundary, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 20_000;
/// Longest value accepted for any other free-text field, in characters.
pub const MAX_FIELD_CHARS: usize = 20_000;

/// Submission payload as received from the service layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSubmission {
    pub title: Option<String>,
    pub description: Option<String>,
    pub repro_steps: Option<String>,
    pub logs: Option<String>,
    pub reporter: Option<String>,
    pub device: Option<String>,
    pub build_version: Option<String>,
    pub os_version: Option<String>,
    pub region: Option<String>,
    pub severity: Option<String>,
    pub priority: Option<String>,
}

/// A structurally valid submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub title: String,
    pub description: String,
    pub repro_steps: Option<String>,
    pub logs: Option<String>,
    pub reporter: Option<String>,
    pub metadata: Metadata,
}

impl Submission {
    /// Validate the structural shape of a raw payload.
    ///
    /// `title` and `description` keys must be present (empty strings are
    /// allowed and left to the quality checker); every field must respect its
    /// length bound; `severity`, when given, must name a known level.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Validation`] describing the first problem found.
    pub fn try_from_raw(raw: RawSubmission) -> Result<Self, DetectError> {
        let title = raw
            .title
            .ok_or_else(|| DetectError::Validation("missing `title` field".into()))?;
        let description = raw
            .description
            .ok_or_else(|| DetectError::Validation("missing `description` field".into()))?;

        check_len("title", &title, MAX_TITLE_CHARS)?;
        check_len("description", &description, MAX_DESCRIPTION_CHARS)?;

        let repro_steps = optional_field("repro_steps", raw.repro_steps)?;
        let logs = optional_field("logs", raw.logs)?;
        let reporter = optional_field("reporter", raw.reporter)?;

        let severity = match optional_field("severity", raw.severity)? {
            Some(value) => Some(
                value
                    .parse::<Severity>()
                    .map_err(DetectError::Validation)?,
            ),
            None => None,
        };

        let metadata = Metadata {
            device: optional_field("device", raw.device)?,
            build_version: optional_field("build_version", raw.build_version)?,
            os_version: optional_field("os_version", raw.os_version)?,
            region: optional_field("region", raw.region)?,
            severity,
            priority: optional_field("priority", raw.priority)?,
        };

        Ok(Self {
            title,
            description,
            repro_steps,
            logs,
            reporter,
            metadata,
        })
    }

    /// Parse and validate a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::Validation`] for malformed JSON or a failed
    /// structural check.
    pub fn from_json(value: serde_json::Value) -> Result<Self, DetectError> {
        let raw: RawSubmission = serde_json::from_value(value)
            .map_err(|err| DetectError::Validation(format!("malformed payload: {err}")))?;
        Self::try_from_raw(raw)
    }

    /// Text handed to the embedding function.
    ///
    /// Title, description, and repro steps first, followed by labelled
    /// environment hints when present.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(6);
        for text in [
            Some(self.title.as_str()),
            Some(self.description.as_str()),
            self.repro_steps.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }
        if let Some(device) = &self.metadata.device {
            parts.push(format!("Device: {device}"));
        }
        if let Some(build) = &self.metadata.build_version {
            parts.push(format!("Build: {build}"));
        }
        if let Some(region) = &self.metadata.region {
            parts.push(format!("Region: {region}"));
        }
        parts.join(" ")
    }

    /// The payload as it was accepted, for audit and history records.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "title": self.title,
            "description": self.description,
            "repro_steps": self.repro_steps,
            "logs": self.logs,
            "reporter": self.reporter,
            "device": self.metadata.device,
            "build_version": self.metadata.build_version,
            "os_version": self.metadata.os_version,
            "region": self.metadata.region,
            "severity": self.metadata.severity.map(Severity::as_str),
            "priority": self.metadata.priority,
        })
    }
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), DetectError> {
    let len = value.chars().count();
    if len > max {
        return Err(DetectError::Validation(format!(
            "`{field}` is {len} characters, limit is {max}"
        )));
    }
    Ok(())
}

/// Blank optional fields collapse to `None`.
fn optional_field(field: &str, value: Option<String>) -> Result<Option<String>, DetectError> {
    match value {
        Some(v) => {
            check_len(field, &v, MAX_FIELD_CHARS)?;
            let trimmed = v.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        None => Ok(None),
    }
}
