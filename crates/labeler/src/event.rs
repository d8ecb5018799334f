//! Trigger resolution: which repository and which issue/PR a run targets.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::{LabelerError, LabelerResult};

/// An `owner/repo` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
}

impl FromStr for Repository {
    type Err = LabelerError;

    fn from_str(slug: &str) -> Result<Self, Self::Err> {
        let slug = slug.trim();
        match slug.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(event_error(format!(
                "repository must be in 'owner/repo' form, got '{slug}'"
            ))),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Resolved target of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTarget {
    pub repository: Repository,
    pub number: u64,
}

impl EventTarget {
    /// Resolve the target from run inputs.
    ///
    /// An explicit `number` wins; otherwise the number is read from the event
    /// payload at `event_path`.
    pub fn resolve(
        repository: &str,
        number: Option<u64>,
        event_path: Option<&Path>,
    ) -> LabelerResult<Self> {
        let repository = repository.parse()?;
        let number = match (number, event_path) {
            (Some(number), _) => number,
            (None, Some(path)) => number_from_event_file(path)?,
            (None, None) => {
                return Err(event_error(
                    "no issue/PR number given and no event payload to read it from",
                ));
            }
        };

        if number == 0 {
            return Err(event_error("issue/PR number must be positive"));
        }

        Ok(Self { repository, number })
    }
}

/// Read the issue/PR number from a webhook event payload file.
pub fn number_from_event_file(path: &Path) -> LabelerResult<u64> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        event_error(format!("failed to read event payload {}: {e}", path.display()))
    })?;
    let payload: Value = serde_json::from_str(&raw).map_err(|e| {
        event_error(format!("event payload {} is not JSON: {e}", path.display()))
    })?;

    let number = number_from_event(&payload)?;
    debug!(path = %path.display(), number, "Resolved number from event payload");
    Ok(number)
}

/// Find the number in an event payload: top-level `number`, then
/// `pull_request.number`, then `issue.number`.
pub fn number_from_event(payload: &Value) -> LabelerResult<u64> {
    ["/number", "/pull_request/number", "/issue/number"]
        .iter()
        .find_map(|pointer| payload.pointer(pointer).and_then(Value::as_u64))
        .ok_or_else(|| event_error("event payload has no issue or pull request number"))
}

fn event_error(reason: impl Into<String>) -> LabelerError {
    LabelerError::Event {
        reason: reason.into(),
    }
}
