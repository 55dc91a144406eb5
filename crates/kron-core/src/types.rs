use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::labels::{execution_generate_name, selector_matches, ORIGIN_LABEL, ORIGIN_VALUE, TEMPLATE_LABEL};

/// A job template observed in the cluster.
///
/// Templates are owned by whoever created them; the controller only reads
/// them. `spec` is the pod specification copied verbatim into every
/// execution, kept as opaque JSON so this crate stays transport-agnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTemplate {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Raw value of the `schedule` annotation, if present.
    pub schedule: Option<String>,
    #[serde(default)]
    pub spec: serde_json::Value,
}

impl JobTemplate {
    /// Whether the template's labels satisfy `selector`.
    #[must_use]
    pub fn matches_selector(&self, selector: &str) -> bool {
        selector_matches(selector, &self.labels)
    }

    /// Builds the creation request for one execution of this template.
    ///
    /// The returned value owns copies of everything it needs, so it can be
    /// captured by a trigger and stay unaffected by later template updates.
    #[must_use]
    pub fn to_execution(&self) -> NewExecution {
        let mut labels = BTreeMap::new();
        labels.insert(ORIGIN_LABEL.to_string(), ORIGIN_VALUE.to_string());
        labels.insert(TEMPLATE_LABEL.to_string(), self.name.clone());

        NewExecution {
            generate_name: execution_generate_name(&self.name),
            labels,
            spec: self.spec.clone(),
        }
    }
}

/// An execution that has not been submitted to the cluster yet.
///
/// The cluster completes `generate_name` with a random suffix, so two
/// submissions of the same request never collide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExecution {
    pub generate_name: String,
    pub labels: BTreeMap<String, String>,
    pub spec: serde_json::Value,
}

impl NewExecution {
    #[must_use]
    pub fn template_name(&self) -> Option<&str> {
        self.labels.get(TEMPLATE_LABEL).map(String::as_str)
    }
}

/// An execution created by the controller, as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledExecution {
    pub name: String,
    /// Correlation identifier used to find the execution's pods.
    pub uid: Option<String>,
    /// Name of the originating template, from the `template` label.
    pub template: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub name: String,
}

/// Reference to the object a watch event is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub name: Option<String>,
    pub resource_version: Option<String>,
}

impl ObjectRef {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            resource_version: None,
        }
    }

    #[must_use]
    pub fn with_resource_version(mut self, version: impl Into<String>) -> Self {
        self.resource_version = Some(version.into());
        self
    }

    /// The object name, or `None` when the reference cannot be resolved.
    #[must_use]
    pub fn resolved_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }
}

/// Error reported in-band by the template watch stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchError {
    pub code: Option<u16>,
    pub message: String,
}

impl WatchError {
    /// HTTP 410: the watch cursor is too old and must be reset.
    pub const GONE: u16 = 410;

    #[must_use]
    pub fn is_gone(&self) -> bool {
        self.code == Some(Self::GONE)
    }
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// One notification from the template watch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WatchEvent {
    Added(ObjectRef),
    Modified(ObjectRef),
    Deleted(ObjectRef),
    Bookmark { resource_version: String },
    Error(WatchError),
}

impl WatchEvent {
    /// Resource version carried by the event, used to resume a watch.
    #[must_use]
    pub fn resource_version(&self) -> Option<&str> {
        match self {
            Self::Added(obj) | Self::Modified(obj) | Self::Deleted(obj) => {
                obj.resource_version.as_deref()
            }
            Self::Bookmark { resource_version } => Some(resource_version),
            Self::Error(_) => None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Modified(_) => "modified",
            Self::Deleted(_) => "deleted",
            Self::Bookmark { .. } => "bookmark",
            Self::Error(_) => "error",
        }
    }
}
