//! Label, annotation and selector conventions shared by the controller and
//! the templates it watches.

use std::collections::BTreeMap;

/// Annotation on a template holding its cron expression.
pub const SCHEDULE_ANNOTATION: &str = "schedule";

/// Marker label identifying schedulable templates.
pub const SCHEDULABLE_LABEL: &str = "kron";
pub const SCHEDULABLE_VALUE: &str = "true";

/// Marker label on every execution created by the controller.
pub const ORIGIN_LABEL: &str = "origin";
pub const ORIGIN_VALUE: &str = "kron";

/// Back-reference from an execution to its template.
pub const TEMPLATE_LABEL: &str = "template";

/// Label the cluster puts on pods owned by an execution.
pub const CORRELATION_LABEL: &str = "controller-uid";

pub const EXECUTION_NAME_PREFIX: &str = "kron-";

/// Default selector for schedulable templates (`kron=true`).
#[must_use]
pub fn template_selector() -> String {
    equality_selector(SCHEDULABLE_LABEL, SCHEDULABLE_VALUE)
}

/// Selector for executions created by the controller (`origin=kron`).
#[must_use]
pub fn execution_selector() -> String {
    equality_selector(ORIGIN_LABEL, ORIGIN_VALUE)
}

/// Selector for the pods belonging to the execution with the given uid.
#[must_use]
pub fn correlation_selector(uid: &str) -> String {
    equality_selector(CORRELATION_LABEL, uid)
}

/// `generateName` for executions of `template`; the cluster appends the suffix.
#[must_use]
pub fn execution_generate_name(template: &str) -> String {
    format!("{EXECUTION_NAME_PREFIX}{template}-")
}

fn equality_selector(key: &str, value: &str) -> String {
    format!("{key}={value}")
}

/// Whether `labels` satisfy a label selector.
///
/// Understands the equality forms `k=v`, `k==v`, `k!=v`, `k` and `!k`.
/// Set-based selectors (`k in (a,b)`) are left to the API server and always
/// match here. An empty selector matches everything.
#[must_use]
pub fn selector_matches(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    if selector.contains('(') {
        return true;
    }
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| term_matches(term, labels))
}

fn term_matches(term: &str, labels: &BTreeMap<String, String>) -> bool {
    let value_of = |key: &str| labels.get(key.trim()).map(String::as_str);

    if let Some((key, value)) = term.split_once("!=") {
        return value_of(key) != Some(value.trim());
    }
    if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
        return value_of(key) == Some(value.trim());
    }
    match term.strip_prefix('!') {
        Some(key) => value_of(key).is_none(),
        None => value_of(term).is_some(),
    }
}
