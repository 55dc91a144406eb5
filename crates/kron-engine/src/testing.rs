//! In-memory [`ClusterClient`] used by the engine and collector tests.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use kron_core::labels::{correlation_selector, TEMPLATE_LABEL};
use kron_core::{
    ClusterClient, ClusterError, JobTemplate, NewExecution, Pod, ScheduledExecution, WatchEvent,
};

#[derive(Default)]
struct State {
    templates: BTreeMap<String, JobTemplate>,
    executions: Vec<ScheduledExecution>,
    /// (pod name, owning execution uid)
    pods: Vec<(String, String)>,
    created: Vec<NewExecution>,
    watch_batches: VecDeque<Vec<WatchEvent>>,
    watch_versions: Vec<String>,
    template_lists: usize,
    /// Removes a template right before the list call with this index.
    vanish_before_list: Option<(usize, String)>,
    fail_creates: u32,
    fail_list_executions: bool,
    fail_delete_executions: HashSet<String>,
    fail_delete_pods: HashSet<String>,
    watch_calls: usize,
    /// Fails the watch call with this index.
    watch_failure: Option<(usize, ClusterError)>,
    seq: u32,
}

#[derive(Default)]
pub(crate) struct FakeCluster {
    state: Mutex<State>,
}

pub(crate) fn template(name: &str, schedule: Option<&str>) -> JobTemplate {
    let mut labels = BTreeMap::new();
    labels.insert("kron".to_string(), "true".to_string());
    JobTemplate {
        name: name.to_string(),
        labels,
        schedule: schedule.map(str::to_string),
        spec: serde_json::json!({
            "containers": [{ "name": "main", "image": format!("{name}:latest") }],
            "restartPolicy": "Never",
        }),
    }
}

impl FakeCluster {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub(crate) fn put_template(&self, template: JobTemplate) {
        self.state().templates.insert(template.name.clone(), template);
    }

    pub(crate) fn remove_template(&self, name: &str) {
        self.state().templates.remove(name);
    }

    pub(crate) fn add_execution(&self, name: &str, uid: &str, created_at: DateTime<Utc>) {
        self.state().executions.push(ScheduledExecution {
            name: name.to_string(),
            uid: Some(uid.to_string()),
            template: None,
            created_at: Some(created_at),
        });
    }

    pub(crate) fn add_raw_execution(&self, execution: ScheduledExecution) {
        self.state().executions.push(execution);
    }

    pub(crate) fn add_pod(&self, name: &str, uid: &str) {
        self.state().pods.push((name.to_string(), uid.to_string()));
    }

    pub(crate) fn queue_watch(&self, events: Vec<WatchEvent>) {
        self.state().watch_batches.push_back(events);
    }

    pub(crate) fn fail_next_creates(&self, count: u32) {
        self.state().fail_creates = count;
    }

    pub(crate) fn fail_list_executions(&self) {
        self.state().fail_list_executions = true;
    }

    pub(crate) fn fail_delete_execution(&self, name: &str) {
        self.state().fail_delete_executions.insert(name.to_string());
    }

    pub(crate) fn fail_delete_pod(&self, name: &str) {
        self.state().fail_delete_pods.insert(name.to_string());
    }

    pub(crate) fn vanish_before_list(&self, call: usize, name: &str) {
        self.state().vanish_before_list = Some((call, name.to_string()));
    }

    pub(crate) fn fail_watch_call(&self, call: usize, err: ClusterError) {
        self.state().watch_failure = Some((call, err));
    }

    pub(crate) fn created(&self) -> Vec<NewExecution> {
        self.state().created.clone()
    }

    pub(crate) fn created_for(&self, template: &str) -> usize {
        self.state()
            .created
            .iter()
            .filter(|e| e.labels.get(TEMPLATE_LABEL).map(String::as_str) == Some(template))
            .count()
    }

    pub(crate) fn execution_names(&self) -> Vec<String> {
        self.state()
            .executions
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    pub(crate) fn pod_names(&self) -> Vec<String> {
        self.state().pods.iter().map(|(n, _)| n.clone()).collect()
    }

    pub(crate) fn watch_versions(&self) -> Vec<String> {
        self.state().watch_versions.clone()
    }

    pub(crate) fn template_lists(&self) -> usize {
        self.state().template_lists
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_templates(&self, _selector: &str) -> Result<Vec<JobTemplate>, ClusterError> {
        let mut state = self.state();
        let call = state.template_lists;
        state.template_lists += 1;
        if let Some((n, name)) = state.vanish_before_list.clone() {
            if n == call {
                state.templates.remove(&name);
            }
        }
        Ok(state.templates.values().cloned().collect())
    }

    async fn watch_templates(
        &self,
        _selector: &str,
        resource_version: &str,
    ) -> Result<BoxStream<'static, WatchEvent>, ClusterError> {
        let mut state = self.state();
        let call = state.watch_calls;
        state.watch_calls += 1;
        if let Some((n, _)) = &state.watch_failure {
            if *n == call {
                let (_, err) = state.watch_failure.take().unwrap();
                return Err(err);
            }
        }
        state.watch_versions.push(resource_version.to_string());
        match state.watch_batches.pop_front() {
            Some(batch) => Ok(stream::iter(batch).boxed()),
            None => Ok(stream::pending().boxed()),
        }
    }

    async fn get_template(&self, name: &str) -> Result<JobTemplate, ClusterError> {
        self.state()
            .templates
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound {
                kind: "job",
                name: name.to_string(),
            })
    }

    async fn create_execution(
        &self,
        execution: &NewExecution,
    ) -> Result<ScheduledExecution, ClusterError> {
        let mut state = self.state();
        if state.fail_creates > 0 {
            state.fail_creates -= 1;
            return Err(ClusterError::Api {
                code: 500,
                message: "etcdserver: request timed out".to_string(),
            });
        }
        state.seq += 1;
        let created = ScheduledExecution {
            name: format!("{}{:05}", execution.generate_name, state.seq),
            uid: Some(format!("uid-{}", state.seq)),
            template: execution.template_name().map(str::to_string),
            created_at: Some(Utc::now()),
        };
        state.created.push(execution.clone());
        state.executions.push(created.clone());
        Ok(created)
    }

    async fn list_executions(
        &self,
        _selector: &str,
    ) -> Result<Vec<ScheduledExecution>, ClusterError> {
        let state = self.state();
        if state.fail_list_executions {
            return Err(ClusterError::Transport("connection refused".to_string()));
        }
        Ok(state.executions.clone())
    }

    async fn delete_execution(&self, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state();
        if state.fail_delete_executions.contains(name) {
            return Err(ClusterError::Api {
                code: 409,
                message: "conflict".to_string(),
            });
        }
        state.executions.retain(|e| e.name != name);
        Ok(())
    }

    async fn list_pods(&self, selector: &str) -> Result<Vec<Pod>, ClusterError> {
        Ok(self
            .state()
            .pods
            .iter()
            .filter(|(_, uid)| correlation_selector(uid) == selector)
            .map(|(name, _)| Pod { name: name.clone() })
            .collect())
    }

    async fn delete_pod(&self, name: &str) -> Result<(), ClusterError> {
        let mut state = self.state();
        if state.fail_delete_pods.contains(name) {
            return Err(ClusterError::Transport("broken pipe".to_string()));
        }
        state.pods.retain(|(n, _)| n != name);
        Ok(())
    }
}
