//! Kubernetes-backed [`ClusterClient`].

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod as KubePod;
use kron_core::{
    ClusterClient, ClusterError, JobTemplate, NewExecution, Pod, ScheduledExecution, WatchEvent,
};
use kube::api::{Api, DeleteParams, ListParams, PostParams, WatchParams};
use kube::{Client, Config};

use crate::convert;
use crate::error::{classify, classify_named, ConnectError};

const JOB: &str = "job";
const POD: &str = "pod";

/// Talks to one namespace of a Kubernetes cluster.
#[derive(Clone)]
pub struct KubeClusterClient {
    jobs: Api<Job>,
    pods: Api<KubePod>,
}

impl KubeClusterClient {
    /// Connects to the cluster and verifies the API server answers.
    ///
    /// With `host` unset the configuration is inferred (in-cluster service
    /// account, then kubeconfig). With `host` set, the controller talks to
    /// that address directly.
    ///
    /// # Errors
    ///
    /// - [`ConnectError::Infer`] if no configuration can be inferred.
    /// - [`ConnectError::InvalidHost`] if `host` is not a valid URI.
    /// - [`ConnectError::Client`] if the HTTP client cannot be built.
    /// - [`ConnectError::Unreachable`] if the version probe fails.
    pub async fn connect(host: Option<&str>, namespace: &str) -> Result<Self, ConnectError> {
        let mut config = match host {
            Some(host) => {
                let uri = host
                    .parse::<http::Uri>()
                    .map_err(|source| ConnectError::InvalidHost {
                        host: host.to_string(),
                        source,
                    })?;
                Config::new(uri)
            }
            None => Config::infer().await?,
        };
        config.default_namespace = namespace.to_string();
        let cluster_url = config.cluster_url.to_string();

        let client = Client::try_from(config).map_err(ConnectError::Client)?;
        let version = client
            .apiserver_version()
            .await
            .map_err(|e| ConnectError::Unreachable(classify(e)))?;

        tracing::info!(
            cluster = %cluster_url,
            namespace,
            version = %version.git_version,
            "kube: connected"
        );

        Ok(Self::from_client(client, namespace))
    }

    /// Wraps an existing client without probing the server.
    #[must_use]
    pub fn from_client(client: Client, namespace: &str) -> Self {
        Self {
            jobs: Api::namespaced(client.clone(), namespace),
            pods: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn list_templates(&self, selector: &str) -> Result<Vec<JobTemplate>, ClusterError> {
        let jobs = self
            .jobs
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(classify)?;

        let mut templates = Vec::with_capacity(jobs.items.len());
        for job in jobs.items {
            match convert::template_from_job(job)? {
                Some(template) => templates.push(template),
                None => tracing::warn!("kube: ignoring template without a name"),
            }
        }
        Ok(templates)
    }

    async fn watch_templates(
        &self,
        selector: &str,
        resource_version: &str,
    ) -> Result<BoxStream<'static, WatchEvent>, ClusterError> {
        let stream = self
            .jobs
            .watch(&WatchParams::default().labels(selector), resource_version)
            .await
            .map_err(classify)?;
        Ok(stream.map(convert::watch_event).boxed())
    }

    async fn get_template(&self, name: &str) -> Result<JobTemplate, ClusterError> {
        let job = self
            .jobs
            .get(name)
            .await
            .map_err(|e| classify_named(e, JOB, name))?;
        convert::template_from_job(job)?.ok_or_else(|| ClusterError::NotFound {
            kind: JOB,
            name: name.to_string(),
        })
    }

    async fn create_execution(
        &self,
        execution: &NewExecution,
    ) -> Result<ScheduledExecution, ClusterError> {
        let job = convert::job_from_execution(execution)?;
        let created = self
            .jobs
            .create(&PostParams::default(), &job)
            .await
            .map_err(classify)?;
        Ok(convert::execution_from_job(created))
    }

    async fn list_executions(
        &self,
        selector: &str,
    ) -> Result<Vec<ScheduledExecution>, ClusterError> {
        let jobs = self
            .jobs
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(classify)?;
        Ok(jobs
            .items
            .into_iter()
            .map(convert::execution_from_job)
            .collect())
    }

    async fn delete_execution(&self, name: &str) -> Result<(), ClusterError> {
        self.jobs
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| classify_named(e, JOB, name))?;
        Ok(())
    }

    async fn list_pods(&self, selector: &str) -> Result<Vec<Pod>, ClusterError> {
        let pods = self
            .pods
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(classify)?;
        Ok(pods.items.into_iter().map(convert::pod_from_kube).collect())
    }

    async fn delete_pod(&self, name: &str) -> Result<(), ClusterError> {
        self.pods
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| classify_named(e, POD, name))?;
        Ok(())
    }
}
