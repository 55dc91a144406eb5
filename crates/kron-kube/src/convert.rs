//! Conversions between Kubernetes objects and the controller's model.

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Pod as KubePod, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kron_core::labels::{SCHEDULE_ANNOTATION, TEMPLATE_LABEL};
use kron_core::{
    ClusterError, JobTemplate, NewExecution, ObjectRef, Pod, ScheduledExecution, WatchError,
    WatchEvent,
};

/// Reads a template Job. Returns `None` for an object without a name.
pub(crate) fn template_from_job(job: Job) -> Result<Option<JobTemplate>, ClusterError> {
    let Some(name) = job.metadata.name.filter(|n| !n.is_empty()) else {
        return Ok(None);
    };

    let schedule = job
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(SCHEDULE_ANNOTATION))
        .cloned();

    let pod_spec = job.spec.and_then(|s| s.template.spec);
    let spec = match pod_spec {
        Some(pod_spec) => serde_json::to_value(pod_spec).map_err(|source| ClusterError::Decode {
            context: format!("pod spec of template {name}"),
            source,
        })?,
        None => serde_json::Value::Null,
    };

    Ok(Some(JobTemplate {
        name,
        labels: job.metadata.labels.unwrap_or_default(),
        schedule,
        spec,
    }))
}

/// Builds the Job submitted for one execution. Only the pod spec is copied
/// from the template; everything else is left to cluster defaults.
pub(crate) fn job_from_execution(execution: &NewExecution) -> Result<Job, ClusterError> {
    let pod_spec: PodSpec =
        serde_json::from_value(execution.spec.clone()).map_err(|source| ClusterError::Decode {
            context: format!("pod spec for {}", execution.generate_name),
            source,
        })?;

    Ok(Job {
        metadata: ObjectMeta {
            generate_name: Some(execution.generate_name.clone()),
            labels: Some(execution.labels.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(JobSpec {
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(pod_spec),
            },
            ..JobSpec::default()
        }),
        status: None,
    })
}

pub(crate) fn execution_from_job(job: Job) -> ScheduledExecution {
    let template = job
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(TEMPLATE_LABEL))
        .cloned();

    ScheduledExecution {
        name: job.metadata.name.unwrap_or_default(),
        uid: job.metadata.uid,
        template,
        created_at: job.metadata.creation_timestamp.map(|t| t.0),
    }
}

pub(crate) fn pod_from_kube(pod: KubePod) -> Pod {
    Pod {
        name: pod.metadata.name.unwrap_or_default(),
    }
}

pub(crate) fn watch_event(
    item: Result<kube::core::WatchEvent<Job>, kube::Error>,
) -> WatchEvent {
    use kube::core::WatchEvent as Raw;

    match item {
        Ok(Raw::Added(job)) => WatchEvent::Added(object_ref(&job)),
        Ok(Raw::Modified(job)) => WatchEvent::Modified(object_ref(&job)),
        Ok(Raw::Deleted(job)) => WatchEvent::Deleted(object_ref(&job)),
        Ok(Raw::Bookmark(bookmark)) => WatchEvent::Bookmark {
            resource_version: bookmark.metadata.resource_version,
        },
        Ok(Raw::Error(response)) | Err(kube::Error::Api(response)) => {
            WatchEvent::Error(WatchError {
                code: Some(response.code),
                message: response.message,
            })
        }
        Err(err) => WatchEvent::Error(WatchError {
            code: None,
            message: err.to_string(),
        }),
    }
}

fn object_ref(job: &Job) -> ObjectRef {
    ObjectRef {
        name: job.metadata.name.clone(),
        resource_version: job.metadata.resource_version.clone(),
    }
}
