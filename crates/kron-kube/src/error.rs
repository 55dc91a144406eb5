use kron_core::ClusterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to infer cluster configuration: {0}")]
    Infer(#[from] kube::config::InferConfigError),

    #[error("invalid API server address {host:?}: {source}")]
    InvalidHost {
        host: String,
        #[source]
        source: http::uri::InvalidUri,
    },

    #[error("failed to build cluster client: {0}")]
    Client(#[source] kube::Error),

    #[error("API server is unreachable: {0}")]
    Unreachable(#[source] ClusterError),
}

/// Maps a failed API call that does not address a single object.
pub(crate) fn classify(err: kube::Error) -> ClusterError {
    match err {
        kube::Error::Api(response) => ClusterError::Api {
            code: response.code,
            message: response.message,
        },
        kube::Error::SerdeError(source) => ClusterError::Decode {
            context: "API response".to_string(),
            source,
        },
        other => ClusterError::Transport(other.to_string()),
    }
}

/// Maps a failed call on the named object; 404 becomes [`ClusterError::NotFound`].
pub(crate) fn classify_named(err: kube::Error, kind: &'static str, name: &str) -> ClusterError {
    match err {
        kube::Error::Api(response) if response.code == 404 => ClusterError::NotFound {
            kind,
            name: name.to_string(),
        },
        kube::Error::SerdeError(source) => ClusterError::Decode {
            context: format!("{kind} {name}"),
            source,
        },
        other => classify(other),
    }
}
