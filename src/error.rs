// Third Party
use kube::error::ErrorResponse;

// Local
use crate::envelope::ResourceKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid resource version {0:?}")]
    InvalidResourceVersion(String),

    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),

    #[error("watch for {0} closed before it was established")]
    WatchClosed(ResourceKind),

    #[error("watcher panicked: {0}")]
    WatcherPanicked(String),
}

impl Error {
    /// HTTP status code of the API response behind this error, if there was one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Kube(kube::Error::Api(ErrorResponse { code, .. })) => Some(*code),
            _ => None,
        }
    }

    /// The requested resource version is too old for the API server to serve.
    pub fn is_gone(&self) -> bool {
        self.status_code() == Some(410)
    }

    /// Errors that no amount of retrying will fix. A watch loop that hits one of these
    /// while opening its stream gives up on its resource kind.
    pub fn is_fatal_for_watch(&self) -> bool {
        match self {
            Error::InvalidResourceVersion(_) => true,
            Error::Kube(kube::Error::Api(ErrorResponse { code, .. })) => {
                matches!(code, 400 | 401 | 403 | 404 | 422)
            }
            _ => false,
        }
    }
}
