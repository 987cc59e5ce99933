#[derive(Debug)]
#[non_exhaustive]
pub(crate) enum SnapshotError {
    Io(std::io::Error),
    Hyper(hyper::Error),
    HyperUtil(hyper_util::client::legacy::Error),
    Http(hyper::http::Error),
    Json(serde_json::Error),
    /// Upstream discovery or probing failed in a non-404 way.
    Index(String),
    /// Cache file open/lock/read/write failure or malformed content.
    Cache(String),
    /// Proxy socket setup failure.
    Proxy(String),
}

impl SnapshotError {
    #[must_use]
    pub(crate) fn index<T: Into<String>>(msg: T) -> Self {
        Self::Index(msg.into())
    }

    #[must_use]
    pub(crate) fn cache<T: Into<String>>(msg: T) -> Self {
        Self::Cache(msg.into())
    }

    #[must_use]
    pub(crate) fn proxy<T: Into<String>>(msg: T) -> Self {
        Self::Proxy(msg.into())
    }
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => e.fmt(f),
            Self::Hyper(e) => e.fmt(f),
            Self::HyperUtil(e) => e.fmt(f),
            Self::Http(e) => e.fmt(f),
            Self::Json(e) => e.fmt(f),
            Self::Index(msg) | Self::Cache(msg) | Self::Proxy(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Hyper(e) => Some(e),
            Self::HyperUtil(e) => Some(e),
            Self::Http(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Index(_) | Self::Cache(_) | Self::Proxy(_) => None,
        }
    }
}

impl From<std::io::Error> for SnapshotError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<hyper::Error> for SnapshotError {
    fn from(value: hyper::Error) -> Self {
        Self::Hyper(value)
    }
}

impl From<hyper_util::client::legacy::Error> for SnapshotError {
    fn from(value: hyper_util::client::legacy::Error) -> Self {
        Self::HyperUtil(value)
    }
}

impl From<hyper::http::Error> for SnapshotError {
    fn from(value: hyper::http::Error) -> Self {
        Self::Http(value)
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
