use std::time::Duration;

/// Options for an [`HttpClient`](crate::HttpClient).
#[derive(Clone)]
pub struct HttpOptions {
    /// `User-Agent` to send when a request does not set one. When `None`, a default derived
    /// from the package metadata is used.
    pub user_agent: Option<String>,

    /// TCP keepalive time in seconds.
    pub tcp_keepalive: Option<u32>,

    /// Upper bound for a complete request including reading the body.
    pub request_timeout: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            user_agent: None,
            tcp_keepalive: Some(120),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl HttpOptions {
    pub(crate) fn user_agent(&self) -> &str {
        const DEFAULT_USER_AGENT: &str = concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION"),
            " (+",
            env!("CARGO_PKG_HOMEPAGE"),
            "; tokio)"
        );

        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }
}
