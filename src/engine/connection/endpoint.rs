//! Where the container engine listens, and how that was decided.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};

/// Variables consulted, in order, when no endpoint is configured.
const ENDPOINT_VARS: [&str; 3] = ["DOCKER_HOST", "CONTAINER_HOST", "PODMAN_HOST"];

/// Address of a container engine API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEndpoint {
    /// Unix domain socket on the local host.
    Unix(Utf8PathBuf),
    /// Windows named pipe, e.g. `//./pipe/docker_engine`.
    NamedPipe(String),
    /// Remote API over HTTP or HTTPS. `tcp://` is rewritten to `http://`.
    Http(String),
}

/// Source of a resolved [`EngineEndpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointOrigin {
    /// `--engine-socket`, `engine_socket`, or `TRAINBOT_ENGINE_SOCKET`.
    Configured,
    /// One of the engine host variables.
    Environment(&'static str),
    /// Nothing was set.
    PlatformDefault,
}

impl EngineEndpoint {
    /// Interpret `raw` as an engine address.
    ///
    /// Strings without a scheme are paths: those starting with `//` or `\\`
    /// are named pipes, everything else a Unix socket.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let address = raw.trim();
        if let Some(path) = address.strip_prefix("unix://") {
            return Self::Unix(Utf8PathBuf::from(path));
        }
        if let Some(pipe) = address.strip_prefix("npipe://") {
            return Self::NamedPipe(String::from(pipe));
        }
        if let Some(authority) = address.strip_prefix("tcp://") {
            return Self::Http(format!("http://{authority}"));
        }
        if address.starts_with("http://") || address.starts_with("https://") {
            return Self::Http(String::from(address));
        }
        if address.starts_with("//") || address.starts_with("\\\\") {
            return Self::NamedPipe(String::from(address));
        }
        Self::Unix(Utf8PathBuf::from(address))
    }

    /// Pick the endpoint from the configured value, then the engine host
    /// variables, then the platform default. Blank values are skipped.
    #[must_use]
    pub fn resolve<E: mockable::Env>(configured: Option<&str>, env: &E) -> (Self, EndpointOrigin) {
        if let Some(raw) = configured.filter(|raw| !raw.trim().is_empty()) {
            return (Self::parse(raw), EndpointOrigin::Configured);
        }

        ENDPOINT_VARS
            .into_iter()
            .find_map(|name| {
                env.string(name)
                    .filter(|raw| !raw.trim().is_empty())
                    .map(|raw| (Self::parse(&raw), EndpointOrigin::Environment(name)))
            })
            .unwrap_or_else(|| (Self::platform_default(), EndpointOrigin::PlatformDefault))
    }

    /// The engine's default local endpoint.
    #[must_use]
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            Self::NamedPipe(String::from("//./pipe/docker_engine"))
        } else {
            Self::Unix(Utf8PathBuf::from("/var/run/docker.sock"))
        }
    }

    /// Filesystem location of a local endpoint; `None` for HTTP.
    #[must_use]
    pub fn local_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix(path) => Some(path.as_path()),
            Self::NamedPipe(pipe) => Some(Utf8Path::new(pipe)),
            Self::Http(_) => None,
        }
    }
}

impl fmt::Display for EngineEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{path}"),
            Self::NamedPipe(pipe) => write!(f, "npipe://{pipe}"),
            Self::Http(url) => f.write_str(url),
        }
    }
}

impl fmt::Display for EndpointOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configured => f.write_str("configuration"),
            Self::Environment(name) => write!(f, "${name}"),
            Self::PlatformDefault => f.write_str("platform default"),
        }
    }
}
