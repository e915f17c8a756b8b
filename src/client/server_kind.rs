//! Server classification by URL pattern.

use std::fmt;

/// Where the orchestration server runs, derived from its URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerKind {
    /// `0.0.0.0` or `localhost`: a container on this machine.
    LocalDocker,
    /// Hosted Volair cloud (`valorlabs.com`).
    CloudVolair,
    /// `devserver` / `localserver`: a server process started by the client.
    LocalServer,
    CloudUnknown,
}

impl ServerKind {
    /// Classify `url` by substring. Earlier patterns take precedence.
    pub fn classify(url: &str) -> Self {
        if url.contains("0.0.0.0") || url.contains("localhost") {
            ServerKind::LocalDocker
        } else if url.contains("valorlabs.com") {
            ServerKind::CloudVolair
        } else if url.contains("devserver") || url.contains("localserver") {
            ServerKind::LocalServer
        } else {
            ServerKind::CloudUnknown
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ServerKind::LocalDocker => "Local(Docker)",
            ServerKind::CloudVolair => "Cloud(Volair)",
            ServerKind::LocalServer => "Local(LocalServer)",
            ServerKind::CloudUnknown => "Cloud(Unknown)",
        }
    }

    /// Whether the client must launch the server itself.
    pub fn needs_dev_server(&self) -> bool {
        matches!(self, ServerKind::LocalServer)
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
