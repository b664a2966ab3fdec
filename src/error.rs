use std::path::PathBuf;

/// Error type for build request processing
#[derive(Debug)]
pub enum BuildError {
    /// Unparsable or out-of-range version, malformed config value
    Configuration(String),
    /// Toolchain scripts could not be marked executable
    Permission {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The toolchain entry point exited non-zero (or was killed)
    ToolchainExecution { runtime: String, code: Option<i32> },
    /// IO error outside the permission grant
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl BuildError {
    pub fn config(msg: impl Into<String>) -> Self {
        BuildError::Configuration(msg.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        BuildError::Io {
            context: context.into(),
            source,
        }
    }

    /// Execution failures are isolated per runtime version; everything else aborts the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BuildError::ToolchainExecution { .. })
    }
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            BuildError::Permission { path, source } => write!(
                f,
                "Permission error: cannot mark {} executable: {}",
                path.display(),
                source
            ),
            BuildError::ToolchainExecution { runtime, code } => match code {
                Some(code) => write!(
                    f,
                    "Toolchain failed for Python {} (exit code {})",
                    runtime, code
                ),
                None => write!(
                    f,
                    "Toolchain failed for Python {} (terminated by signal)",
                    runtime
                ),
            },
            BuildError::Io { context, source } => write!(f, "{}: {}", context, source),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Permission { source, .. } | BuildError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BuildError {
    fn from(e: std::io::Error) -> Self {
        BuildError::io("IO error", e)
    }
}
