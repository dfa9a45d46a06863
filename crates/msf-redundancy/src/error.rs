//! ---
//! msf_section: "07-resilience-fault-tolerance"
//! msf_subsection: "module"
//! msf_type: "source"
//! msf_scope: "code"
//! msf_description: "Failover decision engine and its collaborators."
//! msf_version: "v0.1.0"
//! msf_owner: "tbd"
//! ---

/// Result alias used throughout the failover crate.
pub type Result<T> = std::result::Result<T, FailoverError>;

/// Error type for the failover subsystem.
#[derive(Debug, thiserror::Error)]
pub enum FailoverError {
    /// Wrapper for IO errors encountered while touching the state directory.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// An external program could not be launched at all.
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        /// Program that was being executed.
        program: String,
        /// Underlying launch failure.
        #[source]
        source: std::io::Error,
    },
    /// An external program ran but reported failure.
    #[error("`{program}` exited with status {status}: {stderr}")]
    CommandFailed {
        /// Program that was executed.
        program: String,
        /// Exit status, `-1` when terminated by a signal.
        status: i32,
        /// Captured standard error, trimmed.
        stderr: String,
    },
    /// A configured health signature is not a valid pattern.
    #[error("invalid health signature `{pattern}`: {source}")]
    Signature {
        /// Offending pattern text.
        pattern: String,
        /// Compilation failure.
        #[source]
        source: regex::Error,
    },
    /// The runtime rejected an operation on an instance.
    #[error("runtime fault on instance `{instance}`: {reason}")]
    Runtime {
        /// Instance the operation targeted.
        instance: String,
        /// Reason reported by the runtime.
        reason: String,
    },
    /// Wrapper for Prometheus metrics registration failures.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failure_renders_program_and_status() {
        let err = FailoverError::CommandFailed {
            program: "docker".into(),
            status: 125,
            stderr: "No such container: plex".into(),
        };
        assert_eq!(
            err.to_string(),
            "`docker` exited with status 125: No such container: plex"
        );
    }
}
