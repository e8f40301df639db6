//! Host identity and owner liveness.
//!
//! Every member file names the machine and execution (process) that wrote
//! it. On the same machine a dead owner can be detected and its entry
//! reclaimed; entries from other machines are always trusted because remote
//! liveness cannot be verified.

use crate::error::{BakeryError, Result};

/// Identity written into every member file this locker creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    /// Opaque identifier of this machine.
    pub machine_id: String,

    /// Opaque identifier of this process (or thread) on the machine.
    pub execution_id: String,
}

impl HostIdentity {
    /// Build an identity from explicit identifiers.
    pub fn new(machine_id: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self {
            machine_id: machine_id.into(),
            execution_id: execution_id.into(),
        }
    }

    /// Identity of the running process: sanitized hostname and process id.
    pub fn current() -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self::new(sanitize_machine_id(&host), std::process::id().to_string())
    }

    /// Check that both identifiers can be stored as whitespace-delimited tokens.
    pub fn validate(&self) -> Result<()> {
        validate_token("machine id", &self.machine_id)?;
        validate_token("execution id", &self.execution_id)
    }
}

fn validate_token(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(BakeryError::InvalidIdentity(format!("{} must not be empty", what)));
    }
    if let Some(bad) = value
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || *c == '/' || *c == '\\')
    {
        return Err(BakeryError::InvalidIdentity(format!(
            "{} '{}' contains forbidden character {:?}",
            what, value, bad
        )));
    }
    Ok(())
}

/// Replace anything that is not safe in a path or a member file token.
pub fn sanitize_machine_id(raw: &str) -> String {
    let sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

/// Liveness and machine comparison used to reclaim abandoned entries.
pub trait OwnerCheck: Send + Sync {
    /// Whether the execution that wrote an entry on this machine still exists.
    fn is_valid_owner(&self, execution_id: &str, payload: &str) -> bool;

    /// Whether two machine identifiers name the same host.
    fn machine_id_match(&self, a: &str, b: &str) -> bool {
        a == b
    }
}

/// Owner check backed by the operating system's process table.
///
/// The leading decimal digits of the execution id are taken as a process id.
/// Anything that cannot be verified is reported alive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOwnerCheck;

impl OwnerCheck for ProcessOwnerCheck {
    fn is_valid_owner(&self, execution_id: &str, _payload: &str) -> bool {
        match parse_pid(execution_id) {
            Some(pid) => process_exists(pid),
            None => true,
        }
    }
}

/// Leading decimal digits of an execution id.
pub fn parse_pid(execution_id: &str) -> Option<u32> {
    let digits: String = execution_id
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

#[cfg(unix)]
fn process_exists(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // kill(0, ..) addresses our own process group, which proves nothing.
    if pid == 0 {
        return true;
    }
    // kill(pid, 0) probes without delivering a signal; EPERM still means alive.
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        true
    } else {
        std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
    }
}

#[cfg(not(unix))]
fn process_exists(_pid: u32) -> bool {
    true
}
