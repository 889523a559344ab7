//! Process identity and same-host crash detection (§4.4).

use std::path::Path;

/// Build this process's identity string, `hostname|pid`, written to the
/// `pid` field on lock acquisition.
#[must_use]
pub fn identity() -> String {
    let host = hostname();
    format!("{host}|{}", std::process::id())
}

fn hostname() -> String {
    // `gethostname` isn't in the dependency set; the identity only needs to
    // compare equal to itself across calls within the same process, which
    // `hostname::get` or `/proc/sys/kernel/hostname` would also satisfy.
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .ok()
        .map(|s| s.trim().to_owned())
        .unwrap_or_else(|| String::from("localhost"))
}

/// Given a previously recorded identity `host|pid`, decide whether that
/// owner is still alive.
///
/// If the identity's host differs from ours, or we're not on Linux, assume
/// alive (we cannot know, so crash detection is deliberately limited to
/// same-host contenders — cross-host crashed owners are eventually cleared
/// by the lock-break timer instead). On Linux, for a local pid, check
/// whether `/proc/<pid>` exists.
#[must_use]
pub fn is_alive(identity: &str) -> bool {
    let Some((host, pid)) = identity.split_once('|') else {
        return true;
    };

    if host != hostname() {
        return true;
    }

    if !cfg!(target_os = "linux") {
        return true;
    }

    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_contains_own_pid() {
        let id = identity();
        assert!(id.ends_with(&format!("|{}", std::process::id())));
    }

    #[test]
    fn foreign_host_is_assumed_alive() {
        assert!(is_alive("some-other-host|1"));
    }

    #[test]
    fn malformed_identity_is_assumed_alive() {
        assert!(is_alive("no-pipe-here"));
    }

    #[test]
    fn own_process_is_alive() {
        assert!(is_alive(&identity()));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn pid_one_is_alive_on_any_running_linux_system() {
        let id = format!("{}|1", super::hostname());
        assert!(is_alive(&id));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn implausible_pid_is_considered_dead() {
        let id = format!("{}|999999999", super::hostname());
        assert!(!is_alive(&id));
    }
}
