// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Linux process-existence probing via `/proc/<pid>`, used by
//! `ClearWorker` to decide whether a stale `inbox:<pid>` mailbox can be
//! dropped.

/// Whether a process with the given pid is currently alive, per
/// `/proc/<pid>` existing.
pub fn process_exists(pid: u64) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_exists() {
        assert!(process_exists(std::process::id() as u64));
    }

    #[test]
    fn implausible_pid_does_not_exist() {
        assert!(!process_exists(u64::MAX));
    }
}
