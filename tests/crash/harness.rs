//! Subprocess management for crash tests

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use segwal::crash_point::CRASH_POINT_ENV;

/// Environment variable telling a child test where its log lives
pub const CHILD_DIR_ENV: &str = "SEGWAL_CRASH_CHILD_DIR";

/// Result of a crash test execution
#[derive(Debug)]
pub struct CrashTestResult {
    /// Exit status of the child
    pub exit_status: ExitStatus,
    /// stderr output
    pub stderr: String,
}

impl CrashTestResult {
    /// Whether the child died at its crash point
    pub fn crashed(&self) -> bool {
        !self.exit_status.success() && self.stderr.contains("[CRASH] Triggering crash")
    }
}

/// Returns the log directory when running as a crash child.
///
/// Child tests return early when this is `None`, so they pass trivially in
/// a normal test run.
pub fn child_log_dir() -> Option<PathBuf> {
    std::env::var_os(CHILD_DIR_ENV).map(PathBuf::from)
}

/// Re-runs this test binary restricted to `child_test` with `crash_point`
/// enabled.
pub fn run_child_with_crash_point(
    child_test: &str,
    crash_point: &str,
    log_dir: &Path,
) -> CrashTestResult {
    let exe = std::env::current_exe().expect("Failed to locate test binary");
    let output = Command::new(exe)
        .args([child_test, "--exact", "--nocapture", "--test-threads=1"])
        .env(CRASH_POINT_ENV, crash_point)
        .env(CHILD_DIR_ENV, log_dir)
        .output()
        .expect("Failed to spawn crash child");

    CrashTestResult {
        exit_status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}
