//! Run shell commands with deterministic output file semantics
//!

use std::process::{Command, Stdio};

use camino::Utf8Path;
use log::{debug, error, info};
use simple_error::{SimpleResult, bail, try_with};

use crate::os_utils::{create_dir_all, is_non_empty_file};

#[derive(Clone, Debug, PartialEq)]
pub enum ProcessOutcome {
    Completed,

    /// The expected output file already existed, so the command was not run
    Reused,

    /// Command returned a non-zero status and the caller asked to continue
    Failed { code: Option<i32>, stderr: String },
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Seam used by job submission to execute a fully formatted command line
///
pub trait CommandRunner {
    /// # Arguments
    /// * `output_path` - If given, stdout is redirected here through a temporary file
    /// * `exit_on_error` - Convert a non-zero exit status into an error
    /// * `reuse_if_exists` - Skip the command if `output_path` already holds a non-empty file
    ///
    fn run_command(
        &mut self,
        cmdline: &str,
        output_path: Option<&Utf8Path>,
        exit_on_error: bool,
        reuse_if_exists: bool,
    ) -> SimpleResult<ProcessOutcome>;
}

/// Runs commands through `sh -c`
#[derive(Default)]
pub struct ExternalProcess {
    /// Log every command line at info level instead of debug
    pub verbose: bool,
}

impl ExternalProcess {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn log_cmdline(&self, cmdline: &str) {
        if self.verbose {
            info!("{cmdline}");
        } else {
            debug!("{cmdline}");
        }
    }

    fn handle_failure(
        &self,
        cmdline: &str,
        code: Option<i32>,
        stderr: String,
        exit_on_error: bool,
    ) -> SimpleResult<ProcessOutcome> {
        if !stderr.trim().is_empty() {
            error!("{}", stderr.trim_end());
        }
        let status = code.map_or("<signal>".to_string(), |x| x.to_string());
        if exit_on_error {
            bail!("Command returned status {status}: {cmdline}");
        }
        error!("Command returned status {status}");
        Ok(ProcessOutcome::Failed { code, stderr })
    }

    fn run_to_file(
        &self,
        cmdline: &str,
        output_path: &Utf8Path,
        exit_on_error: bool,
    ) -> SimpleResult<ProcessOutcome> {
        let parent = match output_path.parent() {
            Some(x) if !x.as_str().is_empty() => x,
            _ => Utf8Path::new("."),
        };
        create_dir_all(parent, "output")?;

        // stdout lands in a sibling temp file so an interrupted command never leaves a file that
        // looks finished at output_path
        let tmp_file = try_with!(
            tempfile::Builder::new().prefix(".tx.").tempfile_in(parent),
            "Unable to create temporary output file in '{parent}'"
        );
        let stdout_file = try_with!(tmp_file.reopen(), "Unable to open temporary output file");

        self.log_cmdline(&format!("{cmdline} > {output_path}"));
        let output = spawn_and_wait(cmdline, Stdio::from(stdout_file))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return self.handle_failure(cmdline, output.status.code(), stderr, exit_on_error);
        }

        try_with!(
            tmp_file.persist(output_path),
            "Unable to move command output to '{output_path}'"
        );
        Ok(ProcessOutcome::Completed)
    }

    fn run_captured(&self, cmdline: &str, exit_on_error: bool) -> SimpleResult<ProcessOutcome> {
        self.log_cmdline(cmdline);
        let output = spawn_and_wait(cmdline, Stdio::piped())?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            debug!("   {line}");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return self.handle_failure(cmdline, output.status.code(), stderr, exit_on_error);
        }
        Ok(ProcessOutcome::Completed)
    }
}

fn spawn_and_wait(cmdline: &str, stdout: Stdio) -> SimpleResult<std::process::Output> {
    let child = Command::new("sh")
        .arg("-c")
        .arg(cmdline)
        .stdout(stdout)
        .stderr(Stdio::piped())
        .spawn();
    let child = try_with!(child, "Unable to launch shell for command: {cmdline}");
    Ok(try_with!(
        child.wait_with_output(),
        "Failed waiting for command: {cmdline}"
    ))
}

impl CommandRunner for ExternalProcess {
    fn run_command(
        &mut self,
        cmdline: &str,
        output_path: Option<&Utf8Path>,
        exit_on_error: bool,
        reuse_if_exists: bool,
    ) -> SimpleResult<ProcessOutcome> {
        if let Some(output_path) = output_path {
            if reuse_if_exists && is_non_empty_file(output_path) {
                info!("{output_path} exists, reusing");
                return Ok(ProcessOutcome::Reused);
            }
            self.run_to_file(cmdline, output_path, exit_on_error)
        } else {
            self.run_captured(cmdline, exit_on_error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn temp_path(dir: &tempfile::TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap()
    }

    #[test]
    fn test_stdout_redirect() {
        let dir = tempfile::tempdir().unwrap();
        let out = temp_path(&dir, "out.txt");
        let mut runner = ExternalProcess::default();
        let rc = runner
            .run_command("echo hello", Some(&out), true, false)
            .unwrap();
        assert_eq!(rc, ProcessOutcome::Completed);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hello\n");
    }

    #[test]
    fn test_reuse_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = temp_path(&dir, "out.txt");
        std::fs::write(&out, "previous\n").unwrap();

        let mut runner = ExternalProcess::default();
        let rc = runner
            .run_command("echo new", Some(&out), true, true)
            .unwrap();
        assert_eq!(rc, ProcessOutcome::Reused);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "previous\n");
    }

    #[test]
    fn test_empty_output_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let out = temp_path(&dir, "out.txt");
        std::fs::write(&out, "").unwrap();

        let mut runner = ExternalProcess::default();
        let rc = runner
            .run_command("echo new", Some(&out), true, true)
            .unwrap();
        assert_eq!(rc, ProcessOutcome::Completed);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "new\n");
    }

    #[test]
    fn test_failure_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = temp_path(&dir, "out.txt");

        let mut runner = ExternalProcess::default();
        let rc = runner
            .run_command("echo partial; echo oops >&2; exit 3", Some(&out), false, false)
            .unwrap();
        assert_eq!(
            rc,
            ProcessOutcome::Failed {
                code: Some(3),
                stderr: "oops\n".to_string()
            }
        );
        assert!(!out.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failure_is_error_when_fatal() {
        let mut runner = ExternalProcess::default();
        assert!(runner.run_command("exit 1", None, true, false).is_err());
        let rc = runner.run_command("exit 1", None, false, false).unwrap();
        assert!(!rc.is_success());
    }
}
