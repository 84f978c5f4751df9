//! Session abstraction and the operations built on it.
//!
//! The [`Session`] trait only has the transport primitives (execute one
//! line, create a directory, write a file). Everything the provisioning
//! pipeline needs is layered on top by [`SessionExt`], so the real SSH
//! session and the scripted mock share the same behavior.

use crate::command::{
    ASKPASS_PATH, ExecOutput, Privilege, RemoteCommand, STAGING_PREFIX, Secret, ValidationMode,
    askpass_install_line, quote, remote_parent,
};
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use log::{debug, info};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// An authenticated channel to one host.
///
/// Calls are not guaranteed safe to interleave from several threads; one
/// owner issues commands sequentially.
pub trait Session: Send {
    /// Address of the host this session is bound to.
    fn host(&self) -> &str;

    /// Execute one shell line. Only transport failures are errors; the exit
    /// status is reported in the output.
    fn exec(&self, line: &str) -> Result<ExecOutput>;

    /// Create a remote directory and its parents.
    fn create_dir_all(&self, path: &str) -> Result<()>;

    /// Create or truncate a remote file and stream `contents` into it.
    fn write_file(&self, path: &str, contents: &mut dyn Read) -> Result<u64>;
}

/// Opens sessions from credentials.
pub trait Connector: Send + Sync {
    fn connect(&self, credentials: &Credentials) -> Result<Box<dyn Session>>;
}

/// Provisioning operations available on every [`Session`].
pub trait SessionExt: Session {
    /// Run a command, discarding its output.
    fn run(&self, line: &str) -> Result<()> {
        self.run_captured(line).map(drop)
    }

    /// Run a command and return its standard output.
    fn run_captured(&self, line: &str) -> Result<String> {
        debug!("[{}] $ {}", self.host(), line);
        let output = self.exec(line)?;
        check_exit(self.host(), line, output)
    }

    /// Run a command and compare its output with `expected`.
    fn run_validated(&self, line: &str, expected: &str, mode: ValidationMode) -> Result<()> {
        let stdout = self.run_captured(line)?;
        check_output(self.host(), line, &stdout, expected, mode)
    }

    /// Run a structured command, escalating when it asks for root.
    ///
    /// With a password the askpass helper is installed first (two round
    /// trips); without one, `sudo -n` is used.
    fn execute(&self, command: &RemoteCommand, secret: &Secret) -> Result<String> {
        let line = match command.privilege {
            Privilege::User => return self.run_captured(&command.line),
            Privilege::Root => match secret.expose() {
                Some(password) => {
                    install_askpass(self, password)?;
                    command.resolve(true)
                }
                None => command.resolve(false),
            },
        };

        debug!("[{}] $ {}", self.host(), command);
        let output = self.exec(&line)?;
        check_exit(self.host(), &command.line, output)
    }

    /// Run a command through sudo.
    fn run_with_privilege(&self, line: &str, secret: &Secret) -> Result<()> {
        self.execute(&RemoteCommand::root(line), secret).map(drop)
    }

    /// Run a command through sudo and compare its output with `expected`.
    fn run_validated_with_privilege(
        &self,
        line: &str,
        expected: &str,
        mode: ValidationMode,
        secret: &Secret,
    ) -> Result<()> {
        let stdout = self.execute(&RemoteCommand::root(line), secret)?;
        check_output(self.host(), line, &stdout, expected, mode)
    }

    /// Copy a local file to `remote`, creating its parent directory and
    /// overwriting any existing file.
    fn transfer(&self, local: &Path, remote: &str) -> Result<()> {
        let mut file = open_local(self.host(), local, remote)?;
        if let Some(parent) = remote_parent(remote) {
            self.create_dir_all(parent)?;
        }
        let bytes = self.write_file(remote, &mut file)?;
        info!(
            "[{}] transferred {} -> {} ({} bytes)",
            self.host(),
            local.display(),
            remote,
            bytes
        );
        Ok(())
    }

    /// Copy a local file to a path only root can write.
    ///
    /// The file is staged in `/tmp` and then moved with sudo. The two steps
    /// are not atomic: until the move finishes, `remote` still holds the old
    /// content (or nothing), and a move across filesystems is a copy that a
    /// reader can observe half-written.
    fn transfer_with_privilege(&self, local: &Path, remote: &str, secret: &Secret) -> Result<()> {
        let staged = staging_path(self.host(), local, remote)?;
        let mut file = open_local(self.host(), local, remote)?;
        self.write_file(&staged, &mut file)?;

        let parent = remote_parent(remote).unwrap_or("/");
        let place = format!(
            "mkdir -p {} && mv -f {} {}",
            quote(parent),
            quote(&staged),
            quote(remote)
        );
        self.execute(&RemoteCommand::root(place), secret)?;
        info!(
            "[{}] transferred {} -> {} (via {})",
            self.host(),
            local.display(),
            remote,
            staged
        );
        Ok(())
    }
}

impl<S: Session + ?Sized> SessionExt for S {}

fn check_exit(host: &str, command: &str, output: ExecOutput) -> Result<String> {
    if output.success() {
        return Ok(output.stdout_str());
    }
    Err(Error::Command {
        host: host.to_string(),
        command: command.to_string(),
        exit_code: output.exit_code,
        stdout: output.stdout_str(),
        stderr: output.stderr_str(),
    })
}

fn check_output(
    host: &str,
    command: &str,
    actual: &str,
    expected: &str,
    mode: ValidationMode,
) -> Result<()> {
    if mode.matches(actual, expected) {
        debug!("[{host}] output of {command:?} matched ({mode})");
        return Ok(());
    }
    Err(Error::Validation {
        host: host.to_string(),
        command: command.to_string(),
        mode,
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

fn install_askpass<S: Session + ?Sized>(session: &S, password: &str) -> Result<()> {
    let output = session.exec(&askpass_install_line(password))?;
    if output.success() {
        return Ok(());
    }
    // The install line embeds the password; report it by name only.
    Err(Error::Command {
        host: session.host().to_string(),
        command: format!("install askpass helper at {ASKPASS_PATH}"),
        exit_code: output.exit_code,
        stdout: output.stdout_str(),
        stderr: output.stderr_str(),
    })
}

fn open_local(host: &str, local: &Path, remote: &str) -> Result<File> {
    File::open(local)
        .map_err(|e| Error::transfer(host, remote, format!("cannot read {}: {e}", local.display())))
}

fn staging_path(host: &str, local: &Path, remote: &str) -> Result<String> {
    local
        .file_name()
        .and_then(|n| n.to_str())
        .map(|name| format!("{STAGING_PREFIX}{name}"))
        .ok_or_else(|| {
            Error::transfer(host, remote, format!("{} has no file name", local.display()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::mock::MockSession;
    use std::io::Write;

    #[test]
    fn test_run_reports_exit_code_and_stderr() {
        let session = MockSession::new("web1").on("false", ExecOutput::failed(3, "nope"));
        let err = session.run("false").unwrap_err();
        match err {
            Error::Command {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_run_captured_returns_stdout() {
        let session = MockSession::new("web1").on("hostname", ExecOutput::ok("web1\n"));
        assert_eq!(session.run_captured("hostname").unwrap(), "web1\n");
    }

    #[test]
    fn test_run_validated_exact_rejects_trailing_newline() {
        let session = MockSession::new("web1").on("echo ok", ExecOutput::ok("ok\n"));
        let err = session
            .run_validated("echo ok", "ok", ValidationMode::Exact)
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);

        session
            .run_validated("echo ok", "ok\n", ValidationMode::Exact)
            .unwrap();
    }

    #[test]
    fn test_run_validated_lazy_accepts_substring() {
        let session = MockSession::new("web1").on("status", ExecOutput::ok("service: ok\n"));
        session
            .run_validated("status", "ok", ValidationMode::Lazy)
            .unwrap();
        let err = session
            .run_validated("status", "degraded", ValidationMode::Lazy)
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_validation_error_is_distinct_from_command_error() {
        let session = MockSession::new("web1").on("check", ExecOutput::failed(1, ""));
        let err = session
            .run_validated("check", "ok", ValidationMode::Lazy)
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Command);
    }

    #[test]
    fn test_privileged_run_installs_helper_then_runs() {
        let session = MockSession::new("web1");
        session
            .run_with_privilege("apt-get update", &Secret::new("pw"))
            .unwrap();

        let executed = session.executed();
        assert_eq!(executed.len(), 2);
        assert!(executed[0].contains(ASKPASS_PATH));
        assert!(executed[0].contains("chmod 700"));
        assert_eq!(
            executed[1],
            "SUDO_ASKPASS=/tmp/.steward-askpass sudo -A sh -c 'apt-get update'"
        );
    }

    #[test]
    fn test_privileged_run_fails_when_helper_install_fails() {
        let session =
            MockSession::new("web1").on(ASKPASS_PATH, ExecOutput::failed(1, "read-only /tmp"));
        let err = session
            .run_with_privilege("apt-get update", &Secret::new("s3cret"))
            .unwrap_err();

        assert!(!err.to_string().contains("s3cret"));
        assert_eq!(session.executed().len(), 1);
    }

    #[test]
    fn test_privileged_run_without_password_uses_sudo_n() {
        let session = MockSession::new("web1");
        session
            .run_with_privilege("apt-get update", &Secret::none())
            .unwrap();
        assert_eq!(session.executed(), vec!["sudo -n sh -c 'apt-get update'"]);
    }

    #[test]
    fn test_run_validated_with_privilege() {
        let session = MockSession::new("web1").on("systemctl is-active", ExecOutput::ok("active\n"));
        session
            .run_validated_with_privilege(
                "systemctl is-active nginx",
                "active",
                ValidationMode::Lazy,
                &Secret::new("pw"),
            )
            .unwrap();
    }

    #[test]
    fn test_transfer_creates_parent_and_writes() {
        let mut local = tempfile::NamedTempFile::new().unwrap();
        write!(local, "listen 80;").unwrap();

        let session = MockSession::new("web1");
        session
            .transfer(local.path(), "/home/deploy/app/nginx.conf")
            .unwrap();

        assert_eq!(session.dirs(), vec!["/home/deploy/app"]);
        assert_eq!(
            session.file("/home/deploy/app/nginx.conf").unwrap(),
            b"listen 80;"
        );
    }

    #[test]
    fn test_transfer_missing_local_file_is_transfer_error() {
        let session = MockSession::new("web1");
        let err = session
            .transfer(Path::new("/nonexistent/steward.cfg"), "/etc/steward.cfg")
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Transfer);
        assert!(session.executed().is_empty());
    }

    #[test]
    fn test_transfer_with_privilege_stages_then_moves() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("haproxy.cfg");
        std::fs::write(&local, "frontend web").unwrap();

        let session = MockSession::new("lb1");
        session
            .transfer_with_privilege(&local, "/etc/haproxy/haproxy.cfg", &Secret::new("pw"))
            .unwrap();

        assert_eq!(
            session.file("/tmp/steward-haproxy.cfg").unwrap(),
            b"frontend web"
        );
        let executed = session.executed();
        assert_eq!(
            executed.last().unwrap(),
            &format!(
                "SUDO_ASKPASS={ASKPASS_PATH} sudo -A sh -c {}",
                quote("mkdir -p '/etc/haproxy' && mv -f '/tmp/steward-haproxy.cfg' '/etc/haproxy/haproxy.cfg'")
            )
        );
    }
}
