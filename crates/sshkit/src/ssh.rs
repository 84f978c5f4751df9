//! SSH transport backed by libssh2.
//!
//! Host keys are not verified: any key the server presents is accepted.

use crate::command::ExecOutput;
use crate::credentials::{Auth, Credentials};
use crate::error::{Error, Result};
use crate::session::{Connector, Session};
use log::{debug, info};
use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::thread;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Opens [`Ssh2Session`]s over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ssh2Connector;

impl Connector for Ssh2Connector {
    fn connect(&self, credentials: &Credentials) -> Result<Box<dyn Session>> {
        Ok(Box::new(Ssh2Session::open(credentials)?))
    }
}

/// An authenticated libssh2 session. Disconnects on drop.
pub struct Ssh2Session {
    host: String,
    inner: ssh2::Session,
}

impl Ssh2Session {
    /// Connect, handshake and authenticate.
    pub fn open(credentials: &Credentials) -> Result<Self> {
        let host = credentials.address.as_str();
        let endpoint = format!("{}:{}", host, credentials.port);
        debug!("connecting to {endpoint} as {}", credentials.user);

        let addr = endpoint
            .to_socket_addrs()
            .map_err(|e| Error::connect(host, format!("cannot resolve {endpoint}: {e}")))?
            .next()
            .ok_or_else(|| Error::connect(host, format!("no address for {endpoint}")))?;
        let tcp = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
            .map_err(|e| Error::connect(host, e))?;

        let mut inner = ssh2::Session::new().map_err(|e| Error::connect(host, e))?;
        inner.set_tcp_stream(tcp);
        inner.handshake().map_err(|e| Error::connect(host, e))?;

        match &credentials.auth {
            Auth::PrivateKey(key) => {
                inner.userauth_pubkey_file(&credentials.user, None, key, None)
            }
            Auth::Password(secret) => {
                inner.userauth_password(&credentials.user, secret.expose().unwrap_or_default())
            }
        }
        .map_err(|e| Error::connect(host, format!("authentication failed: {e}")))?;

        if !inner.authenticated() {
            return Err(Error::connect(host, "authentication rejected"));
        }

        info!("connected to {endpoint} as {}", credentials.user);
        Ok(Self {
            host: host.to_string(),
            inner,
        })
    }

    fn sftp(&self) -> Result<ssh2::Sftp> {
        self.inner.sftp().map_err(|e| Error::connect(&self.host, e))
    }
}

impl Session for Ssh2Session {
    fn host(&self) -> &str {
        &self.host
    }

    fn exec(&self, line: &str) -> Result<ExecOutput> {
        let transport = |e: ssh2::Error| Error::connect(&self.host, e);
        let io_err = |e: io::Error| Error::connect(&self.host, e);

        let mut channel = self.inner.channel_session().map_err(transport)?;
        channel.exec(line).map_err(transport)?;

        self.inner.set_blocking(false);
        let drained = drain(&mut channel.stream(0), &mut channel.stderr(), || {
            channel.eof()
        });
        self.inner.set_blocking(true);
        let (stdout, stderr) = drained.map_err(io_err)?;

        channel.wait_close().map_err(transport)?;
        let exit_code = channel.exit_status().map_err(transport)?;

        Ok(ExecOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    fn create_dir_all(&self, path: &str) -> Result<()> {
        let sftp = self.sftp()?;
        let mut current = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            if path.starts_with('/') || !current.is_empty() {
                current.push('/');
            }
            current.push_str(component);
            if sftp.stat(Path::new(&current)).is_err() {
                sftp.mkdir(Path::new(&current), 0o755)
                    .map_err(|e| Error::transfer(&self.host, path, e))?;
            }
        }
        Ok(())
    }

    fn write_file(&self, path: &str, contents: &mut dyn Read) -> Result<u64> {
        let sftp = self.sftp()?;
        let mut remote = sftp
            .create(Path::new(path))
            .map_err(|e| Error::transfer(&self.host, path, e))?;
        io::copy(contents, &mut remote).map_err(|e| Error::transfer(&self.host, path, e))
    }
}

/// Read stdout and stderr in turns until `eof` and both are empty.
///
/// The readers must be non-blocking. Reading one stream to EOF first would
/// stall a command that fills the other stream's window.
fn drain(
    stdout: &mut impl Read,
    stderr: &mut impl Read,
    eof: impl Fn() -> bool,
) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let mut buf = [0u8; 16 * 1024];
    loop {
        let progressed =
            read_some(stdout, &mut buf, &mut out)? | read_some(stderr, &mut buf, &mut err)?;
        if progressed {
            continue;
        }
        if eof() {
            return Ok((out, err));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// One read; `false` when nothing was available.
fn read_some(reader: &mut impl Read, buf: &mut [u8], into: &mut Vec<u8>) -> io::Result<bool> {
    match reader.read(buf) {
        Ok(0) => Ok(false),
        Ok(n) => {
            into.extend_from_slice(&buf[..n]);
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e),
    }
}

impl Drop for Ssh2Session {
    fn drop(&mut self) {
        let _ = self.inner.disconnect(None, "steward done", None);
    }
}
