//! Scripted in-memory sessions for tests.
//!
//! A [`MockSession`] answers commands from a list of substring rules and
//! records everything it was asked to do. Clones share state, so a test
//! can keep a handle while the code under test owns a boxed copy.

use crate::command::ExecOutput;
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::session::{Connector, Session};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct Rule {
    pattern: String,
    output: ExecOutput,
    once: bool,
    used: bool,
}

#[derive(Debug, Default)]
struct State {
    rules: Vec<Rule>,
    executed: Vec<String>,
    dirs: Vec<String>,
    files: BTreeMap<String, Vec<u8>>,
    unwritable: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MockSession {
    host: String,
    state: Arc<Mutex<State>>,
}

impl MockSession {
    /// Session where every command succeeds with empty output.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Answer every command containing `pattern` with `output`.
    ///
    /// Rules are checked in the order they were added.
    #[must_use]
    pub fn on(self, pattern: impl Into<String>, output: ExecOutput) -> Self {
        self.push_rule(pattern.into(), output, false);
        self
    }

    /// Like [`on`](Self::on), but the rule only answers once.
    #[must_use]
    pub fn once(self, pattern: impl Into<String>, output: ExecOutput) -> Self {
        self.push_rule(pattern.into(), output, true);
        self
    }

    /// Make writes to `path` fail.
    #[must_use]
    pub fn unwritable(self, path: impl Into<String>) -> Self {
        self.lock().unwritable.push(path.into());
        self
    }

    /// Every line passed to `exec`, in order.
    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    /// Number of executed lines containing `pattern`.
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.lock()
            .executed
            .iter()
            .filter(|line| line.contains(pattern))
            .count()
    }

    /// Directories created through `create_dir_all`.
    pub fn dirs(&self) -> Vec<String> {
        self.lock().dirs.clone()
    }

    /// Contents written to `path`, if any.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).cloned()
    }

    fn push_rule(&self, pattern: String, output: ExecOutput, once: bool) {
        self.lock().rules.push(Rule {
            pattern,
            output,
            once,
            used: false,
        });
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Session for MockSession {
    fn host(&self) -> &str {
        &self.host
    }

    fn exec(&self, line: &str) -> Result<ExecOutput> {
        let mut state = self.lock();
        state.executed.push(line.to_string());

        let rule = state
            .rules
            .iter_mut()
            .find(|rule| !(rule.once && rule.used) && line.contains(&rule.pattern));
        Ok(match rule {
            Some(rule) => {
                rule.used = true;
                rule.output.clone()
            }
            None => ExecOutput::default(),
        })
    }

    fn create_dir_all(&self, path: &str) -> Result<()> {
        self.lock().dirs.push(path.to_string());
        Ok(())
    }

    fn write_file(&self, path: &str, contents: &mut dyn Read) -> Result<u64> {
        if self.lock().unwritable.iter().any(|p| p == path) {
            return Err(Error::transfer(&self.host, path, "permission denied"));
        }
        let mut buf = Vec::new();
        contents
            .read_to_end(&mut buf)
            .map_err(|e| Error::transfer(&self.host, path, e))?;
        let len = buf.len() as u64;
        self.lock().files.insert(path.to_string(), buf);
        Ok(len)
    }
}

/// Hands out [`MockSession`]s by address.
///
/// Connecting to an address with no registered session fails with a
/// connection error, which is how tests simulate an unreachable host.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    sessions: HashMap<String, MockSession>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its host address.
    #[must_use]
    pub fn with(mut self, session: MockSession) -> Self {
        self.sessions.insert(session.host.clone(), session);
        self
    }
}

impl Connector for MockConnector {
    fn connect(&self, credentials: &Credentials) -> Result<Box<dyn Session>> {
        self.sessions
            .get(&credentials.address)
            .map(|session| Box::new(session.clone()) as Box<dyn Session>)
            .ok_or_else(|| Error::connect(&credentials.address, "connection refused"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_default_answer_is_success() {
        let session = MockSession::new("web1");
        let out = session.exec("anything").unwrap();
        assert!(out.success());
        assert!(out.stdout.is_empty());
    }

    #[test]
    fn test_once_rule_falls_through_after_first_use() {
        let session = MockSession::new("web1")
            .once("dpkg-query", ExecOutput::failed(1, "not installed"))
            .on("dpkg-query", ExecOutput::ok("install ok installed\t1.0"));

        assert_eq!(session.exec("dpkg-query -W curl").unwrap().exit_code, 1);
        assert!(session.exec("dpkg-query -W curl").unwrap().success());
        assert_eq!(session.count_matching("dpkg-query"), 2);
    }

    #[test]
    fn test_clones_share_recorded_state() {
        let session = MockSession::new("web1");
        let boxed: Box<dyn Session> = Box::new(session.clone());
        boxed.exec("uptime").unwrap();
        assert_eq!(session.executed(), vec!["uptime"]);
    }

    #[test]
    fn test_unwritable_path() {
        let session = MockSession::new("web1").unwritable("/etc/shadow");
        let err = session
            .write_file("/etc/shadow", &mut "x".as_bytes())
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Transfer);
        assert!(session.file("/etc/shadow").is_none());
    }

    #[test]
    fn test_connector_unknown_address_refuses() {
        let connector = MockConnector::new().with(MockSession::new("web1"));
        let known = Credentials::new("web1", 22, "deploy", Some("pw"), None).unwrap();
        let unknown = Credentials::new("web2", 22, "deploy", Some("pw"), None).unwrap();

        assert_eq!(connector.connect(&known).unwrap().host(), "web1");
        let err = connector.connect(&unknown).err().unwrap();
        assert_eq!(err.category(), ErrorCategory::Connect);
    }
}
