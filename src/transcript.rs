//! Append-only JSONL audit trail of session and access events.

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Transcript shared by every session served by the process
pub type SharedTranscript = Arc<Mutex<Transcript>>;

pub struct Transcript {
    pub path: PathBuf,
    file: File,
}

#[derive(Serialize)]
struct Event<'a> {
    ts: DateTime<Utc>,
    session_id: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(flatten)]
    data: serde_json::Value,
}

impl Transcript {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn shared(self) -> SharedTranscript {
        Arc::new(Mutex::new(self))
    }

    pub fn log(&mut self, session_id: &str, event_type: &str, data: serde_json::Value) -> Result<()> {
        let event = Event {
            ts: Utc::now(),
            session_id,
            event_type,
            data,
        };
        let line = serde_json::to_string(&event)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }

    pub fn session_start(&mut self, session_id: &str, cwd: &Path) -> Result<()> {
        self.log(session_id, "session_start", serde_json::json!({ "cwd": cwd }))
    }

    /// Log an invocation of a gated page, before authentication is checked
    pub fn page_access(&mut self, session_id: &str, page: &str, status: &str) -> Result<()> {
        self.log(
            session_id,
            "page_access",
            serde_json::json!({ "page": page, "status": status }),
        )
    }

    pub fn cookie_restored(&mut self, session_id: &str, username: &str) -> Result<()> {
        self.log(
            session_id,
            "cookie_restored",
            serde_json::json!({ "username": username }),
        )
    }

    pub fn cookie_rejected(&mut self, session_id: &str, reason: &str) -> Result<()> {
        self.log(
            session_id,
            "cookie_rejected",
            serde_json::json!({ "reason": reason }),
        )
    }

    pub fn login_ok(&mut self, session_id: &str, username: &str) -> Result<()> {
        self.log(
            session_id,
            "login_ok",
            serde_json::json!({ "username": username }),
        )
    }

    pub fn login_failed(&mut self, session_id: &str, username: &str, reason: &str) -> Result<()> {
        self.log(
            session_id,
            "login_failed",
            serde_json::json!({
                "username": username,
                "reason": reason,
            }),
        )
    }

    pub fn logout(&mut self, session_id: &str, username: Option<&str>) -> Result<()> {
        self.log(
            session_id,
            "logout",
            serde_json::json!({ "username": username }),
        )
    }
}

/// Run `write` against the shared transcript, if any. Audit failures are
/// reported on stderr and never interrupt the request.
pub(crate) fn audit(
    transcript: Option<&SharedTranscript>,
    write: impl FnOnce(&mut Transcript) -> Result<()>,
) {
    if let Some(transcript) = transcript {
        let mut guard = transcript.lock();
        if let Err(e) = write(&mut *guard) {
            eprintln!("Warning: failed to write audit transcript: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read_events(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_events_are_jsonl() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit").join("audit.jsonl");
        let mut transcript = Transcript::open(&path).unwrap();

        transcript.page_access("s1", "dashboard", "unknown").unwrap();
        transcript.login_failed("s1", "jsmith", "incorrect password").unwrap();
        transcript.login_ok("s1", "jsmith").unwrap();

        let events = read_events(&path);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["type"], "page_access");
        assert_eq!(events[0]["page"], "dashboard");
        assert_eq!(events[0]["session_id"], "s1");
        assert_eq!(events[1]["reason"], "incorrect password");
        assert_eq!(events[2]["username"], "jsmith");
        assert!(events[2]["ts"].is_string());
    }

    #[test]
    fn test_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");

        Transcript::open(&path).unwrap().logout("a", None).unwrap();
        Transcript::open(&path)
            .unwrap()
            .logout("b", Some("jsmith"))
            .unwrap();

        let events = read_events(&path);
        assert_eq!(events.len(), 2);
        assert!(events[0]["username"].is_null());
        assert_eq!(events[1]["session_id"], "b");
    }

    #[test]
    fn test_audit_helper_writes_through_shared_handle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.jsonl");
        let shared = Transcript::open(&path).unwrap().shared();

        audit(Some(&shared), |t| t.cookie_restored("s1", "jsmith"));
        audit(None, |t| t.cookie_restored("s2", "nobody"));

        let events = read_events(&path);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "cookie_restored");
    }
}
