//! Shared helpers for CLI commands.

use std::error::Error;
use std::io::Read;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use taskwarden_core::context::{ContextProvider, LiveContext};
use taskwarden_core::error::{ContextError, CoreError};
use taskwarden_core::item::{ItemId, UserId};
use taskwarden_core::notifier::{DecisionNotice, Notifier};

/// Read a JSON value from a file path, or from stdin when the path is "-".
pub fn read_json<T: DeserializeOwned>(path: &str) -> Result<T, Box<dyn Error>> {
    let raw = if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Parse an RFC3339 timestamp argument.
pub fn parse_at(raw: &str) -> Result<DateTime<Utc>, Box<dyn Error>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

/// Context provider backed by a JSON file holding a [`LiveContext`]
/// snapshot. Stands in for the external calendar/tracker clients in
/// offline runs; when no file is given, every fetch reports the upstream
/// as unavailable and evaluations take the conservative unknown-context
/// path.
#[derive(Debug, Clone, Default)]
pub struct FileContextProvider {
    path: Option<PathBuf>,
}

impl FileContextProvider {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl ContextProvider for FileContextProvider {
    fn fetch(
        &self,
        _item: &ItemId,
        _user: &UserId,
        _window_start: DateTime<Utc>,
        _window_end: DateTime<Utc>,
    ) -> Result<LiveContext, ContextError> {
        let Some(path) = &self.path else {
            return Err(ContextError::Upstream("no context source configured".into()));
        };
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ContextError::Upstream(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| ContextError::Upstream(format!("{}: {e}", path.display())))
    }
}

/// Notifier that prints each decision payload to stdout.
#[derive(Debug, Clone, Default)]
pub struct PrintNotifier;

impl Notifier for PrintNotifier {
    fn deliver(&self, notice: &DecisionNotice) -> Result<(), CoreError> {
        println!("{}", serde_json::to_string_pretty(notice)?);
        Ok(())
    }
}
