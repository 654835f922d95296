/*
 * This file is part of Sprinkler.
 *
 * Copyright (C) 2025 Sprinkler contributors
 *
 * Sprinkler is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Sprinkler is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Sprinkler. If not, see <https://www.gnu.org/licenses/>.
 */

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use lazy_static::lazy_static;
use serde_json::{json, Value};

const DEFAULT_LOG_PATH: &str = "/var/log/sprinkler/events.json";
const FALLBACK_LOG_PATH: &str = "/tmp/sprinkler_events.json";

lazy_static! {
    static ref LOG_FILE: Mutex<Option<File>> = Mutex::new(None);
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path)
}

pub fn init_logging() {
    if init_logging_at(DEFAULT_LOG_PATH).is_err() {
        // /var/log not writable (not root); silently fall back to /tmp
        let _ = init_logging_at(FALLBACK_LOG_PATH);
    }
}

pub fn init_logging_at(path: impl AsRef<Path>) -> io::Result<()> {
    let f = open_append(path.as_ref())?;
    match LOG_FILE.lock() {
        Ok(mut guard) => *guard = Some(f),
        Err(poisoned) => *poisoned.into_inner() = Some(f),
    }
    Ok(())
}

pub fn shutdown_logging() {
    match LOG_FILE.lock() {
        Ok(mut guard) => *guard = None,
        Err(poisoned) => *poisoned.into_inner() = None,
    }
}

pub fn is_enabled() -> bool {
    LOG_FILE.lock().map(|g| g.is_some()).unwrap_or(false)
}

/// Append one JSON line. No-op until one of the init functions has run.
pub fn log_event(event: &str, data: Value) {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(f) = guard.as_mut() {
            let line = json!({
                "ts_ms": now_millis(),
                "event": event,
                "data": data,
            })
            .to_string();
            let _ = writeln!(f, "{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_log_event_writes_json_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("events.json");
        init_logging_at(&path).unwrap();
        assert!(is_enabled());

        log_event("first", json!({ "a": 1 }));
        log_event("second", json!({ "b": "x" }));
        shutdown_logging();

        let data = fs::read_to_string(&path).unwrap();
        // other tests may log concurrently; only look at ours
        let lines: Vec<Value> = data
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).unwrap())
            .filter(|v| v["event"] == "first" || v["event"] == "second")
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "first");
        assert_eq!(lines[0]["data"]["a"], 1);
        assert_eq!(lines[1]["event"], "second");
        assert!(lines[1]["ts_ms"].as_u64().unwrap() > 0);
    }

    #[test]
    #[serial]
    fn test_log_event_without_init_is_noop() {
        shutdown_logging();
        assert!(!is_enabled());
        log_event("dropped", json!({}));
    }

    #[test]
    #[serial]
    fn test_init_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.json");
        fs::write(&path, "{\"event\":\"old\"}\n").unwrap();
        init_logging_at(&path).unwrap();
        log_event("new", json!(null));
        shutdown_logging();
        let data = fs::read_to_string(&path).unwrap();
        assert!(data.starts_with("{\"event\":\"old\"}\n"));
        assert!(data.contains("\"event\":\"new\""));
    }
}
