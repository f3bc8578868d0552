//! Operator log pipeline.
//!
//! A `LoggingContext` is created once at startup and handed to every worker:
//! no global singletons. Ordinary messages go into a bounded queue drained by
//! the logger thread to stdout and the run's text file; bar and trade-event
//! streams go to CSV sinks; the console mutex keeps inline countdown
//! overwrites from interleaving with full log lines.

pub mod csv_sink;

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::config::LoggingConfig;
use crate::state::SharedState;
use csv_sink::{BarsCsvSink, TradeEventsCsvSink};

/// One formatted message waiting in the drain queue.
#[derive(Debug, Clone)]
struct LogMessage {
    /// Pre-rendered `YYYY-MM-DD HH:MM:SS [THREAD] message` line.
    line: String,
}

/// Guards stdout so inline-status overwrites and log lines never interleave.
#[derive(Clone)]
pub struct Console {
    lock: Arc<Mutex<()>>,
}

impl Console {
    fn new() -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Write a full log line, clearing any inline status first.
    fn write_line(&self, line: &str) {
        let _guard = self.lock.lock().unwrap();
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\r\x1b[K{line}\n");
        let _ = out.flush();
    }

    /// Overwrite the current console line with an inline status.
    pub fn write_inline(&self, status: &str) {
        let _guard = self.lock.lock().unwrap();
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\r\x1b[K{status}");
        let _ = out.flush();
    }

    /// Clear the inline status line.
    pub fn clear_inline(&self) {
        let _guard = self.lock.lock().unwrap();
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "\r\x1b[K");
        let _ = out.flush();
    }
}

/// Shared logging facilities, owned by the supervisor.
pub struct LoggingContext {
    sender: Sender<LogMessage>,
    receiver: Receiver<LogMessage>,
    console: Console,
    tags: Mutex<HashMap<ThreadId, String>>,
    pub bars_csv: BarsCsvSink,
    pub trade_events_csv: TradeEventsCsvSink,
    run_dir: PathBuf,
    text_log_path: PathBuf,
}

impl LoggingContext {
    /// Create the run directory and every sink inside it.
    pub fn new(config: &LoggingConfig) -> Result<Self> {
        let run_dir = make_run_dir(&config.runtime_log_root)?;
        let (sender, receiver) = bounded(config.log_queue_capacity);

        let bars_csv = BarsCsvSink::create(&run_dir.join(&config.bars_csv_filename))?;
        let trade_events_csv =
            TradeEventsCsvSink::create(&run_dir.join(&config.trade_events_csv_filename))?;
        let text_log_path = run_dir.join(&config.text_log_filename);

        Ok(Self {
            sender,
            receiver,
            console: Console::new(),
            tags: Mutex::new(HashMap::new()),
            bars_csv,
            trade_events_csv,
            run_dir,
            text_log_path,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Associate the calling thread with a `[TAG]` for its log lines.
    pub fn register_thread(&self, tag: &str) {
        self.tags
            .lock()
            .unwrap()
            .insert(std::thread::current().id(), tag.to_string());
    }

    fn tag_for_current_thread(&self) -> String {
        self.tags
            .lock()
            .unwrap()
            .get(&std::thread::current().id())
            .cloned()
            .unwrap_or_else(|| "MAIN".to_string())
    }

    /// Queue a message for the drain thread. Falls back to direct console
    /// output if the queue is full (slow disk) so messages are never lost
    /// silently.
    pub fn log(&self, message: &str) {
        let line = format!(
            "{} [{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            self.tag_for_current_thread(),
            message
        );
        let msg = LogMessage { line };
        if self.sender.try_send(msg.clone()).is_err() {
            self.console.write_line(&msg.line);
        }
    }

    /// Drain loop body for the logger worker. Returns when `running` clears
    /// and the queue is empty.
    pub fn run_drain(&self, state: &SharedState) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.text_log_path)
            .with_context(|| format!("open text log {}", self.text_log_path.display()))?;

        loop {
            match self.receiver.recv_timeout(Duration::from_millis(250)) {
                Ok(msg) => {
                    self.console.write_line(&msg.line);
                    let _ = writeln!(file, "{}", msg.line);
                }
                Err(RecvTimeoutError::Timeout) => {
                    let _ = file.flush();
                    if !state.is_running() && self.receiver.is_empty() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        let _ = file.flush();
        Ok(())
    }
}

/// Create `runtime_logs/run_<DD-HH-MM>_<git_hash>/`.
fn make_run_dir(root: &str) -> Result<PathBuf> {
    let stamp = Local::now().format("%d-%H-%M");
    let dir = PathBuf::from(root).join(format!("run_{}_{}", stamp, git_short_hash()));
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("create run directory {}", dir.display()))?;
    Ok(dir)
}

/// Short git hash of the working tree, `nogit` outside a repository.
fn git_short_hash() -> String {
    std::process::Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "nogit".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingConfig;

    fn temp_logging_config() -> (LoggingConfig, tempdir::TempDirGuard) {
        let guard = tempdir::TempDirGuard::new("bracket-trader-logtest");
        let config = LoggingConfig {
            runtime_log_root: guard.path().display().to_string(),
            text_log_filename: "trading.log".to_string(),
            bars_csv_filename: "bars.csv".to_string(),
            trade_events_csv_filename: "trade_events.csv".to_string(),
            log_queue_capacity: 16,
        };
        (config, guard)
    }

    /// Minimal temp-dir helper so tests clean up after themselves.
    mod tempdir {
        use std::path::{Path, PathBuf};

        pub struct TempDirGuard {
            path: PathBuf,
        }

        impl TempDirGuard {
            pub fn new(prefix: &str) -> Self {
                let path = std::env::temp_dir().join(format!(
                    "{}-{}-{}",
                    prefix,
                    std::process::id(),
                    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)
                ));
                std::fs::create_dir_all(&path).unwrap();
                Self { path }
            }

            pub fn path(&self) -> &Path {
                &self.path
            }
        }

        impl Drop for TempDirGuard {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.path);
            }
        }
    }

    #[test]
    fn creates_run_dir_and_sinks() {
        let (config, _guard) = temp_logging_config();
        let ctx = LoggingContext::new(&config).unwrap();
        assert!(ctx.run_dir().exists());
        assert!(ctx
            .run_dir()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("run_"));
        assert!(ctx.run_dir().join("bars.csv").exists());
        assert!(ctx.run_dir().join("trade_events.csv").exists());
    }

    #[test]
    fn drain_writes_registered_tag() {
        let (config, _guard) = temp_logging_config();
        let ctx = LoggingContext::new(&config).unwrap();
        let state = crate::state::SharedState::new();

        ctx.register_thread("TEST");
        ctx.log("hello pipeline");

        state.request_shutdown();
        ctx.run_drain(&state).unwrap();

        let contents = std::fs::read_to_string(ctx.run_dir().join("trading.log")).unwrap();
        assert!(contents.contains("[TEST] hello pipeline"));
    }

    #[test]
    fn git_hash_is_nonempty() {
        assert!(!git_short_hash().is_empty());
    }
}
