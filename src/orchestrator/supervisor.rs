use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::orchestrator::process::{OutputStream, ProcessEvent, ProcessHandle, SpawnOptions};
use crate::orchestrator::state::ServiceRecord;
use crate::platform::SignalStrength;

/// Phrase the backend dev server prints on stderr once functions are pushed.
pub const BACKEND_READY_PHRASE: &str = "Convex functions ready";
/// Phrases web dev servers print on stdout once they accept connections.
pub const APP_READY_PHRASES: &[&str] = &["Ready", "started server"];

// ---------------------------------------------------------------------------
// ReadinessPredicate
// ---------------------------------------------------------------------------

/// Decides from a single output line whether a service is ready.
///
/// Matching is on raw log text, so it breaks silently if the wrapped tool
/// rewords its output: the service then stays "starting" even though it is
/// up. The predicate is injectable so other strategies can be swapped in.
#[derive(Clone)]
pub struct ReadinessPredicate {
    description: String,
    matcher: Arc<dyn Fn(OutputStream, &str) -> bool + Send + Sync>,
}

impl ReadinessPredicate {
    pub fn new<F>(description: impl Into<String>, matcher: F) -> Self
    where
        F: Fn(OutputStream, &str) -> bool + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            matcher: Arc::new(matcher),
        }
    }

    /// Matches when the line contains any of `needles`, optionally only on
    /// one stream.
    pub fn contains_any(stream: Option<OutputStream>, needles: &[&str]) -> Self {
        let needles: Vec<String> = needles.iter().map(|s| s.to_string()).collect();
        let description = match stream {
            Some(s) => format!("{:?} contains {:?}", s, needles),
            None => format!("output contains {:?}", needles),
        };
        Self::new(description, move |line_stream, line| {
            stream.is_none_or(|s| s == line_stream) && needles.iter().any(|n| line.contains(n))
        })
    }

    /// Matches any line (either stream) the regex finds a match in.
    pub fn pattern(re: Regex) -> Self {
        Self::new(format!("output matches /{}/", re.as_str()), move |_, line| {
            re.is_match(line)
        })
    }

    pub fn backend_default() -> Self {
        Self::contains_any(Some(OutputStream::Stderr), &[BACKEND_READY_PHRASE])
    }

    pub fn app_default() -> Self {
        Self::contains_any(Some(OutputStream::Stdout), APP_READY_PHRASES)
    }

    /// Never matches; readiness is decided elsewhere.
    pub fn never() -> Self {
        Self::new("never", |_, _| false)
    }

    pub fn matches(&self, stream: OutputStream, line: &str) -> bool {
        (self.matcher)(stream, line)
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for ReadinessPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadinessPredicate")
            .field(&self.description)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ServiceSupervisor
// ---------------------------------------------------------------------------

/// Starts, stops and observes the processes behind [`ServiceRecord`]s. Holds
/// no per-service state itself; the records do.
pub struct ServiceSupervisor {
    events_tx: mpsc::UnboundedSender<ProcessEvent>,
    grace_period: Duration,
}

impl ServiceSupervisor {
    pub fn new(events_tx: mpsc::UnboundedSender<ProcessEvent>, grace_period: Duration) -> Self {
        Self {
            events_tx,
            grace_period,
        }
    }

    /// Spawn the record's process. Returns `false` (record left stopped) if
    /// the spawn failed. Starting a running record is a no-op.
    pub fn start(&self, record: &mut ServiceRecord) -> bool {
        if record.running {
            return true;
        }

        record.generation += 1;
        record.ready = false;
        record.ready_warned = false;

        let spec = &record.spec;
        info!(
            service = %spec.name,
            generation = record.generation,
            "starting: {}",
            spec.command_line(),
        );

        let options = SpawnOptions {
            cwd: Some(spec.working_dir.clone()),
            env: spec.env.clone(),
            detached_group: true,
        };
        let handle = ProcessHandle::spawn(
            &spec.name,
            record.generation,
            &spec.program,
            &spec.args,
            &options,
            self.events_tx.clone(),
        );

        if handle.spawn_failed() {
            warn!(service = %spec.name, program = %spec.program, "spawn failed");
            record.mark_stopped();
            return false;
        }

        record.handle = Some(handle);
        record.running = true;
        record.started_at = Some(Instant::now());
        true
    }

    /// Feed one output line to the readiness check. Returns `true` only on
    /// the transition to ready; later matches and stale generations are
    /// ignored.
    pub fn observe_line(
        &self,
        record: &mut ServiceRecord,
        generation: u64,
        stream: OutputStream,
        text: &str,
    ) -> bool {
        if generation != record.generation || !record.running || record.ready {
            return false;
        }
        if record.spec.readiness.matches(stream, text) {
            record.ready = true;
            debug!(service = %record.spec.name, "readiness marker observed");
            return true;
        }
        false
    }

    /// Record a process exit. Returns `true` if the record changed state.
    pub fn observe_exit(&self, record: &mut ServiceRecord, generation: u64, code: i32) -> bool {
        if generation != record.generation || !record.running {
            return false;
        }
        info!(service = %record.spec.name, code, "process exited");
        record.last_exit = Some(code);
        record.mark_stopped();
        true
    }

    /// Signal the record's process and mark it stopped. A graceful stop waits
    /// up to the grace window for the exit, then kills whatever is left.
    pub async fn stop(&self, record: &mut ServiceRecord, strength: SignalStrength) {
        if let Some(handle) = record.handle.as_ref() {
            debug!(service = %record.spec.name, ?strength, "stopping");
            handle.signal(strength);
            if strength == SignalStrength::Graceful {
                match handle.wait_exit(self.grace_period).await {
                    Some(code) => record.last_exit = Some(code),
                    None => {
                        warn!(
                            service = %record.spec.name,
                            grace = ?self.grace_period,
                            "still running after grace period, killing"
                        );
                        handle.signal(SignalStrength::Force);
                    }
                }
            }
        }
        record.mark_stopped();
    }

    /// Stop then start with the same spec. Readiness always starts over.
    pub async fn restart(&self, record: &mut ServiceRecord) -> bool {
        self.stop(record, SignalStrength::Graceful).await;
        self.start(record)
    }
}
