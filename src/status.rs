// src/status.rs

//! Append-only status stream for one run.
//!
//! Every event is recorded in the stream's own history. An optional channel
//! consumer receives the same events in emission order; if that consumer goes
//! away the stream detaches it and keeps recording.

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::plan::TaskId;

/// Run phases, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Planning,
    Executing,
    Synthesizing,
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Planning => "Planning",
            Phase::Executing => "Executing",
            Phase::Synthesizing => "Synthesizing",
            Phase::Complete => "Complete",
        };
        f.write_str(s)
    }
}

/// One event on the status stream.
///
/// `Display` renders the line protocol (without trailing newline):
/// `PHASE: <name>`, `STATUS: <message>`, `ERROR: <message>` and
/// `SYNTHESIS_CHUNK:<text>`. Every event renders to exactly one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Phase(Phase),
    PlanAccepted { tasks: usize },
    TaskStarted { task: TaskId, description: String },
    /// Carries the validator's reasoning; empty when it gave none.
    TaskPassed { task: TaskId, justification: String },
    TaskFailed { task: TaskId, reason: String },
    SynthesisChunk(String),
    /// Terminal diagnostic; nothing follows it.
    Error(String),
}

impl StatusEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatusEvent::Error(_) | StatusEvent::Phase(Phase::Complete)
        )
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::Phase(phase) => write!(f, "PHASE: {phase}"),
            StatusEvent::PlanAccepted { tasks } => {
                write!(f, "STATUS: Plan generated with {tasks} tasks.")
            }
            StatusEvent::TaskStarted { task, description } => write!(
                f,
                "STATUS: Starting task '{}': {}",
                OneLine(task),
                OneLine(description)
            ),
            StatusEvent::TaskPassed {
                task,
                justification,
            } if justification.is_empty() => {
                write!(f, "STATUS: Task '{}' PASSED.", OneLine(task))
            }
            StatusEvent::TaskPassed {
                task,
                justification,
            } => write!(
                f,
                "STATUS: Task '{}' PASSED. Justification: {}",
                OneLine(task),
                OneLine(justification)
            ),
            StatusEvent::TaskFailed { task, reason } => write!(
                f,
                "STATUS: Task '{}' FAILED. Reason: {}",
                OneLine(task),
                OneLine(reason)
            ),
            // A chunk's own line terminator is dropped.
            StatusEvent::SynthesisChunk(text) => write!(
                f,
                "SYNTHESIS_CHUNK:{}",
                OneLine(text.strip_suffix('\n').unwrap_or(text))
            ),
            StatusEvent::Error(message) => write!(f, "ERROR: {}", OneLine(message)),
        }
    }
}

/// Renders collaborator text on one physical line: `\n` and `\r` are
/// written as their two-character escapes.
struct OneLine<'a>(&'a str);

impl fmt::Display for OneLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.0;
        while let Some(at) = rest.find(['\n', '\r']) {
            f.write_str(&rest[..at])?;
            f.write_str(if rest[at..].starts_with('\n') { "\\n" } else { "\\r" })?;
            rest = &rest[at + 1..];
        }
        f.write_str(rest)
    }
}

/// Single-producer, append-only event stream.
#[derive(Debug, Default)]
pub struct StatusStream {
    history: Vec<StatusEvent>,
    sink: Option<mpsc::UnboundedSender<StatusEvent>>,
}

impl StatusStream {
    /// A stream that only records history.
    pub fn new() -> Self {
        Self::default()
    }

    /// A stream plus the receiving end for a live consumer.
    pub fn with_channel() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stream = Self {
            history: Vec::new(),
            sink: Some(tx),
        };
        (stream, rx)
    }

    /// Append an event. Never fails; a closed consumer is detached.
    pub fn emit(&mut self, event: StatusEvent) {
        debug!(event = %event, "status event");

        if let Some(sink) = &self.sink {
            if sink.send(event.clone()).is_err() {
                warn!("status consumer disconnected; continuing without it");
                self.sink = None;
            }
        }

        self.history.push(event);
    }

    /// Every event emitted so far, in order.
    pub fn events(&self) -> &[StatusEvent] {
        &self.history
    }

    /// Whether a live consumer is still attached.
    pub fn is_attached(&self) -> bool {
        self.sink.is_some()
    }

    /// Rendered protocol lines for the recorded history.
    pub fn lines(&self) -> Vec<String> {
        self.history.iter().map(|e| e.to_string()).collect()
    }

    pub fn into_events(self) -> Vec<StatusEvent> {
        self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_line_protocol() {
        assert_eq!(
            StatusEvent::Phase(Phase::Executing).to_string(),
            "PHASE: Executing"
        );
        assert_eq!(
            StatusEvent::SynthesisChunk("hello".into()).to_string(),
            "SYNTHESIS_CHUNK:hello"
        );
        assert_eq!(
            StatusEvent::SynthesisChunk("line\n".into()).to_string(),
            "SYNTHESIS_CHUNK:line"
        );
        assert_eq!(
            StatusEvent::Error("boom".into()).to_string(),
            "ERROR: boom"
        );
        assert_eq!(
            StatusEvent::TaskFailed {
                task: "B".into(),
                reason: "wrong".into()
            }
            .to_string(),
            "STATUS: Task 'B' FAILED. Reason: wrong"
        );
    }

    #[test]
    fn collaborator_text_stays_on_one_line() {
        let failed = StatusEvent::TaskFailed {
            task: "A".into(),
            reason: "bad\nPHASE: Complete".into(),
        };
        assert_eq!(
            failed.to_string(),
            "STATUS: Task 'A' FAILED. Reason: bad\\nPHASE: Complete"
        );

        let started = StatusEvent::TaskStarted {
            task: "A".into(),
            description: "one\r\ntwo".into(),
        };
        assert_eq!(started.to_string(), "STATUS: Starting task 'A': one\\r\\ntwo");

        assert_eq!(
            StatusEvent::SynthesisChunk("a\nb\n".into()).to_string(),
            "SYNTHESIS_CHUNK:a\\nb"
        );
        assert_eq!(
            StatusEvent::Error("first\nsecond".into()).to_string(),
            "ERROR: first\\nsecond"
        );
    }

    #[test]
    fn passed_task_reports_justification_when_present() {
        let bare = StatusEvent::TaskPassed {
            task: "A".into(),
            justification: String::new(),
        };
        assert_eq!(bare.to_string(), "STATUS: Task 'A' PASSED.");

        let reasoned = StatusEvent::TaskPassed {
            task: "A".into(),
            justification: "cites sources".into(),
        };
        assert_eq!(
            reasoned.to_string(),
            "STATUS: Task 'A' PASSED. Justification: cites sources"
        );
    }

    #[test]
    fn consumer_receives_events_in_order() {
        let (mut stream, mut rx) = StatusStream::with_channel();
        stream.emit(StatusEvent::Phase(Phase::Planning));
        stream.emit(StatusEvent::PlanAccepted { tasks: 2 });

        assert_eq!(rx.try_recv().unwrap(), StatusEvent::Phase(Phase::Planning));
        assert_eq!(rx.try_recv().unwrap(), StatusEvent::PlanAccepted { tasks: 2 });
    }

    #[test]
    fn dropped_consumer_is_detached_and_history_continues() {
        let (mut stream, rx) = StatusStream::with_channel();
        stream.emit(StatusEvent::Phase(Phase::Planning));
        drop(rx);

        stream.emit(StatusEvent::Phase(Phase::Executing));
        stream.emit(StatusEvent::Phase(Phase::Complete));

        assert!(!stream.is_attached());
        let events = stream.into_events();
        assert_eq!(events.len(), 3);
        assert!(events[2].is_terminal());
    }
}
