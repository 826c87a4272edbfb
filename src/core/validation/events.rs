//! Events emitted by validation jobs and the sinks that receive them.
//!
//! A job pushes its events to exactly one [`EventSink`], tagged with its id.
//! [`EventBus`] is the publish/subscribe sink: subscribers register for one job
//! id and only ever see that job's events.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::core::validation::job::JobStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationEvent {
    Start {
        job_id: String,
    },
    StepStart {
        step: String,
        index: usize,
    },
    Log {
        step: String,
        stream: OutputStream,
        line: String,
    },
    StepEnd {
        step: String,
        ok: bool,
        exit_code: Option<i32>,
    },
    Error {
        message: String,
    },
    End {
        ok: bool,
        status: JobStatus,
    },
}

impl ValidationEvent {
    /// Short name matching the wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationEvent::Start { .. } => "start",
            ValidationEvent::StepStart { .. } => "step_start",
            ValidationEvent::Log { .. } => "log",
            ValidationEvent::StepEnd { .. } => "step_end",
            ValidationEvent::Error { .. } => "error",
            ValidationEvent::End { .. } => "end",
        }
    }
}

/// Receiver of job events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, job_id: &str, event: ValidationEvent);
}

/// A plain channel is a sink for a single job.
impl EventSink for UnboundedSender<ValidationEvent> {
    fn emit(&self, _job_id: &str, event: ValidationEvent) {
        let _ = self.send(event);
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: Fn(&str, ValidationEvent) + Send + Sync,
{
    fn emit(&self, job_id: &str, event: ValidationEvent) {
        (self.0)(job_id, event)
    }
}

/// Routes events to subscribers keyed by job id.
///
/// Subscribe before starting the job to see its `start` event. Subscriptions
/// for a job are closed once its `end` event has been delivered.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<String, Vec<UnboundedSender<ValidationEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, job_id: &str) -> UnboundedReceiver<ValidationEvent> {
        let (tx, rx) = unbounded_channel();
        self.subscribers
            .lock()
            .entry(job_id.to_string())
            .or_default()
            .push(tx);
        rx
    }

    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.subscribers
            .lock()
            .get(job_id)
            .map_or(0, Vec::len)
    }
}

impl EventSink for EventBus {
    fn emit(&self, job_id: &str, event: ValidationEvent) {
        let mut subs = self.subscribers.lock();
        let is_end = matches!(event, ValidationEvent::End { .. });

        if let Some(list) = subs.get_mut(job_id) {
            list.retain(|tx| tx.send(event.clone()).is_ok());
        }
        if is_end {
            subs.remove(job_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let ev = ValidationEvent::StepEnd { step: "lint".into(), ok: true, exit_code: Some(0) };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "step_end");
        assert_eq!(v["ok"], true);
        assert_eq!(ev.kind(), "step_end");

        let end = serde_json::to_value(ValidationEvent::End {
            ok: false,
            status: JobStatus::Cancelled,
        })
        .unwrap();
        assert_eq!(end["status"], "cancelled");
    }

    #[test]
    fn bus_isolates_jobs_and_closes_on_end() {
        let bus = EventBus::new();
        let mut a = bus.subscribe("a");
        let mut b = bus.subscribe("b");

        bus.emit("a", ValidationEvent::Start { job_id: "a".into() });
        bus.emit("a", ValidationEvent::End { ok: true, status: JobStatus::Passed });

        assert_eq!(a.try_recv().unwrap().kind(), "start");
        assert_eq!(a.try_recv().unwrap().kind(), "end");
        assert!(a.try_recv().is_err());
        assert!(b.try_recv().is_err());
        assert_eq!(bus.subscriber_count("a"), 0);
        assert_eq!(bus.subscriber_count("b"), 1);
    }

    #[test]
    fn fn_sink_forwards_job_id() {
        let seen = Mutex::new(Vec::new());
        let sink = FnSink(|id: &str, ev: ValidationEvent| seen.lock().push((id.to_string(), ev.kind())));
        sink.emit("j1", ValidationEvent::Error { message: "boom".into() });
        assert_eq!(seen.lock().as_slice(), &[("j1".to_string(), "error")]);
    }
}
