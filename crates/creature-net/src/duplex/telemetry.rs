// ── Telemetry queues ──
//
// A `MessageProcessor` that turns server log lines and counters into
// suspend-until-available streams. Everything else is forwarded to an
// optional downstream processor.

use std::sync::Arc;

use crate::message::{
    CreatureActivity, IdleState, JobCompletion, JobProgress, MessageProcessor, Notice,
    PlaylistStatus, ServerCounters, ServerLogItem, StatusLights, StreamFrameData,
};
use crate::queue::AsyncBlockingQueue;

/// Streams `logging` and `server-counters` messages through queues.
#[derive(Default)]
pub struct TelemetryQueues {
    logs: Arc<AsyncBlockingQueue<ServerLogItem>>,
    counters: Arc<AsyncBlockingQueue<ServerCounters>>,
    downstream: Option<Arc<dyn MessageProcessor>>,
}

impl TelemetryQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward every non-telemetry message to `downstream`.
    pub fn with_downstream(downstream: Arc<dyn MessageProcessor>) -> Self {
        Self {
            downstream: Some(downstream),
            ..Self::default()
        }
    }

    /// Server log lines, in arrival order.
    pub fn logs(&self) -> Arc<AsyncBlockingQueue<ServerLogItem>> {
        Arc::clone(&self.logs)
    }

    /// Server counter snapshots, in arrival order.
    pub fn counters(&self) -> Arc<AsyncBlockingQueue<ServerCounters>> {
        Arc::clone(&self.counters)
    }

    /// Cancel both queues, releasing any suspended consumers.
    pub fn close(&self) {
        self.logs.cancel();
        self.counters.cancel();
    }

    fn forward(&self, f: impl FnOnce(&dyn MessageProcessor)) {
        if let Some(downstream) = &self.downstream {
            f(downstream.as_ref());
        }
    }
}

impl MessageProcessor for TelemetryQueues {
    fn process_log(&self, item: ServerLogItem) {
        self.logs.enqueue(item);
    }

    fn process_server_counters(&self, counters: ServerCounters) {
        self.counters.enqueue(counters);
    }

    fn process_notice(&self, notice: Notice) {
        self.forward(|p| p.process_notice(notice));
    }

    fn process_stream_frame(&self, frame: StreamFrameData) {
        self.forward(|p| p.process_stream_frame(frame));
    }

    fn process_status_lights(&self, lights: StatusLights) {
        self.forward(|p| p.process_status_lights(lights));
    }

    fn process_job_progress(&self, progress: JobProgress) {
        self.forward(|p| p.process_job_progress(progress));
    }

    fn process_job_complete(&self, completion: JobCompletion) {
        self.forward(|p| p.process_job_complete(completion));
    }

    fn process_playlist_status(&self, status: PlaylistStatus) {
        self.forward(|p| p.process_playlist_status(status));
    }

    fn process_idle_state(&self, state: IdleState) {
        self.forward(|p| p.process_idle_state(state));
    }

    fn process_creature_activity(&self, activity: CreatureActivity) {
        self.forward(|p| p.process_creature_activity(activity));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::message::{Message, dispatch};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Notices(Mutex<Vec<String>>);

    impl MessageProcessor for Notices {
        fn process_notice(&self, notice: Notice) {
            self.0.lock().unwrap().push(notice.message);
        }
    }

    #[tokio::test]
    async fn telemetry_is_queued_and_the_rest_forwarded() {
        let notices = Arc::new(Notices::default());
        let queues = TelemetryQueues::with_downstream(notices.clone());
        let logs = queues.logs();

        let log = Message::decode(
            r#"{"command":"logging","payload":{"timestamp":"2026-10-18T08:30:00Z","level":"info","message":"hello"}}"#,
        )
        .unwrap();
        let notice = Message::decode(
            r#"{"command":"notice","payload":{"message":"hi","timestamp":"2026-10-18T08:30:00Z"}}"#,
        )
        .unwrap();

        assert!(dispatch(&queues, log));
        assert!(dispatch(&queues, notice));

        assert_eq!(logs.dequeue().await.unwrap().message, "hello");
        assert_eq!(*notices.0.lock().unwrap(), vec!["hi".to_string()]);

        queues.close();
        assert!(logs.dequeue().await.is_none());
        assert!(queues.counters().dequeue().await.is_none());
    }
}
