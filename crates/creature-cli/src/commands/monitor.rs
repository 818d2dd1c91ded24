//! `creature monitor`: follow the control server's duplex channel.
//!
//! Notices, job updates and creature activity are printed as they arrive;
//! server log lines and counters stream through the telemetry queues. The
//! client itself never reconnects, so this command owns that loop: after a
//! lost connection or a failed attempt it waits with capped exponential
//! backoff and tries again until interrupted.

use std::sync::Arc;

use serde::Serialize;

use creature_config::Config;
use creature_net::message::{
    CreatureActivity, IdleState, JobCompletion, JobProgress, Notice, PlaylistStatus,
    ServerCounters, ServerLogItem, StatusLights,
};
use creature_net::{
    BackoffPolicy, ConnectionState, DuplexClient, Message, MessageProcessor, TelemetryQueues,
};

use super::interrupted;
use crate::cli::{GlobalOpts, MonitorArgs, OutputFormat};
use crate::error::CliError;
use crate::output::{self, Painter};

// ── Event printer ────────────────────────────────────────────────────

/// Prints every non-telemetry message the server sends.
struct EventPrinter {
    format: OutputFormat,
    painter: Painter,
    quiet: bool,
}

impl EventPrinter {
    fn emit(&self, message: &Message) {
        let line = match self.format {
            OutputFormat::Json => match message.encode() {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot re-encode message");
                    return;
                }
            },
            OutputFormat::Table => self.describe(message),
        };
        output::print_output(&line, self.quiet);
    }

    fn describe(&self, message: &Message) -> String {
        let p = self.painter;
        let tag = p.accent(&format!("[{}]", message.command()));
        let body = match message {
            Message::Notice(n) => format!("{} {}", p.dim(&n.timestamp.to_rfc3339()), n.message),
            Message::StatusLights(s) => format!(
                "running={} dmx={} streaming={} animation={}",
                flag(p, s.running),
                flag(p, s.dmx),
                flag(p, s.streaming),
                flag(p, s.animation_playing),
            ),
            Message::JobProgress(j) => {
                format!("{} {} {:.0}%", j.job_type, p.dim(&j.job_id), j.progress * 100.0)
            }
            Message::JobComplete(j) => {
                let status = if j.status.eq_ignore_ascii_case("completed") {
                    p.good(&j.status)
                } else {
                    p.bad(&j.status)
                };
                format!("{} {} {status}", j.job_type, p.dim(&j.job_id))
            }
            Message::PlaylistStatus(s) => format!(
                "universe {} playlist {} {}",
                s.universe,
                s.playlist,
                if s.playing { p.good("playing") } else { p.dim("stopped") }
            ),
            Message::IdleState(s) => format!(
                "{} idle {}",
                s.creature_id,
                if s.idle_enabled { p.good("on") } else { p.dim("off") }
            ),
            Message::CreatureActivity(a) => format!(
                "{} {} {}",
                a.creature_id,
                p.warn(&a.state),
                p.dim(a.animation_id.as_deref().unwrap_or("-"))
            ),
            Message::StreamFrame(f) => format!("{} universe {}", f.creature_id, f.universe),
            Message::Logging(l) => l.message.clone(),
            Message::ServerCounters(_) => String::new(),
            Message::Unknown { command } => command.clone(),
        };
        format!("{tag} {body}")
    }
}

fn flag(p: Painter, on: bool) -> String {
    if on { p.good("on") } else { p.dim("off") }
}

impl MessageProcessor for EventPrinter {
    fn process_notice(&self, notice: Notice) {
        self.emit(&Message::Notice(notice));
    }

    fn process_status_lights(&self, lights: StatusLights) {
        self.emit(&Message::StatusLights(lights));
    }

    fn process_job_progress(&self, progress: JobProgress) {
        self.emit(&Message::JobProgress(progress));
    }

    fn process_job_complete(&self, completion: JobCompletion) {
        self.emit(&Message::JobComplete(completion));
    }

    fn process_playlist_status(&self, status: PlaylistStatus) {
        self.emit(&Message::PlaylistStatus(status));
    }

    fn process_idle_state(&self, state: IdleState) {
        self.emit(&Message::IdleState(state));
    }

    fn process_creature_activity(&self, activity: CreatureActivity) {
        self.emit(&Message::CreatureActivity(activity));
    }
}

// ── Telemetry rendering ──────────────────────────────────────────────

#[derive(Serialize)]
struct LogRecord<'a> {
    command: &'static str,
    #[serde(flatten)]
    item: &'a ServerLogItem,
}

fn log_line(item: &ServerLogItem, format: OutputFormat, painter: Painter) -> Result<String, CliError> {
    let record = LogRecord {
        command: "logging",
        item,
    };
    output::render_event(format, &record, |r| {
        format!(
            "{} {} {}",
            painter.dim(&r.item.timestamp.format("%H:%M:%S%.3f").to_string()),
            painter.level(&r.item.level),
            r.item.message
        )
    })
}

#[derive(Serialize)]
struct CounterRecord<'a> {
    command: &'static str,
    #[serde(flatten)]
    counters: &'a ServerCounters,
}

fn counters_line(
    counters: &ServerCounters,
    format: OutputFormat,
    painter: Painter,
) -> Result<String, CliError> {
    let record = CounterRecord {
        command: "server-counters",
        counters,
    };
    output::render_event(format, &record, |r| {
        let c = r.counters;
        format!(
            "{} frames={} events={} streamed={} sounds={} ws rx/tx={}/{}",
            painter.accent("[counters]"),
            c.total_frames,
            c.events_processed,
            c.frames_streamed,
            c.sounds_played,
            c.websocket_messages_received,
            c.websocket_messages_sent,
        )
    })
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(args: MonitorArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let mut server = cfg.server_config()?;
    if let Some(url) = &args.url {
        server.url = url.parse().map_err(|_| CliError::Validation {
            field: "url".into(),
            reason: format!("invalid URL: {url}"),
        })?;
    }
    let target = server.url.to_string();

    let format = output::format(global, cfg);
    let painter = Painter::new(global.color);
    let printer = Arc::new(EventPrinter {
        format,
        painter,
        quiet: global.quiet,
    });
    let telemetry = Arc::new(TelemetryQueues::with_downstream(printer));

    let logs = telemetry.logs();
    let show_logs = !args.no_logs;
    let quiet = global.quiet;
    let log_task = tokio::spawn(async move {
        while let Some(item) = logs.dequeue().await {
            if show_logs {
                match log_line(&item, format, painter) {
                    Ok(line) => output::print_output(&line, quiet),
                    Err(e) => tracing::warn!(error = %e, "cannot render log line"),
                }
            }
        }
    });

    let counters = telemetry.counters();
    let show_counters = !args.no_counters;
    let counter_task = tokio::spawn(async move {
        while let Some(snapshot) = counters.dequeue().await {
            if show_counters {
                match counters_line(&snapshot, format, painter) {
                    Ok(line) => output::print_output(&line, quiet),
                    Err(e) => tracing::warn!(error = %e, "cannot render counters"),
                }
            }
        }
    });

    let client = DuplexClient::new(server);
    let result = supervise(&client, &telemetry, &args, &target, painter).await;

    client.shutdown().await;
    telemetry.close();
    let _ = log_task.await;
    let _ = counter_task.await;
    result
}

/// Connect, wait for the connection to drop, back off, repeat.
async fn supervise(
    client: &DuplexClient,
    telemetry: &Arc<TelemetryQueues>,
    args: &MonitorArgs,
    target: &str,
    painter: Painter,
) -> Result<(), CliError> {
    let policy = BackoffPolicy::default();
    let mut failures: u32 = 0;

    loop {
        // Teardown clears the processor, so register it for every attempt.
        client.set_processor(Arc::clone(telemetry) as Arc<dyn MessageProcessor>).await;

        let attempt = tokio::select! {
            () = interrupted() => return Ok(()),
            attempt = client.connect() => attempt,
        };

        match attempt {
            Ok(()) => {
                eprintln!("{} {target}", painter.good("connected:"));

                let mut states = client.subscribe_state();
                tokio::select! {
                    () = interrupted() => return Ok(()),
                    _ = states.wait_for(ConnectionState::Disconnected) => {}
                }

                eprintln!("{} {target}", painter.bad("disconnected:"));
                if args.no_reconnect {
                    return Err(CliError::ConnectionLost {
                        target: target.to_owned(),
                    });
                }
                // A session that came up resets the schedule.
                failures = 1;
            }
            Err(e) if args.no_reconnect => return Err(e.into()),
            Err(e) => {
                failures = failures.saturating_add(1).min(policy.max_failures());
                tracing::warn!(error = %e, failures, "connection attempt failed");
            }
        }

        let delay = policy.delay_for(failures);
        eprintln!(
            "{} in {:.1}s",
            painter.warn("reconnecting"),
            delay.as_secs_f64()
        );
        tokio::select! {
            () = interrupted() => return Ok(()),
            () = tokio::time::sleep(delay) => {}
        }
    }
}
