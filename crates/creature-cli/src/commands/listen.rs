//! `creature listen`: print frames received on one sACN universe.

use serde::Serialize;
use tokio::sync::mpsc;

use creature_config::Config;
use creature_net::{Frame, MulticastReceiver, ReceiverState, SacnConfig};

use super::interrupted;
use crate::cli::{GlobalOpts, ListenArgs, OutputFormat};
use crate::error::CliError;
use crate::output::{self, Painter};

/// What gets printed for each frame.
#[derive(Debug, Serialize)]
struct FrameRecord<'a> {
    universe: u16,
    sequence: u8,
    priority: u8,
    start_code: u8,
    slots: &'a [u8],
}

pub async fn handle(args: ListenArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let defaults = cfg.sacn_config()?;
    let sacn = SacnConfig::new(
        args.universe.unwrap_or(defaults.universe),
        args.interface.or(defaults.interface),
    )?;
    let format = output::format(global, cfg);
    let painter = Painter::new(global.color);
    let shown = usize::from(args.slots);

    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    let receiver = MulticastReceiver::new();
    receiver
        .start(
            sacn.universe,
            sacn.interface.as_deref(),
            move |frame: &Frame| {
                let _ = tx.send(frame.clone());
            },
            |state| match state {
                ReceiverState::Failed(reason) => tracing::error!(reason = %reason, "receiver failed"),
                other => tracing::info!(state = ?other, "receiver state"),
            },
        )
        .await?;

    if !global.quiet && format == OutputFormat::Table {
        eprintln!(
            "{} universe {} on {} (Ctrl-C to stop)",
            painter.accent("listening:"),
            sacn.universe,
            sacn.interface.as_deref().unwrap_or("default interface"),
        );
    }

    let mut seen: u64 = 0;
    loop {
        let frame = tokio::select! {
            () = interrupted() => break,
            frame = rx.recv() => frame,
        };
        // The receive task ended: the socket failed.
        let Some(frame) = frame else { break };

        let record = FrameRecord {
            universe: frame.universe,
            sequence: frame.sequence,
            priority: frame.priority,
            start_code: frame.start_code,
            slots: &frame.slots[..shown],
        };
        let line = output::render_event(format, &record, |r| {
            format!(
                "{} {} {} {}",
                painter.accent(&format!("u{}", r.universe)),
                painter.dim(&format!("seq {:>3}", r.sequence)),
                painter.dim(&format!("pri {:>3}", r.priority)),
                output::slot_preview(r.slots),
            )
        })?;
        output::print_output(&line, global.quiet);

        seen += 1;
        if args.count.is_some_and(|n| seen >= n) {
            break;
        }
    }

    let state = receiver.state();
    receiver.stop().await;
    let stats = receiver.stats();
    tracing::info!(frames = stats.frames, dropped = stats.dropped, "listener stopped");

    if let ReceiverState::Failed(reason) = state {
        return Err(CliError::ConnectionLost {
            target: format!("sACN universe {} ({reason})", sacn.universe),
        });
    }
    Ok(())
}
