//! `creature publish`: send one message to the broker.

use serde::Serialize;

use creature_config::Config;
use creature_net::{Outcome, PubSubConnector};

use super::qos;
use crate::cli::{GlobalOpts, PublishArgs};
use crate::error::CliError;
use crate::output::{self, Painter};

#[derive(Serialize)]
struct PublishRecord<'a> {
    topic: &'a str,
    bytes: usize,
    qos: u8,
    retain: bool,
    outcome: &'static str,
}

pub async fn handle(args: PublishArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let broker = cfg.broker_config()?;
    tracing::debug!(host = %broker.host, port = broker.port, topic = %args.topic, "publishing");

    let connector = PubSubConnector::new(broker);
    connector.connect().await?;

    let bytes = args.message.len();
    let result = connector
        .publish(&args.topic, args.message, qos(args.qos), args.retain)
        .await;
    connector.shutdown().await;

    let outcome = match result? {
        Outcome::Completed => "completed",
        Outcome::Suppressed => "suppressed",
    };
    let record = PublishRecord {
        topic: &args.topic,
        bytes,
        qos: args.qos,
        retain: args.retain,
        outcome,
    };
    let painter = Painter::new(global.color);
    let line = output::render_event(output::format(global, cfg), &record, |r| {
        format!(
            "{} {} bytes to {}",
            painter.good("published"),
            r.bytes,
            painter.accent(r.topic)
        )
    })?;
    output::print_output(&line, global.quiet);
    Ok(())
}
