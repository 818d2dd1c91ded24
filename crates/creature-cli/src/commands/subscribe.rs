//! `creature subscribe`: print what the broker delivers for a topic.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use creature_config::Config;
use creature_net::{InboundMessage, Outcome, PubSubConnector};

use super::{interrupted, qos};
use crate::cli::{GlobalOpts, SubscribeArgs};
use crate::error::CliError;
use crate::output::{self, Painter};

/// How often to check that the broker session is still up.
const LIVENESS_CHECK: Duration = Duration::from_secs(1);

#[derive(Serialize)]
struct MessageRecord<'a> {
    topic: &'a str,
    payload: std::borrow::Cow<'a, str>,
}

impl<'a> From<&'a InboundMessage> for MessageRecord<'a> {
    fn from(msg: &'a InboundMessage) -> Self {
        Self {
            topic: &msg.topic,
            payload: String::from_utf8_lossy(&msg.payload),
        }
    }
}

pub async fn handle(args: SubscribeArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let broker = cfg.broker_config()?;
    let target = format!("{}:{}", broker.host, broker.port);
    let connector = PubSubConnector::new(broker);
    connector.connect().await?;

    let mut messages = connector.messages();
    if connector.subscribe(&args.topic, qos(args.qos)).await? == Outcome::Suppressed {
        tracing::warn!(topic = %args.topic, "subscription suppressed by backoff");
    }

    let format = output::format(global, cfg);
    let painter = Painter::new(global.color);
    let mut liveness = tokio::time::interval(LIVENESS_CHECK);
    let mut seen: u64 = 0;

    let result = loop {
        let received = tokio::select! {
            () = interrupted() => break Ok(()),
            _ = liveness.tick() => {
                if connector.is_connected() {
                    continue;
                }
                break Err(CliError::ConnectionLost { target });
            }
            received = messages.recv() => received,
        };

        match received {
            Ok(msg) => {
                let rendered = output::render_event(format, &MessageRecord::from(&msg), |r| {
                    format!("{} {}", painter.accent(r.topic), r.payload)
                });
                match rendered {
                    Ok(line) => output::print_output(&line, global.quiet),
                    Err(e) => break Err(e),
                }
                seen += 1;
                if args.count.is_some_and(|n| seen >= n) {
                    break Ok(());
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "output too slow, messages dropped");
            }
            Err(RecvError::Closed) => break Ok(()),
        }
    };

    connector.shutdown().await;
    result
}
