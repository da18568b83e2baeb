// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use hec_sender::{DeliveryFailure, HecSender, SenderConfig};

mod input;

const POSITIONAL_PARAMETERS_VAR: &str = "HEC_INCLUDE_POSITIONAL_PARAMETERS";

#[tokio::main]
pub async fn main() {
    let log_level = env::var("HEC_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match SenderConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error creating config on hec forwarder startup: {e}");
            return;
        }
    };
    let flush_each_record = !config.batch.is_batching();
    let include_positional = include_positional_parameters();

    let sender = match HecSender::new(config) {
        Ok(sender) => sender,
        Err(e) => {
            error!("Error starting hec forwarder: {e}");
            return;
        }
    };
    sender.on_error(|failure: &DeliveryFailure| {
        error!("HEC | {failure}");
    });

    info!("hec-forwarder: reading events from stdin");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut lines = BufReader::new(stdin()).lines();
    let mut forwarded: u64 = 0;

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if forward(&sender, &line, include_positional) {
                        forwarded += 1;
                        if flush_each_record {
                            sender.flush_and_wait().await;
                        }
                    }
                }
                Ok(None) => {
                    debug!("End of input");
                    break;
                }
                Err(e) => {
                    error!("Error reading stdin: {e}");
                    break;
                }
            },
            _ = &mut shutdown => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    sender.shutdown().await;
    info!("hec-forwarder: forwarded {forwarded} events");
}

/// Sends one input line. Returns whether a record was accepted.
fn forward(sender: &HecSender, line: &str, include_positional: bool) -> bool {
    let Some(line) = input::parse_line(line) else {
        return false;
    };
    let metadata = sender.metadata_for(&line.logger);
    match sender.send(input::to_record(line, metadata, include_positional)) {
        Ok(()) => true,
        Err(e) => {
            error!("Dropping event: {e}");
            false
        }
    }
}

fn include_positional_parameters() -> bool {
    env::var(POSITIONAL_PARAMETERS_VAR)
        .map(|val| matches!(val.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}
