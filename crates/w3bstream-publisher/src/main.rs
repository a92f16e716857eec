// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;

use serde::Deserialize;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use w3bstream_client::{ClientOptions, Event, Header, W3bstreamClient};

/// One line of input: `{"header": {...}, "payload": <json>}`.
#[derive(Debug, Deserialize)]
struct InputEvent {
    header: Header,
    payload: serde_json::Value,
}

fn parse_event(line: &str) -> Result<Event, serde_json::Error> {
    let input: InputEvent = serde_json::from_str(line)?;
    Ok(Event::new(input.header, input.payload))
}

#[tokio::main]
pub async fn main() {
    let log_level = env::var("W3BSTREAM_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let url = env::var("W3BSTREAM_URL").unwrap_or_default();
    let api_key = env::var("W3BSTREAM_API_KEY").unwrap_or_default();

    let options = match ClientOptions::from_env() {
        Ok(options) => options,
        Err(e) => {
            error!("Invalid configuration: {e}. Shutting down publisher.");
            return;
        }
    };

    let client = match W3bstreamClient::new(&url, &api_key, options) {
        Ok(client) => client,
        Err(e) => {
            error!("Unable to create W3bstream client: {e}. Shutting down publisher.");
            return;
        }
    };
    info!(
        "Publishing events from stdin, batching {}",
        if client.is_batching() {
            "enabled"
        } else {
            "disabled"
        }
    );

    let mut pending: Vec<Event> = Vec::new();
    let mut lines = BufReader::new(stdin()).lines();
    let mut line_number = 0_usize;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read from stdin: {e}");
                break;
            }
        };
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let event = match parse_event(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping malformed line {line_number}: {e}");
                continue;
            }
        };

        if client.is_batching() {
            match client.enqueue(&event.header, event.payload) {
                Ok(true) => {}
                Ok(false) => warn!("Queue full, dropping event from line {line_number}"),
                Err(e) => error!("Failed to enqueue event from line {line_number}: {e}"),
            }
        } else {
            pending.push(event);
        }
    }

    if !pending.is_empty() {
        match client.publish(&pending).await {
            Ok(responses) => info!(
                "Published {} events in {} requests",
                pending.len(),
                responses.len()
            ),
            Err(e) => error!("Failed to publish events: {e}"),
        }
    }

    let delivered = client.stop().await;
    if client.queue_len() > 0 {
        warn!(
            "Shutting down with {} undelivered events in queue",
            client.queue_len()
        );
    }
    debug!("Publisher stopped, {delivered} events delivered by final flush");
}
