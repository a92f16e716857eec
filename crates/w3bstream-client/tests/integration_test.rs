// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use mockito::{Matcher, Server};
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use w3bstream_client::{
    ClientOptions, Error, Event, Header, TransportError, W3bstreamClient, WorkerState,
};

const MOCK_API_KEY: &str = "mock-api-key";
const MOCK_DEVICE_ID: &str = "1234567890";

fn data_push_query(timestamp: i64) -> Matcher {
    Matcher::AllOf(vec![
        Matcher::UrlEncoded("eventType".into(), "DA-TA_PU-SH".into()),
        Matcher::UrlEncoded("timestamp".into(), timestamp.to_string()),
    ])
}

fn header(timestamp: i64) -> Header {
    Header::new(MOCK_DEVICE_ID)
        .with_event_type("DEFAULT")
        .with_timestamp(timestamp)
}

#[cfg(test)]
#[tokio::test]
async fn publish_direct_follows_wire_contract() {
    let mut mock_server = Server::new_async().await;

    let mock = mock_server
        .mock("POST", "/srv-applet-mgr/v0/event/eth_0x")
        .match_query(data_push_query(1_700_000_000_000))
        .match_header("Authorization", "Bearer mock-api-key")
        .match_header("Content-Type", "application/json")
        .match_body(Matcher::Json(json!([
            {
                "device_id": MOCK_DEVICE_ID,
                "event_type": "DEFAULT",
                "payload": "{\"test\":\"test\"}",
                "timestamp": 1_700_000_000_000_i64,
            }
        ])))
        .with_status(200)
        .with_body(
            json!([
                {
                    "index": 0,
                    "results": [
                        {
                            "appletName": "demo",
                            "instanceID": "1000",
                            "handler": "start",
                            "returnValue": null,
                            "code": 0,
                        }
                    ]
                }
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let url = format!("{}/srv-applet-mgr/v0/event/eth_0x", mock_server.url());
    let client = W3bstreamClient::new(&url, MOCK_API_KEY, ClientOptions::default())
        .expect("failed to create client");

    let response = client
        .publish_direct(&header(1_700_000_000_000), json!({"test": "test"}))
        .await
        .expect("publish failed");

    mock.assert_async().await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.acks.len(), 1);
    assert_eq!(response.acks[0].results[0].applet_name, "demo");
    assert_eq!(response.acks[0].results[0].instance_id, "1000");
}

#[cfg(test)]
#[tokio::test]
async fn publish_direct_reports_rejected_status() {
    let mut mock_server = Server::new_async().await;

    let mock = mock_server
        .mock("POST", "/event")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("node unavailable")
        .create_async()
        .await;

    let url = format!("{}/event", mock_server.url());
    let client = W3bstreamClient::new(&url, MOCK_API_KEY, ClientOptions::default())
        .expect("failed to create client");

    let err = client
        .publish_direct(&header(1), json!({"test": "test"}))
        .await
        .expect_err("a 500 must fail the publish");

    mock.assert_async().await;
    match err {
        Error::Transport(TransportError::Status { status, body }) => {
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body, "node unavailable");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[cfg(test)]
#[tokio::test]
async fn publish_sends_sequential_chunks() {
    let mut mock_server = Server::new_async().await;

    let first_chunk = mock_server
        .mock("POST", "/event")
        .match_query(data_push_query(0))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let second_chunk = mock_server
        .mock("POST", "/event")
        .match_query(data_push_query(10))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let last_chunk = mock_server
        .mock("POST", "/event")
        .match_query(data_push_query(20))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let url = format!("{}/event", mock_server.url());
    let options = ClientOptions {
        batch_size: 10,
        ..Default::default()
    };
    let client = W3bstreamClient::new(&url, MOCK_API_KEY, options).expect("failed to create client");

    let events: Vec<Event> = (0..25)
        .map(|i| Event::new(header(i), json!({"n": i})))
        .collect();
    let responses = client.publish(&events).await.expect("bulk publish failed");

    assert_eq!(responses.len(), 3);
    first_chunk.assert_async().await;
    second_chunk.assert_async().await;
    last_chunk.assert_async().await;
}

#[cfg(test)]
#[tokio::test]
async fn publish_without_device_id_sends_nothing() {
    let mut mock_server = Server::new_async().await;

    let mock = mock_server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let client = W3bstreamClient::new(&mock_server.url(), MOCK_API_KEY, ClientOptions::default())
        .expect("failed to create client");

    let events = vec![
        Event::new(header(1), json!({"n": 1})),
        Event::new(Header::new(""), json!({"n": 2})),
    ];
    let err = client.publish(&events).await.expect_err("must not publish");

    assert!(matches!(err, Error::Validation(_)));
    mock.assert_async().await;
}

#[cfg(test)]
#[tokio::test]
async fn queued_events_are_flushed_by_worker() {
    let mut mock_server = Server::new_async().await;

    let mock = mock_server
        .mock("POST", "/event")
        .match_query(Matcher::Any)
        .match_header("Authorization", "Bearer mock-api-key")
        .with_status(200)
        .expect(3)
        .create_async()
        .await;

    let url = format!("{}/event", mock_server.url());
    let options = ClientOptions {
        enable_batching: true,
        batch_size: 10,
        publish_interval: Duration::from_millis(50),
        ..Default::default()
    };
    let client = W3bstreamClient::new(&url, MOCK_API_KEY, options).expect("failed to create client");

    for i in 0..25 {
        let queued = client
            .enqueue(&header(i), json!({"n": i}))
            .expect("enqueue failed");
        assert!(queued);
    }

    let flush = async {
        while client.queue_len() > 0 || !mock.matched_async().await {
            sleep(Duration::from_millis(20)).await;
        }
    };
    match timeout(Duration::from_secs(2), flush).await {
        Ok(()) => {}
        Err(_) => panic!("timed out before the worker flushed the queue"),
    }

    client.stop().await;
    assert_eq!(client.worker_state(), WorkerState::Stopped);
    mock.assert_async().await;
}

#[cfg(test)]
#[tokio::test]
async fn failed_batch_stays_queued_until_node_recovers() {
    let mut mock_server = Server::new_async().await;

    let unavailable = mock_server
        .mock("POST", "/event")
        .match_query(Matcher::Any)
        .with_status(503)
        .expect(1)
        .create_async()
        .await;

    let url = format!("{}/event", mock_server.url());
    let options = ClientOptions {
        enable_batching: true,
        batch_size: 10,
        // Long enough that only explicit flushes run during the test
        publish_interval: Duration::from_secs(3600),
        ..Default::default()
    };
    let client = W3bstreamClient::new(&url, MOCK_API_KEY, options).expect("failed to create client");

    for i in 0..5 {
        assert!(client.enqueue(&header(i), json!({"n": i})).expect("enqueue failed"));
    }
    assert_eq!(client.drain().await, 0);
    assert_eq!(client.queue_len(), 5);
    unavailable.assert_async().await;
    unavailable.remove_async().await;

    let recovered = mock_server
        .mock("POST", "/event")
        .match_query(data_push_query(0))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    assert_eq!(client.stop().await, 5);
    assert_eq!(client.queue_len(), 0);
    recovered.assert_async().await;
}
