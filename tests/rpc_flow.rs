// SPDX-License-Identifier: MIT OR Apache-2.0
//! RPC over the in-process transport: the literal fragmentation vector
//! and the remote-error envelope.

use one_store::rpc::{
    FRAGMENTATION_END, FRAGMENTATION_START_BINARY, FragmentCollector, Promisifier, WireMessage,
    encode_fragments, memory_pair,
};
use serde_json::{Value, json};

#[test]
fn fragmentation_vector_251_bytes_chunk_40() {
    let payload: Vec<u8> = (0u8..=250).collect();
    let frames = encode_fragments(WireMessage::Binary(payload.clone()), 40);

    // start-binary, 40×6 + 11 in seven data frames, end: nine frames.
    assert_eq!(frames.len(), 9);
    assert_eq!(frames[0], WireMessage::Text(FRAGMENTATION_START_BINARY.into()));
    for (i, frame) in frames[1..8].iter().enumerate() {
        let start = i * 40;
        let end = (start + 40).min(251);
        assert_eq!(*frame, WireMessage::Binary(payload[start..end].to_vec()));
    }
    assert_eq!(frames[8], WireMessage::Text(FRAGMENTATION_END.into()));

    let mut collector = FragmentCollector::new();
    let mut out = None;
    for frame in frames {
        if let Some(message) = collector.push(frame).unwrap() {
            out = Some(message);
        }
    }
    assert_eq!(out, Some(WireMessage::Binary(payload)));
}

#[tokio::test]
async fn remote_error_envelope_is_bit_exact() {
    let ((a, a_rx), (b, b_rx)) = memory_pair();
    let caller = Promisifier::new(a, a_rx);
    let callee = Promisifier::new(b, b_rx);

    callee.add_service(1, |_| async {
        Err::<Value, _>(one_store::error::ErrorCause::plain("Something is very wrong"))
    });

    let err = caller.call(1, vec![]).await.unwrap_err();
    assert_eq!(err.name(), "WebsocketRequestError");
    assert_eq!(err.code(), "WSRQ-JRMH1");
    assert_eq!(
        err.message(),
        "WSRQ-JRMH1: Remote websocket function returned an error (see \"cause\" property)"
    );
    let cause = err.cause().unwrap();
    assert_eq!(cause.name, "Error");
    assert_eq!(cause.message, "Something is very wrong");
}

#[tokio::test]
async fn request_response_over_the_facade() {
    let ((a, a_rx), (b, b_rx)) = memory_pair();
    let caller = Promisifier::new(a, a_rx);
    let callee = Promisifier::new(b, b_rx);

    callee.add_service(12, |args| async move {
        let name = args[0].as_str().unwrap_or("world");
        Ok(json!(format!("hello {name}")))
    });

    let result = caller.call(12, vec![json!("one")]).await.unwrap();
    assert_eq!(result, json!("hello one"));

    let stats = caller.stats();
    assert_eq!(stats.requests_sent_total, 1);
    assert_eq!(stats.requests_received_invalid, 0);
}
