//! End-to-end transport tests: round trips, format echoing, out-of-order
//! completion, error isolation, and lifecycle guarantees.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use orpc_webrtc::DataChannelHandler;
use orpc_webrtc_client::LinkBuilder;
use orpc_webrtc_core::{
    BindServerPeer, ErrorHook, ErrorKind, Frame, FrameCodec, FrameId, HandlerFn, RawMessage,
    ServerPeer, TransportError, WriteFn,
};
use orpc_webrtc_test::channel::MemoryChannel;
use orpc_webrtc_test::codec::TestCodec;
use orpc_webrtc_test::engine::{ClientEngineFactory, ServerEngineFactory, kind};
use serde_json::{Value, json};
use tokio::time::sleep;

/// Handler that answers every request with its own payload.
fn identity_handler() -> HandlerFn {
    Arc::new(|frame: Frame| -> BoxFuture<'static, Result<Frame, TransportError>> {
        Box::pin(async move { Ok(Frame::new(frame.id, kind::RESPONSE, frame.payload)) })
    })
}

/// Identity handler that also counts invocations.
fn counting_handler(calls: Arc<AtomicUsize>) -> HandlerFn {
    Arc::new(move |frame: Frame| -> BoxFuture<'static, Result<Frame, TransportError>> {
        calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(Frame::new(frame.id, kind::RESPONSE, frame.payload)) })
    })
}

type SeenErrors = Arc<Mutex<Vec<(ErrorKind, Option<FrameId>)>>>;

fn collecting_hook() -> (ErrorHook, SeenErrors) {
    let seen: SeenErrors = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let hook: ErrorHook = Arc::new(move |err, id| {
        sink.lock().unwrap().push((err.kind(), id.cloned()));
    });
    (hook, seen)
}

/// Parse a compact `[id, kind, payload]` message.
fn parse_compact(raw: RawMessage) -> Value {
    match raw {
        RawMessage::Text(text) => serde_json::from_str(&text).unwrap(),
        RawMessage::Binary(bytes) => serde_json::from_slice(&bytes).unwrap(),
        RawMessage::Value(value) => value,
    }
}

fn compact_response(id: &Value, payload: Value) -> RawMessage {
    RawMessage::Text(json!([id, kind::RESPONSE.0, payload]).to_string())
}

/// Engine double whose response frames carry numeric ids even when the
/// request id arrived as a string, like framework versions that track ids
/// numerically.
struct NormalizingEngine {
    write: WriteFn,
}

#[async_trait]
impl ServerPeer for NormalizingEngine {
    async fn message(&self, frame: Frame, handler: &HandlerFn) -> Result<(), TransportError> {
        let mut response = handler(frame).await?;
        if let FrameId::Text(text) = &response.id {
            if let Ok(n) = text.parse::<u64>() {
                response.id = FrameId::Number(n);
            }
        }
        (self.write)(response).await;
        Ok(())
    }

    fn close(&self) {}
}

struct NormalizingEngineFactory;

impl BindServerPeer for NormalizingEngineFactory {
    type Peer = NormalizingEngine;

    fn bind(&self, write: WriteFn) -> Arc<NormalizingEngine> {
        Arc::new(NormalizingEngine { write })
    }
}

/// Codec whose compact decode takes a while, standing in for multi-part
/// payload reassembly.
struct SlowCodec {
    inner: TestCodec,
}

#[async_trait]
impl FrameCodec for SlowCodec {
    async fn encode_compact(&self, frame: Frame) -> Result<RawMessage, TransportError> {
        self.inner.encode_compact(frame).await
    }

    async fn decode_compact(&self, raw: RawMessage) -> Result<Frame, TransportError> {
        sleep(Duration::from_millis(30)).await;
        self.inner.decode_compact(raw).await
    }

    fn serialize(&self, frame: &Frame) -> Result<Value, TransportError> {
        self.inner.serialize(frame)
    }

    fn deserialize(&self, envelope: Value) -> Result<Frame, TransportError> {
        self.inner.deserialize(envelope)
    }
}

#[tokio::test]
async fn round_trip_resolves_to_equal_payload() {
    let codec = Arc::new(TestCodec::text());
    let (client_side, server_side) = MemoryChannel::pair();
    let handler = DataChannelHandler::new(ServerEngineFactory, codec.clone());
    let _binding = handler.upgrade(server_side, identity_handler());
    let link = LinkBuilder::new(ClientEngineFactory, codec).connect(client_side);

    let payloads = [
        json!(null),
        json!("just a string"),
        json!({"song": "believe", "pitch": [1, 2, 3], "meta": {"ok": true}}),
        json!([{"deep": {"nesting": [null, 1.5, "x"]}}]),
    ];
    for payload in payloads {
        let response = link.call(payload.clone()).await.unwrap();
        assert_eq!(response, payload);
    }
}

#[tokio::test]
async fn concurrent_calls_share_one_channel() {
    let codec = Arc::new(TestCodec::text());
    let (client_side, server_side) = MemoryChannel::pair();
    let handler = DataChannelHandler::new(ServerEngineFactory, codec.clone());
    let _binding = handler.upgrade(server_side, identity_handler());
    let link = Arc::new(LinkBuilder::new(ClientEngineFactory, codec).connect(client_side));

    let calls: Vec<_> = (0..8)
        .map(|n| {
            let link = link.clone();
            tokio::spawn(async move { link.call(json!({"n": n})).await })
        })
        .collect();
    for (n, call) in calls.into_iter().enumerate() {
        assert_eq!(call.await.unwrap().unwrap(), json!({"n": n}));
    }
}

#[tokio::test]
async fn verbose_request_gets_verbose_response_with_same_id() {
    let codec = Arc::new(TestCodec::text());
    let (channel, mut outbound) = MemoryChannel::endpoint();
    let handler = DataChannelHandler::new(ServerEngineFactory, codec);
    let _binding = handler.upgrade(channel.clone(), identity_handler());

    channel.deliver(RawMessage::Text(
        r#"{"i":"42","p":{"k":0,"b":{"hello":"world"}}}"#.into(),
    ));

    let RawMessage::Text(text) = outbound.recv().await.unwrap() else {
        panic!("verbose response must be text");
    };
    let response: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(response["i"], json!("42"));
    assert_eq!(response["p"]["b"], json!({"hello": "world"}));
}

#[tokio::test]
async fn compact_text_request_gets_compact_text_response() {
    let codec = Arc::new(TestCodec::text());
    let (channel, mut outbound) = MemoryChannel::endpoint();
    let handler = DataChannelHandler::new(ServerEngineFactory, codec);
    let _binding = handler.upgrade(channel.clone(), identity_handler());

    channel.deliver(RawMessage::Text(r#"["42",0,{"n":1}]"#.into()));

    let raw = outbound.recv().await.unwrap();
    assert!(matches!(raw, RawMessage::Text(_)));
    let response = parse_compact(raw);
    assert_eq!(response[0], json!("42"));
    assert_eq!(response[2], json!({"n": 1}));
}

#[tokio::test]
async fn compact_binary_request_gets_compact_binary_response() {
    let codec = Arc::new(TestCodec::binary());
    let (channel, mut outbound) = MemoryChannel::endpoint();
    let handler = DataChannelHandler::new(ServerEngineFactory, codec);
    let _binding = handler.upgrade(channel.clone(), identity_handler());

    let request = serde_json::to_vec(&json!([7, 0, {"n": 2}])).unwrap();
    channel.deliver(RawMessage::Binary(request.into()));

    let raw = outbound.recv().await.unwrap();
    assert!(matches!(raw, RawMessage::Binary(_)));
    let response = parse_compact(raw);
    assert_eq!(response[0], json!(7));
    assert_eq!(response[2], json!({"n": 2}));
}

#[tokio::test]
async fn verbose_reply_survives_numeric_id_normalization() {
    let codec = Arc::new(TestCodec::text());
    let (channel, mut outbound) = MemoryChannel::endpoint();
    let handler = DataChannelHandler::new(NormalizingEngineFactory, codec);
    let _binding = handler.upgrade(channel.clone(), identity_handler());

    channel.deliver(RawMessage::Text(
        r#"{"i":"42","p":{"k":0,"b":{"x":1}}}"#.into(),
    ));

    let RawMessage::Text(text) = outbound.recv().await.unwrap() else {
        panic!("verbose request must be answered with text");
    };
    let response: Value = serde_json::from_str(&text).unwrap();
    // Still the verbose envelope, even though the engine re-minted the id
    // as a number
    assert_eq!(response["i"], json!(42));
    assert_eq!(response["p"]["b"], json!({"x": 1}));
}

#[tokio::test]
async fn pre_parsed_envelope_is_accepted() {
    let codec = Arc::new(TestCodec::text());
    let (channel, mut outbound) = MemoryChannel::endpoint();
    let handler = DataChannelHandler::new(ServerEngineFactory, codec);
    let _binding = handler.upgrade(channel.clone(), identity_handler());

    channel.deliver(RawMessage::Value(json!({"i": 5, "p": {"k": 0, "b": "hi"}})));

    let RawMessage::Text(text) = outbound.recv().await.unwrap() else {
        panic!("envelope response must be text");
    };
    let response: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(response["i"], json!(5));
    assert_eq!(response["p"]["b"], json!("hi"));
}

#[tokio::test]
async fn format_registry_is_empty_after_requests_complete() {
    let codec = Arc::new(TestCodec::text());
    let (channel, mut outbound) = MemoryChannel::endpoint();
    let handler = DataChannelHandler::new(ServerEngineFactory, codec);
    let binding = handler.upgrade(channel.clone(), identity_handler());

    for n in 0..1000u32 {
        let message = if n % 2 == 0 {
            RawMessage::Text(json!([n, 0, {"n": n}]).to_string())
        } else {
            RawMessage::Text(json!({"i": n, "p": {"k": 0, "b": {"n": n}}}).to_string())
        };
        channel.deliver(message);
        outbound.recv().await.unwrap();
    }

    assert_eq!(binding.outstanding(), 0);
}

#[tokio::test]
async fn out_of_order_responses_resolve_independently() {
    let codec = Arc::new(TestCodec::text());
    let (channel, mut outbound) = MemoryChannel::endpoint();
    let link = Arc::new(LinkBuilder::new(ClientEngineFactory, codec).connect(channel.clone()));

    let link_a = link.clone();
    let call_a = tokio::spawn(async move { link_a.call(json!({"call": "a"})).await });
    let link_b = link.clone();
    let call_b = tokio::spawn(async move { link_b.call(json!({"call": "b"})).await });

    let first = parse_compact(outbound.recv().await.unwrap());
    let second = parse_compact(outbound.recv().await.unwrap());
    let (id_a, id_b) = if first[2] == json!({"call": "a"}) {
        (first[0].clone(), second[0].clone())
    } else {
        (second[0].clone(), first[0].clone())
    };

    // Answer "b" first; "a" must stay pending
    channel.deliver(compact_response(&id_b, json!({"answer": "b"})));
    sleep(Duration::from_millis(20)).await;
    assert!(call_b.is_finished());
    assert!(!call_a.is_finished());

    channel.deliver(compact_response(&id_a, json!({"answer": "a"})));
    assert_eq!(call_a.await.unwrap().unwrap(), json!({"answer": "a"}));
    assert_eq!(call_b.await.unwrap().unwrap(), json!({"answer": "b"}));
}

#[tokio::test]
async fn malformed_message_does_not_affect_later_requests() {
    let codec = Arc::new(TestCodec::text());
    let (channel, mut outbound) = MemoryChannel::endpoint();
    let (hook, seen) = collecting_hook();
    let handler = DataChannelHandler::new(ServerEngineFactory, codec).with_error_hook(hook);
    let _binding = handler.upgrade(channel.clone(), identity_handler());

    channel.deliver(RawMessage::Text("@@not-decodable@@".into()));
    channel.deliver(RawMessage::Text(r#"[1,0,{"ok":true}]"#.into()));

    let response = parse_compact(outbound.recv().await.unwrap());
    assert_eq!(response[0], json!(1));
    assert_eq!(response[2], json!({"ok": true}));

    sleep(Duration::from_millis(20)).await;
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], (ErrorKind::Decode, None));
}

#[tokio::test]
async fn handler_failure_rejects_the_call_without_wedging_the_channel() {
    let codec = Arc::new(TestCodec::text());
    let (client_side, server_side) = MemoryChannel::pair();
    let (hook, seen) = collecting_hook();
    let failing: HandlerFn =
        Arc::new(|frame: Frame| -> BoxFuture<'static, Result<Frame, TransportError>> {
            Box::pin(async move {
                let _ = frame;
                Err(TransportError::dispatch("boom"))
            })
        });
    let handler = DataChannelHandler::new(ServerEngineFactory, codec.clone()).with_error_hook(hook);
    let _binding = handler.upgrade(server_side, failing);
    let link = LinkBuilder::new(ClientEngineFactory, codec).connect(client_side);

    let err = link.call(json!({"will": "fail"})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Dispatch);
    assert!(!err.is_cancellation());

    sleep(Duration::from_millis(20)).await;
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, ErrorKind::Dispatch);
    assert!(seen[0].1.is_some());
}

#[tokio::test]
async fn close_rejects_all_pending_calls_with_cancellation() {
    let codec = Arc::new(TestCodec::text());
    let (channel, mut outbound) = MemoryChannel::endpoint();
    let link = Arc::new(LinkBuilder::new(ClientEngineFactory, codec).connect(channel.clone()));

    let calls: Vec<_> = (0..3)
        .map(|n| {
            let link = link.clone();
            tokio::spawn(async move { link.call(json!({"n": n})).await })
        })
        .collect();
    for _ in 0..3 {
        outbound.recv().await.unwrap();
    }

    channel.close();
    sleep(Duration::from_millis(20)).await;

    for call in calls {
        let err = call.await.unwrap().unwrap_err();
        assert!(err.is_cancellation(), "expected cancellation, got {err}");
    }
    assert!(link.is_closed());

    // New calls reject immediately
    let err = link.call(json!({"late": true})).await.unwrap_err();
    assert!(err.is_cancellation());
}

#[tokio::test]
async fn explicit_close_matches_close_event_and_is_idempotent() {
    let codec = Arc::new(TestCodec::text());
    let (channel, _outbound) = MemoryChannel::endpoint();
    let link = Arc::new(LinkBuilder::new(ClientEngineFactory, codec).connect(channel.clone()));

    let pending = {
        let link = link.clone();
        tokio::spawn(async move { link.call(json!({"x": 1})).await })
    };
    sleep(Duration::from_millis(10)).await;

    link.close();
    link.close();

    let err = pending.await.unwrap().unwrap_err();
    assert!(err.is_cancellation());
    assert!(link.is_closed());
}

#[tokio::test]
async fn disposed_responder_ignores_later_messages() {
    let codec = Arc::new(TestCodec::text());
    let (channel, mut outbound) = MemoryChannel::endpoint();
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = DataChannelHandler::new(ServerEngineFactory, codec);
    let binding = handler.upgrade(channel.clone(), counting_handler(calls.clone()));

    binding.dispose();
    channel.deliver(RawMessage::Text(r#"[1,0,{"late":true}]"#.into()));
    sleep(Duration::from_millis(20)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(outbound.try_recv().is_err());

    // Second dispose must be a no-op
    binding.dispose();
    assert!(binding.is_disposed());
}

#[tokio::test]
async fn dispose_during_decode_leaves_no_registry_entry() {
    let codec = Arc::new(SlowCodec {
        inner: TestCodec::text(),
    });
    let (channel, mut outbound) = MemoryChannel::endpoint();
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = DataChannelHandler::new(ServerEngineFactory, codec);
    let binding = handler.upgrade(channel.clone(), counting_handler(calls.clone()));

    channel.deliver(RawMessage::Text(r#"[1,0,{"x":1}]"#.into()));
    sleep(Duration::from_millis(10)).await;
    // Dispose while the message is still being decoded
    binding.dispose();
    sleep(Duration::from_millis(50)).await;

    assert_eq!(binding.outstanding(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(outbound.try_recv().is_err());
}

#[tokio::test]
async fn close_event_disposes_responder() {
    let codec = Arc::new(TestCodec::text());
    let (channel, mut outbound) = MemoryChannel::endpoint();
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = DataChannelHandler::new(ServerEngineFactory, codec);
    let binding = handler.upgrade(channel.clone(), counting_handler(calls.clone()));

    channel.close();
    sleep(Duration::from_millis(20)).await;
    assert!(binding.is_disposed());

    channel.deliver(RawMessage::Text(r#"[1,0,{"late":true}]"#.into()));
    sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(outbound.try_recv().is_err());
}
