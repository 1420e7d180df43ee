//! Minimal correlation engine.
//!
//! The real engine belongs to the RPC framework; this double implements
//! just enough of its contract to exercise the transport: an id counter and
//! a pending map on the client side, handler dispatch with error frames on
//! the server side.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use orpc_webrtc_core::{
    BindClientPeer, BindServerPeer, ClientPeer, Frame, FrameId, HandlerFn, Payload, ServerPeer,
    TransportError, WriteFn,
};
use serde_json::{Value, json};
use tokio::sync::oneshot;

/// Frame discriminators used by the test engine.
pub mod kind {
    use orpc_webrtc_core::FrameKind;

    pub const REQUEST: FrameKind = FrameKind(0);
    pub const RESPONSE: FrameKind = FrameKind(1);
    pub const ERROR: FrameKind = FrameKind(2);
}

type PendingMap = HashMap<FrameId, oneshot::Sender<Result<Payload, TransportError>>>;

/// Client-side engine: mints ids, tracks pending calls, resolves them when
/// matching frames arrive.
pub struct TestClientEngine {
    write: WriteFn,
    next_id: AtomicU64,
    pending: Mutex<PendingMap>,
    closed: AtomicBool,
}

impl TestClientEngine {
    fn pending(&self) -> MutexGuard<'_, PendingMap> {
        self.pending.lock().unwrap_or_else(|err| err.into_inner())
    }
}

#[async_trait]
impl ClientPeer for TestClientEngine {
    async fn request(&self, request: Payload) -> Result<Payload, TransportError> {
        let id = FrameId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        {
            // Checked under the pending lock so close() either sees this
            // entry when it drains or we see the flag it already set
            let mut pending = self.pending();
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::cancelled("engine is closed"));
            }
            pending.insert(id.clone(), tx);
        }
        (self.write)(Frame::new(id, kind::REQUEST, request)).await;
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(TransportError::cancelled("channel closed with call in flight")),
        }
    }

    async fn accept(&self, frame: Frame) -> Result<(), TransportError> {
        let Some(tx) = self.pending().remove(&frame.id) else {
            return Err(TransportError::dispatch(format!(
                "no outstanding call with id {}",
                frame.id
            )));
        };
        let result = if frame.kind == kind::ERROR {
            let message = frame
                .payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request failed")
                .to_owned();
            Err(TransportError::dispatch(message))
        } else {
            Ok(frame.payload)
        };
        let _ = tx.send(result);
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for (_, tx) in self.pending().drain() {
            let _ = tx.send(Err(TransportError::cancelled("channel closed")));
        }
    }
}

/// Server-side engine: drives the handler and answers with a response or an
/// error frame carrying the request's id.
pub struct TestServerEngine {
    write: WriteFn,
    closed: AtomicBool,
}

#[async_trait]
impl ServerPeer for TestServerEngine {
    async fn message(&self, frame: Frame, handler: &HandlerFn) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::cancelled("engine is closed"));
        }
        let id = frame.id.clone();
        match handler(frame).await {
            Ok(response) => {
                (self.write)(response).await;
                Ok(())
            }
            Err(err) => {
                let report = TransportError::dispatch(err.to_string());
                (self.write)(Frame::new(id, kind::ERROR, json!({"message": err.to_string()})))
                    .await;
                Err(report)
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct ClientEngineFactory;

impl BindClientPeer for ClientEngineFactory {
    type Peer = TestClientEngine;

    fn bind(&self, write: WriteFn) -> Arc<TestClientEngine> {
        Arc::new(TestClientEngine {
            write,
            next_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }
}

pub struct ServerEngineFactory;

impl BindServerPeer for ServerEngineFactory {
    type Peer = TestServerEngine;

    fn bind(&self, write: WriteFn) -> Arc<TestServerEngine> {
        Arc::new(TestServerEngine {
            write,
            closed: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::time::Duration;
    use tokio::time::sleep;

    fn noop_write() -> WriteFn {
        Arc::new(|_frame: Frame| -> BoxFuture<'static, ()> { Box::pin(async {}) })
    }

    #[tokio::test]
    async fn test_request_after_close_rejects_with_cancellation() {
        let engine = ClientEngineFactory.bind(noop_write());
        engine.close();

        let err = engine.request(json!({"x": 1})).await.unwrap_err();
        assert!(err.is_cancellation());
        assert!(engine.pending().is_empty());
    }

    #[tokio::test]
    async fn test_close_rejects_in_flight_request() {
        let engine = ClientEngineFactory.bind(noop_write());

        let pending = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.request(json!({"x": 1})).await })
        };
        sleep(Duration::from_millis(10)).await;
        engine.close();

        let err = pending.await.unwrap().unwrap_err();
        assert!(err.is_cancellation());
        assert!(engine.pending().is_empty());
    }
}
