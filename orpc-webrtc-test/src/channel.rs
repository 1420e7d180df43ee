//! In-memory data channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use futures::stream::BoxStream;
use orpc_webrtc_core::{ChannelEvent, DataChannel, RawMessage, TransportError};
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::BroadcastStream;

/// In-memory stand-in for an `RTCDataChannel`.
///
/// Two modes:
/// - [`endpoint`](MemoryChannel::endpoint) for scripted tests: outbound
///   messages land on the returned receiver, inbound messages and the close
///   event are injected with [`deliver`](MemoryChannel::deliver) and
///   [`close`](MemoryChannel::close).
/// - [`pair`](MemoryChannel::pair) for end-to-end tests: each side's sends
///   arrive as message events on the other.
pub struct MemoryChannel {
    events: broadcast::Sender<ChannelEvent>,
    sink: mpsc::UnboundedSender<RawMessage>,
    closed: AtomicBool,
}

impl MemoryChannel {
    /// A scripted endpoint plus the receiver observing its outbound traffic.
    pub fn endpoint() -> (Arc<Self>, mpsc::UnboundedReceiver<RawMessage>) {
        let (sink, outbound) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);
        let channel = Arc::new(Self {
            events,
            sink,
            closed: AtomicBool::new(false),
        });
        (channel, outbound)
    }

    /// Two connected endpoints. Must be called from within a Tokio runtime:
    /// a pump task per direction forwards sends to the other side's events.
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let (a, mut a_outbound) = Self::endpoint();
        let (b, mut b_outbound) = Self::endpoint();

        let to_b = b.clone();
        tokio::spawn(async move {
            while let Some(message) = a_outbound.recv().await {
                to_b.deliver(message);
            }
        });
        let to_a = a.clone();
        tokio::spawn(async move {
            while let Some(message) = b_outbound.recv().await {
                to_a.deliver(message);
            }
        });

        (a, b)
    }

    /// Inject an inbound message event.
    pub fn deliver(&self, message: RawMessage) {
        let _ = self.events.send(ChannelEvent::Message(message));
    }

    /// Fire the close event. Later sends fail; repeated closes are no-ops.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(ChannelEvent::Closed);
        }
    }
}

impl DataChannel for MemoryChannel {
    fn send(&self, message: RawMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::channel("channel is closed"));
        }
        self.sink
            .send(message)
            .map_err(|_| TransportError::channel("receiver dropped"))
    }

    fn events(&self) -> BoxStream<'static, ChannelEvent> {
        BroadcastStream::new(self.events.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}
