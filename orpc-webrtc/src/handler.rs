//! Server-side channel upgrade.
//!
//! [`DataChannelHandler::upgrade`] binds one data channel to one correlation
//! engine instance and one [`FormatRegistry`]. Every inbound message is
//! decoded with format auto-detection and dispatched on its own task, so
//! slow handlers do not serialize the channel; responses go out in the
//! format their request arrived in, in whatever order they complete.
//! Correlation is exclusively by id, never by arrival order.

use std::sync::Arc;

use futures::StreamExt;
use futures::future::BoxFuture;
use orpc_webrtc_core::{
    BindServerPeer, ChannelBinding, ChannelEvent, DataChannel, ErrorHook, Frame, FrameCodec,
    HandlerFn, ServerPeer, Teardown, WireFormat, WriteFn, default_error_hook, wire,
};

use crate::registry::FormatRegistry;

/// Handler that serves RPC requests arriving on upgraded data channels.
///
/// Holds the correlation-engine factory and codec; each
/// [`upgrade`](DataChannelHandler::upgrade) binds a fresh engine instance,
/// so one handler can serve many channels as guests join and leave.
pub struct DataChannelHandler<F> {
    factory: F,
    codec: Arc<dyn FrameCodec>,
    on_error: ErrorHook,
}

impl<F: BindServerPeer> DataChannelHandler<F> {
    pub fn new(factory: F, codec: Arc<dyn FrameCodec>) -> Self {
        Self {
            factory,
            codec,
            on_error: default_error_hook(),
        }
    }

    /// Replace the default log-and-continue error hook.
    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.on_error = hook;
        self
    }

    /// Upgrade a data channel to serve RPC requests.
    ///
    /// The channel should be dedicated to receiving requests and sending
    /// responses. Must be called from within a Tokio runtime. The returned
    /// binding is the disposer: dropping it or calling
    /// [`dispose`](ResponderBinding::dispose) removes the receive loop,
    /// closes the engine, and clears the format registry, the same path
    /// the channel's own close event takes.
    pub fn upgrade<C: DataChannel>(
        &self,
        channel: Arc<C>,
        handler: HandlerFn,
    ) -> ResponderBinding {
        let registry = Arc::new(FormatRegistry::new());
        let teardown = Arc::new(Teardown::new());

        let write = response_writer(
            channel.clone(),
            registry.clone(),
            teardown.clone(),
            self.codec.clone(),
            self.on_error.clone(),
        );
        let peer = self.factory.bind(write);

        {
            let peer = peer.clone();
            let registry = registry.clone();
            teardown.install(move || {
                peer.close();
                registry.clear();
            });
        }

        let mut events = channel.events();
        let task = {
            let peer = peer.clone();
            let registry = registry.clone();
            let teardown = teardown.clone();
            let codec = self.codec.clone();
            let on_error = self.on_error.clone();
            tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    match event {
                        ChannelEvent::Message(raw) => {
                            if teardown.is_closed() {
                                break;
                            }
                            let peer = peer.clone();
                            let registry = registry.clone();
                            let teardown = teardown.clone();
                            let codec = codec.clone();
                            let handler = handler.clone();
                            let on_error = on_error.clone();
                            tokio::spawn(async move {
                                if teardown.is_closed() {
                                    return;
                                }
                                let (frame, format) =
                                    match wire::decode(raw, codec.as_ref()).await {
                                        Ok(decoded) => decoded,
                                        Err(err) => {
                                            // No id was extracted yet
                                            on_error(&err, None);
                                            return;
                                        }
                                    };
                                // The teardown hook may have cleared the
                                // registry while decode was in flight
                                if teardown.is_closed() {
                                    return;
                                }
                                let id = frame.id.clone();
                                registry.remember(&id, format);
                                if let Err(err) = peer.message(frame, &handler).await {
                                    // The engine's error frame, if any, already
                                    // consumed the entry through the writer.
                                    registry.take(&id);
                                    on_error(&err, Some(&id));
                                }
                            });
                        }
                        ChannelEvent::Closed => {
                            tracing::debug!("data channel closed");
                            break;
                        }
                    }
                }
                teardown.run();
            })
        };

        tracing::debug!("data channel upgraded");
        ResponderBinding {
            binding: ChannelBinding::new(task, teardown),
            registry,
        }
    }
}

/// Build the write callback the correlation engine emits response frames
/// through: consume the remembered format for the id (defaulting to compact
/// when absent), encode, send.
fn response_writer<C: DataChannel>(
    channel: Arc<C>,
    registry: Arc<FormatRegistry>,
    teardown: Arc<Teardown>,
    codec: Arc<dyn FrameCodec>,
    on_error: ErrorHook,
) -> WriteFn {
    Arc::new(move |frame: Frame| -> BoxFuture<'static, ()> {
        let channel = channel.clone();
        let registry = registry.clone();
        let teardown = teardown.clone();
        let codec = codec.clone();
        let on_error = on_error.clone();
        Box::pin(async move {
            if teardown.is_closed() {
                return;
            }
            let format = registry.take(&frame.id).unwrap_or(WireFormat::Compact);
            let id = frame.id.clone();
            let raw = match wire::encode(frame.clone(), format, codec.as_ref()).await {
                Ok(raw) => raw,
                Err(err) => {
                    on_error(&err, Some(&id));
                    if format == WireFormat::Compact {
                        return;
                    }
                    // Fall back to compact rather than dropping the response
                    match wire::encode(frame, WireFormat::Compact, codec.as_ref()).await {
                        Ok(raw) => raw,
                        Err(err) => {
                            on_error(&err, Some(&id));
                            return;
                        }
                    }
                }
            };
            if teardown.is_closed() {
                return;
            }
            if let Err(err) = channel.send(raw) {
                on_error(&err, Some(&id));
            }
        })
    })
}

/// Disposer for one upgraded channel.
pub struct ResponderBinding {
    binding: ChannelBinding,
    registry: Arc<FormatRegistry>,
}

impl ResponderBinding {
    /// Remove the receive loop, close the correlation engine, and clear the
    /// format registry. Idempotent; safe after the channel already closed.
    pub fn dispose(&self) {
        self.binding.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.binding.is_disposed()
    }

    /// Number of requests received but not yet answered. Zero once every
    /// in-flight request has completed; anything else after quiescence is a
    /// leak.
    pub fn outstanding(&self) -> usize {
        self.registry.len()
    }
}
