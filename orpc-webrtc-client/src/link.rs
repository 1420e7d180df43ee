//! Client-side channel link.
//!
//! [`DataChannelLink`] binds one data channel to one correlation engine
//! instance. Outbound requests always use the framework's native compact
//! encoding; verbose messages are only detected on the way in, for
//! compatibility with peers running another adapter version.

use std::sync::Arc;

use futures::StreamExt;
use futures::future::BoxFuture;
use orpc_webrtc_core::{
    BindClientPeer, ChannelBinding, ChannelEvent, ClientPeer, DataChannel, ErrorHook, Frame,
    FrameCodec, Payload, Teardown, TransportError, WireFormat, WriteFn, default_error_hook, wire,
};

/// Builder for a [`DataChannelLink`].
pub struct LinkBuilder<F> {
    factory: F,
    codec: Arc<dyn FrameCodec>,
    on_error: ErrorHook,
}

impl<F: BindClientPeer> LinkBuilder<F> {
    pub fn new(factory: F, codec: Arc<dyn FrameCodec>) -> Self {
        Self {
            factory,
            codec,
            on_error: default_error_hook(),
        }
    }

    /// Replace the default log-and-continue error hook.
    pub fn error_hook(mut self, hook: ErrorHook) -> Self {
        self.on_error = hook;
        self
    }

    /// Bind the link to a data channel.
    ///
    /// The channel should be dedicated to sending requests and receiving
    /// responses. Must be called from within a Tokio runtime.
    pub fn connect<C: DataChannel>(self, channel: Arc<C>) -> DataChannelLink<F::Peer> {
        let teardown = Arc::new(Teardown::new());

        let write = request_writer(
            channel.clone(),
            teardown.clone(),
            self.codec.clone(),
            self.on_error.clone(),
        );
        let peer = self.factory.bind(write);

        {
            let peer = peer.clone();
            teardown.install(move || peer.close());
        }

        let mut events = channel.events();
        let task = {
            let peer = peer.clone();
            let teardown = teardown.clone();
            let codec = self.codec;
            let on_error = self.on_error;
            tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    match event {
                        ChannelEvent::Message(raw) => {
                            if teardown.is_closed() {
                                break;
                            }
                            let peer = peer.clone();
                            let teardown = teardown.clone();
                            let codec = codec.clone();
                            let on_error = on_error.clone();
                            tokio::spawn(async move {
                                if teardown.is_closed() {
                                    return;
                                }
                                match wire::decode(raw, codec.as_ref()).await {
                                    Ok((frame, _format)) => {
                                        let id = frame.id.clone();
                                        if let Err(err) = peer.accept(frame).await {
                                            on_error(&err, Some(&id));
                                        }
                                    }
                                    Err(err) => {
                                        // Other outstanding calls are unaffected
                                        on_error(&err, None);
                                    }
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

        DataChannelLink {
            peer,
            binding: ChannelBinding::new(task, teardown),
        }
    }
}

/// Build the write callback the correlation engine emits request frames
/// through. Outbound is always compact.
fn request_writer<C: DataChannel>(
    channel: Arc<C>,
    teardown: Arc<Teardown>,
    codec: Arc<dyn FrameCodec>,
    on_error: ErrorHook,
) -> WriteFn {
    Arc::new(move |frame: Frame| -> BoxFuture<'static, ()> {
        let channel = channel.clone();
        let teardown = teardown.clone();
        let codec = codec.clone();
        let on_error = on_error.clone();
        Box::pin(async move {
            if teardown.is_closed() {
                return;
            }
            let id = frame.id.clone();
            match wire::encode(frame, WireFormat::Compact, codec.as_ref()).await {
                Ok(raw) => {
                    if let Err(err) = channel.send(raw) {
                        on_error(&err, Some(&id));
                    }
                }
                Err(err) => on_error(&err, Some(&id)),
            }
        })
    })
}

/// Client-side link over one data channel.
///
/// Closing the channel (or the link) rejects every pending call with a
/// cancellation-classified error. Dropping the link closes it.
pub struct DataChannelLink<P> {
    peer: Arc<P>,
    binding: ChannelBinding,
}

impl<P: ClientPeer> DataChannelLink<P> {
    /// Issue one call and await its response.
    ///
    /// Resolves once the matching response frame arrives, in whatever order
    /// responses complete relative to other in-flight calls.
    pub async fn call(&self, request: Payload) -> Result<Payload, TransportError> {
        if self.binding.is_disposed() {
            return Err(TransportError::cancelled("link is closed"));
        }
        self.peer.request(request).await
    }

    /// Close the link: remove the receive loop and close the correlation
    /// engine, rejecting pending calls. Same effect as the channel's close
    /// event; calling it twice is a no-op.
    pub fn close(&self) {
        self.binding.dispose();
    }

    pub fn is_closed(&self) -> bool {
        self.binding.is_disposed()
    }
}
