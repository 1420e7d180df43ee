//! Binding lifecycle.
//!
//! Both sides of the transport bind a channel the same way: one correlation
//! engine, one receive loop, one disposal funnel. [`Teardown`] is that
//! funnel: the channel's close event and an explicit dispose both pass
//! through [`Teardown::run`], which executes the release hook (engine close,
//! registry clear) at most once. [`ChannelBinding`] owns the receive-loop
//! task and aborts it before running teardown, so no message is dispatched
//! after disposal begins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

/// Run-once disposal funnel shared by the receive loop, the write path, and
/// the disposer.
pub struct Teardown {
    closed: AtomicBool,
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Teardown {
    pub fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            hook: Mutex::new(None),
        }
    }

    /// Install the release hook. Called once while the binding is built,
    /// after the engine exists.
    pub fn install(&self, hook: impl FnOnce() + Send + 'static) {
        if let Ok(mut slot) = self.hook.lock() {
            *slot = Some(Box::new(hook));
        }
    }

    /// Begin teardown. The first caller runs the hook; later calls are
    /// no-ops.
    pub fn run(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let hook = self.hook.lock().ok().and_then(|mut slot| slot.take());
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Whether teardown has begun. Checked by per-message tasks before
    /// dispatching and by the write path before sending.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for Teardown {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for one channel binding: the receive-loop task plus its teardown.
///
/// Disposal is idempotent and safe after the channel has already closed.
/// Dropping the binding disposes it.
pub struct ChannelBinding {
    teardown: Arc<Teardown>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelBinding {
    pub fn new(task: JoinHandle<()>, teardown: Arc<Teardown>) -> Self {
        Self {
            teardown,
            task: Mutex::new(Some(task)),
        }
    }

    /// Stop the receive loop, close the correlation engine, and release
    /// per-request state. Listeners stop before the engine closes.
    pub fn dispose(&self) {
        let task = self.task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(task) = task {
            task.abort();
        }
        self.teardown.run();
    }

    /// Whether this binding has been disposed (explicitly or by the
    /// channel's close event).
    pub fn is_disposed(&self) -> bool {
        self.teardown.is_closed()
    }
}

impl Drop for ChannelBinding {
    fn drop(&mut self) {
        self.dispose();
    }
}
