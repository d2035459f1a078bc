//! Reference-counted handles (C12). A `Publisher`, `Subscriber`, `Service`,
//! or `ServiceClient` returned to a caller carries one of these; dropping
//! the last handle to a given topic/service releases it from the runtime's
//! map and, once the refcount reaches zero, unregisters it from the
//! directory and tears down its sockets.
//!
//! Four concrete kinds, not a generic `dyn Future`-boxing trait: there are
//! exactly four endpoint maps on `Runtime`, and matching on a small enum is
//! simpler than erasing the release call behind a trait object.

use crate::runtime::Runtime;
use std::sync::Weak;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Publisher,
    Subscriber,
    Service,
    ServiceClient,
}

/// Held by every typed endpoint handle; `Drop` asks the runtime to release
/// this endpoint's reference. The release itself runs on a spawned task
/// since `Drop` cannot be async.
pub struct RefHandle {
    pub(crate) runtime: Weak<Runtime>,
    pub(crate) key: String,
    pub(crate) kind: Kind,
}

impl RefHandle {
    pub(crate) fn new(runtime: Weak<Runtime>, key: String, kind: Kind) -> Self {
        Self { runtime, key, kind }
    }
}

impl Drop for RefHandle {
    fn drop(&mut self) {
        let Some(runtime) = self.runtime.upgrade() else { return };
        let key = self.key.clone();
        let kind = self.kind;
        tokio::spawn(async move {
            runtime.release(kind, &key).await;
        });
    }
}
