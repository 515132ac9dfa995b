//! The user-facing protocol surface: what a protocol author implements on
//! top of a [`crate::tni::TreeNodeInstance`]. Grounded on the teacher's
//! `ProcessWasi`/wasm component boundary in `kernel/mod.rs` — there, a
//! "process" is an opaque computation the kernel spawns and feeds messages
//! to; here a `ProtocolInstance` plays the same role but is a native Rust
//! trait object instead of a wasm guest, since onet protocols are
//! statically compiled into the node rather than loaded at runtime.

use crate::error::OverlayError;

/// One execution of a protocol, bound 1:1 to a `TreeNodeInstance`
/// (spec.md §3 lifecycle). `dispatch` is the protocol-provided entry point
/// invoked in its own fiber at instance creation; the default is a no-op,
/// matching spec.md §4.7 ("default is a no-op") — most protocols rely
/// entirely on registered channels/handlers and never override it.
#[async_trait::async_trait]
pub trait ProtocolInstance: Send + Sync {
    async fn dispatch(&mut self) -> Result<(), OverlayError> {
        Ok(())
    }

    /// Called once, from `TreeNodeInstance::close_dispatch`, when the
    /// instance's dispatch fiber is torn down.
    fn shutdown(&mut self) {}
}

/// A protocol registered purely by name, with no further per-instance
/// state beyond what `TreeNodeInstance` already carries.
pub struct NoopProtocol;

#[async_trait::async_trait]
impl ProtocolInstance for NoopProtocol {}
