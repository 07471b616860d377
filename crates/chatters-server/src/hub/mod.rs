//! The message hub: one task that owns the online-user table and serializes
//! every persist-then-fan-out.

pub mod command;
pub mod handle;
pub mod registry;
pub mod router;

pub use command::{InboundChat, MediaNotice};
pub use handle::{RouterError, RouterHandle};
pub use registry::ConnectionRegistry;
pub use router::MessageRouter;
