//! WebSocket connection handling, heartbeat, read/write pumps and the
//! authenticated upgrade.

pub mod connection;
pub mod heartbeat;
pub mod session;
pub mod upgrade;
