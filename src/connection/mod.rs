//! Push connection: the state machine, its async driver and the status
//! indicator derived from it.

pub mod driver;
pub mod machine;
pub mod status;

pub use driver::{
    spawn, ConnectError, ConnectionHandle, DriverConfig, ErrorReporter, DEFAULT_CONNECT_TIMEOUT,
};
pub use machine::{
    ConnectionEvent, ConnectionManager, ConnectionSnapshot, ConnectionState, Directive,
    DEFAULT_RECONNECT_DELAY,
};
pub use status::{describe, StatusDisplay, StatusStyle};
