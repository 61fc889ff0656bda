// fleet_protocol: shared wire codec and reliable-transport engines for the
// mothership/rover fleet link.
//
// The codec modules (`packet`, `mission`, `report`) are pure data
// transformation; the transport modules (`window`, `send`, `reorder`,
// `session`) provide ordered, at-least-once, duplicate-suppressed delivery
// over raw datagrams.

pub mod mission;
pub mod packet;
pub mod report;

pub mod reorder;
pub mod send;
pub mod session;
pub mod window;
pub mod wire;

/// Rover id 0 is reserved for coordinator-origin messages.
pub const COORDINATOR_ID: u8 = 0;

/// Default UDP port the mothership listens on.
pub const DEFAULT_MOTHERSHIP_PORT: u16 = 7878;

/// Largest datagram either side will read; anything bigger is truncated by
/// the OS and will fail the checksum.
pub const MAX_DATAGRAM: usize = 2048;

pub use mission::{Coordinate, MissionPayload, TaskType};
pub use packet::{CodecError, HEADER_LEN, MsgType, Packet};
pub use report::{Component, Report, ReportBody};
pub use send::{RetryPolicy, SendError, send_packet};
pub use session::PeerSession;
pub use window::AckWindow;
pub use wire::Wire;
