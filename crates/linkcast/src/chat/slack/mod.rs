pub mod client;
pub mod socket_mode;

pub use client::{AuthInfo, SlackClient};
pub use socket_mode::{parse_envelope, Envelope, SocketModeListener};
