//! Inbound push channel.
//!
//! The server pushes JSON messages over a per-user WebSocket. The client
//! decodes each frame, hands it to the store in arrival order, and
//! reconnects after abnormal disconnects under a bounded retry policy.

mod client;
mod credential;
mod reconnect;

pub use client::{decode_message, PushClient, PushHandle};
pub use credential::user_id_from_token;
pub use reconnect::{
    step, Action, ConnectionEvent, ConnectionState, ReconnectPolicy, Transition, NORMAL_CLOSURE,
};
