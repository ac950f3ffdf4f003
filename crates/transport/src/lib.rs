//! Transport crate
//!
//! Owns one Arrow Flight channel per [`FlightSession`]: lazy connection with fixed
//! tuning, the credential handshake, the primitive Flight calls, and reassembly of
//! do-get frames into an Arrow IPC stream ([`ReassembledStream`]).

pub mod auth;
pub mod channel;
pub mod ipc;
pub mod session;

pub use auth::AuthState;
pub use ipc::ReassembledStream;
pub use session::{FlightSession, DO_GET_DEADLINE};
