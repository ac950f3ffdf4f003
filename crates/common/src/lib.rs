//! Common crate
//!
//! Shared error taxonomy and session settings for the Flightline client crates.
//!
//! # Example
//! ```rust
//! use flightline_common::{Settings, TransportSecurity};
//! let settings = Settings::for_endpoint("localhost", 4317).with_plaintext();
//! assert!(settings.validate().is_ok());
//! assert_eq!(settings.transport_security(), TransportSecurity::Plaintext);
//! ```

pub mod config;
pub mod error;

pub use config::{Credential, Settings, TransportSecurity};
pub use error::{Error, Result};
