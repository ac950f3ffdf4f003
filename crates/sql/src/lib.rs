//! SQL crate
//!
//! Flight SQL on top of [`flightline_transport::FlightSession`]: command envelopes,
//! the "get flight info, then do-get" choreography for queries and metadata, typed
//! metadata rows, and the prepared statement lifecycle.
//!
//! # Example
//! ```no_run
//! use flightline_common::Settings;
//! use flightline_sql::FlightSqlClient;
//!
//! # async fn run() -> flightline_common::Result<()> {
//! let client = FlightSqlClient::new(Settings::for_endpoint("localhost", 32010).with_plaintext())?;
//! let result = client.execute("SELECT 1").await?;
//! println!("{} rows", result.total_rows);
//!
//! let handle = client.prepare("SELECT * FROM users").await?;
//! let users = client.execute_prepared(&handle).await?;
//! client.close_prepared(handle).await?;
//! # let _ = users;
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod command;
pub mod metadata;
pub mod result;

pub use client::FlightSqlClient;
pub use command::{CommandEnvelope, CommandKind, PreparedStatementHandle, SqlCommand};
pub use metadata::{DbSchema, ForeignKey, MetadataRow, PrimaryKey, ReferentialAction, TableInfo};
pub use result::QueryResult;
