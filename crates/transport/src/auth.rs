use flightline_common::{Credential, Error, Result};
use tokio::sync::RwLock;
use tonic::metadata::MetadataValue;
use tonic::Request;

pub const AUTHORIZATION: &str = "authorization";

/// Snapshot of the session's authorization header.
///
/// `version` is 0 for the value derived from the configured credential and is bumped
/// when a handshake replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub version: u64,
    pub header: Option<String>,
}

impl AuthState {
    pub fn from_credential(credential: &Credential) -> Self {
        Self {
            version: 0,
            header: credential.authorization_header(),
        }
    }

    /// Attaches the header, if any, to an outgoing request.
    pub fn apply<T>(&self, request: &mut Request<T>) -> Result<()> {
        if let Some(header) = &self.header {
            let invalid =
                || Error::Configuration("authorization value is not valid ASCII metadata".to_string());
            if !header.chars().all(|c| c == ' ' || c.is_ascii_graphic()) {
                return Err(invalid());
            }
            let value = MetadataValue::try_from(header.as_str()).map_err(|_| invalid())?;
            request.metadata_mut().insert(AUTHORIZATION, value);
        }
        Ok(())
    }
}

/// Session-owned cell holding the current [`AuthState`].
#[derive(Debug)]
pub(crate) struct AuthCell {
    state: RwLock<AuthState>,
}

impl AuthCell {
    pub(crate) fn new(initial: AuthState) -> Self {
        Self {
            state: RwLock::new(initial),
        }
    }

    pub(crate) async fn snapshot(&self) -> AuthState {
        self.state.read().await.clone()
    }

    /// Replaces the header if the cell is still at `expected_version`.
    pub(crate) async fn compare_and_set(&self, expected_version: u64, header: String) -> bool {
        let mut state = self.state.write().await;
        if state.version != expected_version {
            return false;
        }
        state.version += 1;
        state.header = Some(header);
        true
    }
}
