use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use serde::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_CONFIG_PATH: &str = "config/flightline.toml";

/// Printable ASCII, spaces included.
fn is_visible_ascii(value: &str) -> bool {
    value.chars().all(|c| c == ' ' || c.is_ascii_graphic())
}

/// Transport security of the RPC channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSecurity {
    Plaintext,
    Tls,
    /// TLS without certificate or hostname verification.
    TlsSkipVerify,
}

/// The single credential mode a session authenticates with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl Credential {
    /// Value of the `authorization` header this credential starts a session with.
    pub fn authorization_header(&self) -> Option<String> {
        match self {
            Credential::None => None,
            Credential::Basic { username, password } => Some(format!(
                "Basic {}",
                BASE64_STANDARD.encode(format!("{username}:{password}"))
            )),
            Credential::Bearer { token } => Some(format!("Bearer {token}")),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Credential::None)
    }
}

/// Connection parameters of one client.
///
/// `port` is signed so that a negative value from a config file or the environment is
/// reported by [`Settings::validate`] instead of failing deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub host: String,
    pub port: i64,
    #[serde(default)]
    pub plaintext: bool,
    #[serde(default)]
    pub tls_skip_verify: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl Settings {
    /// Loads settings from an optional TOML file and `FLIGHTLINE__*` environment variables.
    ///
    /// The file path is taken from `FLIGHTLINE_CONFIG_PATH`, defaulting to
    /// `config/flightline.toml`.
    pub fn new() -> Result<Self> {
        let config_file_path = std::env::var("FLIGHTLINE_CONFIG_PATH")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(config::File::with_name(&config_file_path).required(false))
    }

    pub fn load<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let s = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("FLIGHTLINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Settings for `host:port` using verified TLS and no credential.
    pub fn for_endpoint(host: impl Into<String>, port: i64) -> Self {
        Self {
            host: host.into(),
            port,
            plaintext: false,
            tls_skip_verify: false,
            username: None,
            password: None,
            token: None,
        }
    }

    pub fn with_plaintext(mut self) -> Self {
        self.plaintext = true;
        self
    }

    pub fn with_tls_skip_verify(mut self) -> Self {
        self.tls_skip_verify = true;
        self
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Configuration("host must not be empty".to_string()));
        }
        if self.port <= 0 {
            return Err(Error::Configuration(format!(
                "port must be a positive integer, got {}",
                self.port
            )));
        }
        if u16::try_from(self.port).is_err() {
            return Err(Error::Configuration(format!("port {} is out of range", self.port)));
        }
        if let Some(token) = &self.token {
            if token.is_empty() || !token.chars().all(|c| c.is_ascii_graphic()) {
                return Err(Error::Configuration(
                    "token must be non-empty visible ASCII".to_string(),
                ));
            }
        }
        for (field, value) in [("username", &self.username), ("password", &self.password)] {
            if value.as_deref().is_some_and(|v| !is_visible_ascii(v)) {
                return Err(Error::Configuration(format!(
                    "{field} must be visible ASCII"
                )));
            }
        }
        if self.username.as_deref().is_some_and(|u| u.contains(':')) {
            return Err(Error::Configuration(
                "username must not contain ':'".to_string(),
            ));
        }
        Ok(())
    }

    /// Plaintext wins over skip-verify, which wins over verified TLS.
    pub fn transport_security(&self) -> TransportSecurity {
        if self.plaintext {
            TransportSecurity::Plaintext
        } else if self.tls_skip_verify {
            TransportSecurity::TlsSkipVerify
        } else {
            TransportSecurity::Tls
        }
    }

    /// A bearer token takes precedence; basic auth needs both username and password.
    pub fn credential(&self) -> Credential {
        if let Some(token) = &self.token {
            return Credential::Bearer {
                token: token.clone(),
            };
        }
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Credential::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            _ => Credential::None,
        }
    }

    pub fn endpoint_uri(&self) -> String {
        let scheme = match self.transport_security() {
            TransportSecurity::Plaintext => "http",
            TransportSecurity::Tls | TransportSecurity::TlsSkipVerify => "https",
        };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn rejects_empty_host_and_bad_ports() {
        for (host, port) in [("", 4317), ("x", 0), ("x", -1), ("x", 70_000)] {
            let err = Settings::for_endpoint(host, port).validate().unwrap_err();
            assert!(
                matches!(err, Error::Configuration(_)),
                "{host}:{port} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn rejects_credentials_that_cannot_be_sent_as_metadata() {
        let base = || Settings::for_endpoint("localhost", 4317);
        let rejected = [
            base().with_bearer_token("abc\ndef"),
            base().with_bearer_token("caf\u{e9}"),
            base().with_bearer_token("two words"),
            base().with_bearer_token(""),
            base().with_basic_auth("alice\r", "secret"),
            base().with_basic_auth("alice", "s\u{e9}cret"),
            base().with_basic_auth("ali:ce", "secret"),
        ];
        for settings in rejected {
            assert!(
                matches!(settings.validate(), Err(Error::Configuration(_))),
                "{settings:?} should be rejected"
            );
        }

        assert!(base().with_basic_auth("alice", "pass word!").validate().is_ok());
        assert!(base().with_bearer_token("eyJhbGciOi.J9-_~").validate().is_ok());
    }

    #[test]
    fn accepts_localhost() {
        assert!(Settings::for_endpoint("localhost", 4317).validate().is_ok());
    }

    #[test]
    fn plaintext_wins_over_skip_verify() {
        let settings = Settings::for_endpoint("localhost", 4317)
            .with_tls_skip_verify()
            .with_plaintext();
        assert_eq!(settings.transport_security(), TransportSecurity::Plaintext);
        assert_eq!(settings.endpoint_uri(), "http://localhost:4317");

        let settings = Settings::for_endpoint("localhost", 4317).with_tls_skip_verify();
        assert_eq!(settings.transport_security(), TransportSecurity::TlsSkipVerify);

        let settings = Settings::for_endpoint("localhost", 4317);
        assert_eq!(settings.transport_security(), TransportSecurity::Tls);
        assert_eq!(settings.endpoint_uri(), "https://localhost:4317");
    }

    #[test]
    fn bearer_token_takes_precedence() {
        let settings = Settings::for_endpoint("localhost", 4317)
            .with_basic_auth("alice", "secret")
            .with_bearer_token("abc");
        assert_eq!(
            settings.credential().authorization_header().as_deref(),
            Some("Bearer abc")
        );
    }

    #[test]
    fn basic_auth_is_base64_encoded() {
        let settings = Settings::for_endpoint("localhost", 4317).with_basic_auth("alice", "secret");
        assert_eq!(
            settings.credential().authorization_header().as_deref(),
            Some("Basic YWxpY2U6c2VjcmV0")
        );
    }

    #[test]
    fn basic_auth_needs_both_parts() {
        let mut settings = Settings::for_endpoint("localhost", 4317);
        settings.username = Some("alice".to_string());
        assert_eq!(settings.credential(), Credential::None);
        assert_eq!(settings.credential().authorization_header(), None);
    }

    #[test]
    fn loads_from_toml_source() {
        let toml = r#"
            host = "flight.internal"
            port = 32010
            tls_skip_verify = true
            token = "t0k3n"
        "#;
        let settings = Settings::load(config::File::from_str(toml, FileFormat::Toml)).unwrap();
        assert_eq!(settings.host, "flight.internal");
        assert_eq!(settings.port, 32010);
        assert_eq!(settings.transport_security(), TransportSecurity::TlsSkipVerify);
        assert_eq!(
            settings.credential(),
            Credential::Bearer {
                token: "t0k3n".to_string()
            }
        );
    }

    #[test]
    fn load_validates() {
        let toml = r#"
            host = "flight.internal"
            port = -1
        "#;
        let err = Settings::load(config::File::from_str(toml, FileFormat::Toml)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
