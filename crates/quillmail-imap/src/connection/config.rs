//! Connection configuration types.

use std::time::Duration;

/// Port on which the server speaks TLS from the first byte.
pub const IMPLICIT_TLS_PORT: u16 = 993;

/// Port for plaintext connections upgraded with STARTTLS.
pub const STARTTLS_PORT: u16 = 143;

/// IMAP connection configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port. 993 selects implicit TLS, anything else starts plaintext.
    pub port: u16,
    /// Accept any server certificate during TLS negotiation, for both
    /// implicit TLS and the STARTTLS upgrade. **Testing only.**
    pub allow_invalid_certs: bool,
    /// Connection timeout.
    pub connect_timeout: Duration,
}

impl Config {
    /// Creates a new configuration with implicit TLS on port 993.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: IMPLICIT_TLS_PORT,
            allow_invalid_certs: false,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }

    /// Returns true if the connection starts with a TLS handshake.
    #[must_use]
    pub const fn implicit_tls(&self) -> bool {
        self.port == IMPLICIT_TLS_PORT
    }
}

/// Builder for connection configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: u16,
    allow_invalid_certs: bool,
    connect_timeout: Duration,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: IMPLICIT_TLS_PORT,
            allow_invalid_certs: false,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Skips certificate validation.
    #[must_use]
    pub const fn allow_invalid_certs(mut self, allow: bool) -> Self {
        self.allow_invalid_certs = allow;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            host: self.host,
            port: self.port,
            allow_invalid_certs: self.allow_invalid_certs,
            connect_timeout: self.connect_timeout,
        }
    }
}
