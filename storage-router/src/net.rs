//! Replica addressing shared by discovery, the connection pool and the writer.

use std::fmt;

/// Network address of a single chunk-server replica.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The connection-pool key, `"host:port"`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_host_colon_port() {
        let addr = Address::new("10.0.0.1", 9001);
        assert_eq!(addr.key(), "10.0.0.1:9001");
        assert_eq!(addr.to_string(), "10.0.0.1:9001");
    }
}
