use std::{net::SocketAddr, path::Path};

use serde::Deserialize;

use crate::{error::ConfigError, session::SessionConfig};

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 25))
}

/// The contents of the configuration file.
///
/// ```toml
/// listen = "0.0.0.0:2525"
///
/// [session]
/// hostname = "mx.example.com"
/// max_message_size = 10485760
/// auth = true
/// overflow = "reject"
///
/// [session.tls]
/// certificate = "/etc/mailin/cert.pem"
/// key = "/etc/mailin/key.pem"
/// ```
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Read and parse the file at `path`, loading any TLS material it names.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let mut config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        config.session.load_tls()?;
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::Config;
    use crate::{error::ConfigError, reassembly::OverflowPolicy};

    fn write(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults() {
        let file = write("");
        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.listen.port(), 25);
        assert_eq!(config.session.max_message_size, 1_000_000);
        assert_eq!(config.session.max_line_length, 4096);
        assert_eq!(config.session.overflow, OverflowPolicy::Continue);
        assert!(!config.session.auth);
        assert!(!config.session.tls_enabled());
    }

    #[test]
    fn full() {
        let file = write(
            r#"
            listen = "127.0.0.1:2525"

            [session]
            hostname = "mx.example.com"
            max_message_size = 0
            auth = true
            overflow = "reject"
            "#,
        );
        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.listen, "127.0.0.1:2525".parse().unwrap());
        assert_eq!(config.session.hostname(), "mx.example.com");
        assert_eq!(config.session.max_message_size, 0);
        assert_eq!(config.session.overflow, OverflowPolicy::Reject);
        assert!(config.session.auth);
    }

    #[test]
    fn errors() {
        assert!(matches!(
            Config::from_file("/nonexistent/mailin.toml"),
            Err(ConfigError::Read { .. })
        ));

        let file = write("listen = 25");
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));

        let file = write(
            r#"
            [session.tls]
            certificate = "/nonexistent/cert.pem"
            key = "/nonexistent/key.pem"
            "#,
        );
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Tls(_))
        ));
    }
}
