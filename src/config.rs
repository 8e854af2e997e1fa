//! Runtime settings for the channels and the demo server.

use crate::error::ConfigError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Behaviour shared by every channel's broadcast service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Upper bound for a single write during broadcast. `None` waits forever.
    pub write_timeout: Option<Duration>,
    /// Reply to inbound text frames with an acknowledgement to the sender.
    pub echo_client_messages: bool,
    /// Unregister a connection as soon as a broadcast write to it fails,
    /// instead of waiting for its receive loop to notice the disconnect.
    pub evict_on_write_failure: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            write_timeout: Some(Duration::from_secs(5)),
            echo_client_messages: true,
            evict_on_write_failure: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub channel: ChannelConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 4000,
            channel: ChannelConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads `HOST`, `PORT`, `WS_WRITE_TIMEOUT_MS`, `WS_ECHO_CLIENT_MESSAGES`
    /// and `WS_EVICT_ON_WRITE_FAILURE`. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let write_timeout = match parse::<u64>(&lookup, "WS_WRITE_TIMEOUT_MS")? {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => defaults.channel.write_timeout,
        };

        Ok(Self {
            host: parse(&lookup, "HOST")?.unwrap_or(defaults.host),
            port: parse(&lookup, "PORT")?.unwrap_or(defaults.port),
            channel: ChannelConfig {
                write_timeout,
                echo_client_messages: parse_flag(&lookup, "WS_ECHO_CLIENT_MESSAGES")?
                    .unwrap_or(defaults.channel.echo_client_messages),
                evict_on_write_failure: parse_flag(&lookup, "WS_EVICT_ON_WRITE_FAILURE")?
                    .unwrap_or(defaults.channel.evict_on_write_failure),
            },
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
    }
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<bool>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::Invalid {
                key,
                value,
                reason: "expected a boolean".to_string(),
            }),
        },
    }
}
