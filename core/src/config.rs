/*
 * config.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Postino, an IMAP client library.
 *
 * Postino is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Postino is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Postino.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Connection configuration: host, port, security and timeouts.
//!
//! A configuration can be built directly, parsed from an `imap://` or
//! `imaps://` URL, or parsed from a c-client style mailbox specification
//! such as `{imap.example.com:993/imap/ssl}INBOX`.

use std::time::Duration;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Largest literal or response line accepted from the server (64 MiB).
pub const DEFAULT_MAX_LITERAL_SIZE: usize = 64 * 1024 * 1024;
pub const DEFAULT_MAILBOX: &str = "INBOX";

/// Path segment: encode / ? # [ ] @ % and space.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'[')
    .add(b']')
    .add(b'@')
    .add(b'%')
    .add(b' ')
    .add(b';');

/// Userinfo in authority: encode @ and other reserved so one @ separates userinfo from host.
const USERINFO: &AsciiSet = &CONTROLS
    .add(b'@')
    .add(b':')
    .add(b'%')
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'[')
    .add(b']')
    .add(b';')
    .add(b' ');

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("missing host")]
    MissingHost,
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    #[error("malformed mailbox specification {0:?}")]
    InvalidMailboxSpec(String),
    #[error("invalid percent-encoding in {0:?}")]
    InvalidEncoding(String),
    #[error("no username configured")]
    MissingUsername,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// TLS from the first byte (IMAPS).
    Implicit,
    /// Plain connect, then STARTTLS; refused if the server does not offer it.
    StartTls,
    /// No TLS at all.
    Plain,
}

impl Security {
    pub fn default_port(&self) -> u16 {
        match self {
            Security::Implicit => 993,
            Security::StartTls | Security::Plain => 143,
        }
    }

    fn for_port(port: u16) -> Self {
        if port == 993 {
            Security::Implicit
        } else {
            Security::StartTls
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub security: Security,
    pub username: Option<String>,
    /// Mailbox selected by `Session::open` after login.
    pub mailbox: String,
    /// `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub max_literal_size: usize,
}

impl ImapConfig {
    /// Port 993 means implicit TLS; anything else uses STARTTLS.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ImapConfig {
            host: host.into(),
            port,
            security: Security::for_port(port),
            username: None,
            mailbox: DEFAULT_MAILBOX.to_string(),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_literal_size: DEFAULT_MAX_LITERAL_SIZE,
        }
    }

    pub fn with_security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = mailbox.into();
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_literal_size(mut self, max: usize) -> Self {
        self.max_literal_size = max;
        self
    }

    /// Parse `imap://user@host:port/mailbox` or `imaps://...`. Userinfo and
    /// mailbox are percent-decoded; `;AUTH=` and `;UIDVALIDITY=` parameters
    /// are dropped.
    pub fn from_uri(uri: &str) -> Result<Self, ConfigError> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| ConfigError::UnsupportedScheme(uri.to_string()))?;
        let security = match scheme.to_ascii_lowercase().as_str() {
            "imap" => Security::StartTls,
            "imaps" => Security::Implicit,
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let (userinfo, hostport) = match authority.rsplit_once('@') {
            Some((userinfo, hostport)) => (Some(userinfo), hostport),
            None => (None, authority),
        };
        let (host, port) = split_host_port(hostport)?;
        let mut config = ImapConfig::new(host, port.unwrap_or(security.default_port())).with_security(security);
        if let Some(userinfo) = userinfo {
            let user = userinfo.split(';').next().unwrap_or_default();
            if !user.is_empty() {
                config.username = Some(decode(user)?);
            }
        }
        let path = path.split(';').next().unwrap_or_default().trim_matches('/');
        if !path.is_empty() {
            config.mailbox = decode(path)?;
        }
        Ok(config)
    }

    /// Parse `{host[:port][/flag...]}mailbox`. Flags: `ssl`, `tls`, `notls`,
    /// `user=name`; protocol and certificate flags are accepted and ignored.
    pub fn from_mailbox_spec(spec: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidMailboxSpec(spec.to_string());
        let inner = spec.trim().strip_prefix('{').ok_or_else(invalid)?;
        let (server, mailbox) = inner.split_once('}').ok_or_else(invalid)?;
        let mut parts = server.split('/');
        let (host, port) = split_host_port(parts.next().unwrap_or_default())?;
        let mut security = Security::StartTls;
        let mut username = None;
        for flag in parts {
            let lower = flag.to_ascii_lowercase();
            match lower.as_str() {
                "ssl" => security = Security::Implicit,
                "tls" => security = Security::StartTls,
                "notls" => security = Security::Plain,
                "imap" | "imap4" | "imap4rev1" | "service=imap" | "novalidate-cert" | "validate-cert" | "secure" => {}
                _ if lower.starts_with("user=") => username = Some(flag["user=".len()..].to_string()),
                _ if lower.starts_with("service=") => return Err(invalid()),
                _ => debug!(flag, "ignoring mailbox specification flag"),
            }
        }
        let mut config = ImapConfig::new(host, port.unwrap_or(security.default_port())).with_security(security);
        config.username = username;
        if !mailbox.is_empty() {
            config.mailbox = mailbox.to_string();
        }
        Ok(config)
    }

    /// `imaps://` for implicit TLS, else `imap://`; the default port is omitted.
    pub fn to_uri(&self) -> String {
        let scheme = if self.security == Security::Implicit { "imaps" } else { "imap" };
        let mut uri = format!("{}://", scheme);
        if let Some(username) = &self.username {
            uri.push_str(&utf8_percent_encode(username, USERINFO).to_string());
            uri.push('@');
        }
        if self.host.contains(':') {
            uri.push_str(&format!("[{}]", self.host));
        } else {
            uri.push_str(&self.host);
        }
        if self.port != self.security.default_port() {
            uri.push_str(&format!(":{}", self.port));
        }
        uri.push('/');
        let segments: Vec<String> = self
            .mailbox
            .split('/')
            .map(|segment| utf8_percent_encode(segment, PATH_SEGMENT).to_string())
            .collect();
        uri.push_str(&segments.join("/"));
        uri
    }
}

/// `host`, `host:port`, `[v6]` or `[v6]:port`.
fn split_host_port(hostport: &str) -> Result<(String, Option<u16>), ConfigError> {
    let (host, port) = if let Some(rest) = hostport.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or(ConfigError::MissingHost)?;
        (host, tail.strip_prefix(':'))
    } else {
        match hostport.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (hostport, None),
        }
    };
    if host.is_empty() {
        return Err(ConfigError::MissingHost);
    }
    let port = match port {
        Some(p) => Some(
            p.parse::<u16>()
                .ok()
                .filter(|&n| n != 0)
                .ok_or_else(|| ConfigError::InvalidPort(p.to_string()))?,
        ),
        None => None,
    };
    Ok((host.to_string(), port))
}

fn decode(s: &str) -> Result<String, ConfigError> {
    percent_decode_str(s)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ConfigError::InvalidEncoding(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_picks_security_from_port() {
        assert_eq!(ImapConfig::new("mail.example.com", 993).security, Security::Implicit);
        let config = ImapConfig::new("mail.example.com", 143);
        assert_eq!(config.security, Security::StartTls);
        assert_eq!(config.mailbox, "INBOX");
        assert_eq!(config.read_timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.max_literal_size, 64 * 1024 * 1024);
    }

    #[test]
    fn test_from_uri() {
        let config = ImapConfig::from_uri("imaps://alice%40example.com@imap.example.com/Sent%20Items").unwrap();
        assert_eq!(config.security, Security::Implicit);
        assert_eq!(config.port, 993);
        assert_eq!(config.host, "imap.example.com");
        assert_eq!(config.username.as_deref(), Some("alice@example.com"));
        assert_eq!(config.mailbox, "Sent Items");

        let config = ImapConfig::from_uri("imap://bob;AUTH=*@[2001:db8::1]:1143/INBOX;UIDVALIDITY=385759045").unwrap();
        assert_eq!(config.host, "2001:db8::1");
        assert_eq!(config.port, 1143);
        assert_eq!(config.security, Security::StartTls);
        assert_eq!(config.username.as_deref(), Some("bob"));
        assert_eq!(config.mailbox, "INBOX");
    }

    #[test]
    fn test_from_uri_errors() {
        assert_eq!(
            ImapConfig::from_uri("pop3://host"),
            Err(ConfigError::UnsupportedScheme("pop3".to_string()))
        );
        assert_eq!(ImapConfig::from_uri("imap://"), Err(ConfigError::MissingHost));
        assert_eq!(
            ImapConfig::from_uri("imap://host:99999"),
            Err(ConfigError::InvalidPort("99999".to_string()))
        );
    }

    #[test]
    fn test_from_mailbox_spec() {
        let config = ImapConfig::from_mailbox_spec("{imap.gmail.com:993/imap/ssl/novalidate-cert/user=alice}[Gmail]/Sent Mail").unwrap();
        assert_eq!(config.host, "imap.gmail.com");
        assert_eq!(config.port, 993);
        assert_eq!(config.security, Security::Implicit);
        assert_eq!(config.username.as_deref(), Some("alice"));
        assert_eq!(config.mailbox, "[Gmail]/Sent Mail");

        let config = ImapConfig::from_mailbox_spec("{localhost/notls}").unwrap();
        assert_eq!(config.security, Security::Plain);
        assert_eq!(config.port, 143);
        assert_eq!(config.mailbox, "INBOX");

        assert!(ImapConfig::from_mailbox_spec("localhost}INBOX").is_err());
        assert!(ImapConfig::from_mailbox_spec("{localhost/service=pop3}INBOX").is_err());
    }

    #[test]
    fn test_to_uri() {
        let config = ImapConfig::new("imap.example.com", 993)
            .with_username("alice@example.com")
            .with_mailbox("Archive/2024 Q1");
        assert_eq!(config.to_uri(), "imaps://alice%40example.com@imap.example.com/Archive/2024%20Q1");
        let parsed = ImapConfig::from_uri(&config.to_uri()).unwrap();
        assert_eq!(parsed, config);

        let config = ImapConfig::new("::1", 1143);
        assert_eq!(config.to_uri(), "imap://[::1]:1143/INBOX");
    }
}
