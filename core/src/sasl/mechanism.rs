/*
 * mechanism.rs
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

//! SASL mechanism names and metadata.

use std::fmt;

/// Supported SASL mechanisms (client side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaslMechanism {
    /// PLAIN (RFC 4616).
    Plain,
    /// Legacy LOGIN: username and password in two challenge rounds.
    Login,
    /// CRAM-MD5 (RFC 2195).
    CramMd5,
    /// SCRAM-SHA-256 (RFC 5802, 7677).
    ScramSha256,
    /// XOAUTH2 bearer token. `secret` is the access token.
    XOAuth2,
}

impl SaslMechanism {
    pub fn name(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::Login => "LOGIN",
            SaslMechanism::CramMd5 => "CRAM-MD5",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::XOAuth2 => "XOAUTH2",
        }
    }

    /// Mechanisms that put the secret on the wire in recoverable form.
    pub fn requires_tls(&self) -> bool {
        matches!(self, SaslMechanism::Plain | SaslMechanism::Login | SaslMechanism::XOAuth2)
    }

    /// Whether the client speaks first (SASL-IR eligible).
    pub fn has_initial_response(&self) -> bool {
        matches!(self, SaslMechanism::Plain | SaslMechanism::ScramSha256 | SaslMechanism::XOAuth2)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "PLAIN" => Some(SaslMechanism::Plain),
            "LOGIN" => Some(SaslMechanism::Login),
            "CRAM-MD5" => Some(SaslMechanism::CramMd5),
            "SCRAM-SHA-256" => Some(SaslMechanism::ScramSha256),
            "XOAUTH2" => Some(SaslMechanism::XOAuth2),
            _ => None,
        }
    }

    /// Pick the strongest mechanism among `AUTH=` capabilities.
    pub fn preferred<'a>(capabilities: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        capabilities
            .into_iter()
            .filter_map(|cap| {
                let (prefix, name) = (cap.get(..5)?, cap.get(5..)?);
                if prefix.eq_ignore_ascii_case("AUTH=") {
                    Self::from_name(name)
                } else {
                    None
                }
            })
            .max_by_key(|mechanism| mechanism.strength())
    }

    fn strength(&self) -> u8 {
        match self {
            SaslMechanism::ScramSha256 => 4,
            SaslMechanism::CramMd5 => 3,
            SaslMechanism::Plain => 2,
            SaslMechanism::Login => 1,
            SaslMechanism::XOAuth2 => 0,
        }
    }
}

impl fmt::Display for SaslMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_is_case_insensitive() {
        assert_eq!(SaslMechanism::from_name("cram-md5"), Some(SaslMechanism::CramMd5));
        assert_eq!(SaslMechanism::from_name(" Plain "), Some(SaslMechanism::Plain));
        assert_eq!(SaslMechanism::from_name("GSSAPI"), None);
    }

    #[test]
    fn test_preferred_picks_scram_over_plain() {
        let caps = ["IMAP4rev1", "AUTH=PLAIN", "AUTH=SCRAM-SHA-256", "AUTH=GSSAPI"];
        assert_eq!(SaslMechanism::preferred(caps), Some(SaslMechanism::ScramSha256));
        assert_eq!(SaslMechanism::preferred(["IMAP4rev1", "LOGINDISABLED"]), None);
    }
}
