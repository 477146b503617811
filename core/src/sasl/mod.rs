/*
 * mod.rs
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

//! SASL client for IMAP AUTHENTICATE: PLAIN, LOGIN, CRAM-MD5, SCRAM-SHA-256, XOAUTH2.
//!
//! [`SaslClient`] works on decoded challenge bytes; base64 framing belongs to the
//! IMAP session.

mod mechanism;
mod plain;
mod scram;
mod xoauth2;

use hmac::{Hmac, Mac};
use thiserror::Error;
use tracing::debug;

pub use mechanism::SaslMechanism;
pub use plain::{encode_plain, login_response};
pub use scram::ScramClient;
pub use xoauth2::xoauth2_initial_response;

type HmacMd5 = Hmac<md5::Md5>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaslError {
    #[error("invalid server challenge: {0}")]
    InvalidChallenge(String),
    #[error("server sent a challenge after the exchange finished")]
    UnexpectedChallenge,
    #[error("server signature did not verify")]
    ServerSignature,
    #[error("server reported authentication error: {0}")]
    Server(String),
    #[error("random source unavailable: {0}")]
    Random(String),
}

#[derive(Debug)]
enum Exchange {
    Start,
    Scram(ScramClient),
    Done,
}

/// One authentication exchange for a single mechanism.
pub struct SaslClient {
    mechanism: SaslMechanism,
    authcid: String,
    secret: String,
    exchange: Exchange,
}

impl std::fmt::Debug for SaslClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaslClient")
            .field("mechanism", &self.mechanism)
            .field("authcid", &self.authcid)
            .field("exchange", &self.exchange)
            .finish_non_exhaustive()
    }
}

impl SaslClient {
    /// `secret` is the password, or the access token for XOAUTH2.
    pub fn new(mechanism: SaslMechanism, authcid: impl Into<String>, secret: impl Into<String>) -> Self {
        SaslClient {
            mechanism,
            authcid: authcid.into(),
            secret: secret.into(),
            exchange: Exchange::Start,
        }
    }

    pub fn mechanism(&self) -> SaslMechanism {
        self.mechanism
    }

    /// The client-first payload, for mechanisms where the client speaks first.
    pub fn initial_response(&mut self) -> Result<Option<Vec<u8>>, SaslError> {
        let response = match self.mechanism {
            SaslMechanism::Plain => {
                self.exchange = Exchange::Done;
                Some(encode_plain("", &self.authcid, &self.secret))
            }
            SaslMechanism::XOAuth2 => {
                self.exchange = Exchange::Done;
                Some(xoauth2_initial_response(&self.authcid, &self.secret))
            }
            SaslMechanism::ScramSha256 => {
                let (message, client) = ScramClient::start(&self.authcid)?;
                self.exchange = Exchange::Scram(client);
                Some(message)
            }
            SaslMechanism::Login | SaslMechanism::CramMd5 => None,
        };
        Ok(response)
    }

    /// Answer one decoded server challenge.
    pub fn step(&mut self, challenge: &[u8]) -> Result<Vec<u8>, SaslError> {
        if let Exchange::Scram(client) = &mut self.exchange {
            return client.step(challenge, &self.secret);
        }
        let started = matches!(self.exchange, Exchange::Start);
        match (started, self.mechanism) {
            (true, SaslMechanism::Login) => login_response(challenge, &self.authcid, &self.secret),
            (true, SaslMechanism::CramMd5) => {
                self.exchange = Exchange::Done;
                cram_md5_response(&self.authcid, &self.secret, challenge)
            }
            (false, SaslMechanism::XOAuth2) => {
                if let Some(status) = xoauth2::error_status(challenge) {
                    debug!(%status, "XOAUTH2 rejected by server");
                }
                Ok(Vec::new())
            }
            _ => Err(SaslError::UnexpectedChallenge),
        }
    }
}

fn cram_md5_response(authcid: &str, password: &str, challenge: &[u8]) -> Result<Vec<u8>, SaslError> {
    let mut mac = HmacMd5::new_from_slice(password.as_bytes())
        .map_err(|_| SaslError::InvalidChallenge("CRAM-MD5 key rejected".to_string()))?;
    mac.update(challenge);
    let digest = mac.finalize().into_bytes();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    Ok(format!("{} {}", authcid, hex).into_bytes())
}
