/*
 * plain.rs
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

//! PLAIN (RFC 4616) and the legacy LOGIN exchange.

use super::SaslError;

/// PLAIN payload: authzid NUL authcid NUL password. Base64 is applied by the caller.
pub fn encode_plain(authzid: &str, authcid: &str, password: &str) -> Vec<u8> {
    format!("{}\0{}\0{}", authzid, authcid, password).into_bytes()
}

/// LOGIN: the server prompts "Username:" then "Password:".
pub fn login_response(challenge: &[u8], authcid: &str, password: &str) -> Result<Vec<u8>, SaslError> {
    let prompt = String::from_utf8_lossy(challenge).to_ascii_lowercase();
    if prompt.contains("username") || prompt.contains("user name") {
        Ok(authcid.as_bytes().to_vec())
    } else if prompt.contains("password") {
        Ok(password.as_bytes().to_vec())
    } else {
        Err(SaslError::InvalidChallenge(format!("unexpected LOGIN prompt {:?}", prompt.trim())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_plain() {
        assert_eq!(encode_plain("", "alice", "secret"), b"\0alice\0secret".to_vec());
    }

    #[test]
    fn test_login_prompts() {
        assert_eq!(login_response(b"Username:", "alice", "pw").unwrap(), b"alice".to_vec());
        assert_eq!(login_response(b"Password:", "alice", "pw").unwrap(), b"pw".to_vec());
        assert!(login_response(b"Realm:", "alice", "pw").is_err());
    }
}
