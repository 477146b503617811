/*
 * scram.rs
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

//! SCRAM-SHA-256 client (RFC 5802, 7677). No channel binding.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};

use super::SaslError;

type HmacSha256 = Hmac<Sha256>;

const GS2_HEADER: &str = "n,,";
const NONCE_LEN: usize = 24;

/// Client side of one SCRAM exchange: client-first, client-final, then
/// verification of the server signature.
#[derive(Debug)]
pub struct ScramClient {
    client_nonce: String,
    client_first_bare: String,
    server_signature: Option<Vec<u8>>,
    complete: bool,
}

impl ScramClient {
    /// Returns the client-first message and the state for the remaining rounds.
    pub fn start(authcid: &str) -> Result<(Vec<u8>, Self), SaslError> {
        let mut random = [0u8; NONCE_LEN];
        getrandom::getrandom(&mut random).map_err(|e| SaslError::Random(e.to_string()))?;
        Ok(Self::with_nonce(authcid, BASE64.encode(random)))
    }

    fn with_nonce(authcid: &str, nonce: String) -> (Vec<u8>, Self) {
        let client_first_bare = format!("n={},r={}", sasl_name(authcid), nonce);
        let message = format!("{}{}", GS2_HEADER, client_first_bare).into_bytes();
        let client = ScramClient {
            client_nonce: nonce,
            client_first_bare,
            server_signature: None,
            complete: false,
        };
        (message, client)
    }

    /// True once the server signature has been verified.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Answer server-first with client-final; answer server-final with an empty response.
    pub fn step(&mut self, challenge: &[u8], password: &str) -> Result<Vec<u8>, SaslError> {
        if self.complete {
            return Err(SaslError::UnexpectedChallenge);
        }
        match self.server_signature.take() {
            None => self.client_final(challenge, password),
            Some(expected) => {
                verify_server_final(challenge, &expected)?;
                self.complete = true;
                Ok(Vec::new())
            }
        }
    }

    fn client_final(&mut self, challenge: &[u8], password: &str) -> Result<Vec<u8>, SaslError> {
        let server_first = std::str::from_utf8(challenge).map_err(|_| invalid("server-first is not UTF-8"))?;
        if let Some(error) = attribute(server_first, 'e') {
            return Err(SaslError::Server(error.to_string()));
        }
        let nonce = attribute(server_first, 'r').ok_or_else(|| invalid("missing nonce in server-first"))?;
        if !nonce.starts_with(&self.client_nonce) || nonce.len() == self.client_nonce.len() {
            return Err(invalid("server nonce must extend the client nonce"));
        }
        let salt = attribute(server_first, 's').ok_or_else(|| invalid("missing salt in server-first"))?;
        let salt = BASE64.decode(salt).map_err(|_| invalid("salt is not valid base64"))?;
        let iterations: u32 = attribute(server_first, 'i')
            .ok_or_else(|| invalid("missing iteration count in server-first"))?
            .parse()
            .map_err(|_| invalid("invalid iteration count"))?;
        if iterations == 0 {
            return Err(invalid("invalid iteration count"));
        }

        let mut salted_password = [0u8; 32];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut salted_password);
        let client_key = hmac(&salted_password, b"Client Key")?;
        let stored_key = Sha256::digest(&client_key);
        let server_key = hmac(&salted_password, b"Server Key")?;

        let without_proof = format!("c={},r={}", BASE64.encode(GS2_HEADER), nonce);
        let auth_message = format!("{},{},{}", self.client_first_bare, server_first, without_proof);
        let client_signature = hmac(&stored_key, auth_message.as_bytes())?;
        let proof: Vec<u8> = client_key.iter().zip(&client_signature).map(|(k, s)| k ^ s).collect();
        self.server_signature = Some(hmac(&server_key, auth_message.as_bytes())?);

        Ok(format!("{},p={}", without_proof, BASE64.encode(proof)).into_bytes())
    }
}

fn verify_server_final(challenge: &[u8], expected: &[u8]) -> Result<(), SaslError> {
    let server_final = std::str::from_utf8(challenge).map_err(|_| invalid("server-final is not UTF-8"))?;
    if let Some(error) = attribute(server_final, 'e') {
        return Err(SaslError::Server(error.to_string()));
    }
    let verifier = attribute(server_final, 'v').ok_or_else(|| invalid("missing verifier in server-final"))?;
    let signature = BASE64.decode(verifier).map_err(|_| invalid("verifier is not valid base64"))?;
    if signature != expected {
        return Err(SaslError::ServerSignature);
    }
    Ok(())
}

fn attribute(message: &str, key: char) -> Option<&str> {
    message
        .split(',')
        .find_map(|part| part.trim().strip_prefix(key)?.strip_prefix('='))
}

fn sasl_name(s: &str) -> String {
    s.replace('=', "=3D").replace(',', "=2C")
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SaslError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| invalid("HMAC key rejected"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn invalid(message: &str) -> SaslError {
    SaslError::InvalidChallenge(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER_FIRST: &[u8] =
        b"r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";

    #[test]
    fn test_rfc7677_exchange() {
        let (first, mut client) = ScramClient::with_nonce("user", "rOprNGfwEbeRWgbNEkqO".to_string());
        assert_eq!(first, b"n,,n=user,r=rOprNGfwEbeRWgbNEkqO".to_vec());

        let client_final = client.step(SERVER_FIRST, "pencil").unwrap();
        assert_eq!(
            String::from_utf8(client_final).unwrap(),
            "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ="
        );

        let last = client
            .step(b"v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=", "pencil")
            .unwrap();
        assert!(last.is_empty());
        assert!(client.is_complete());
    }

    #[test]
    fn test_wrong_server_signature_is_rejected() {
        let (_, mut client) = ScramClient::with_nonce("user", "rOprNGfwEbeRWgbNEkqO".to_string());
        client.step(SERVER_FIRST, "pencil").unwrap();
        let err = client.step(b"v=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=", "pencil").unwrap_err();
        assert_eq!(err, SaslError::ServerSignature);
    }

    #[test]
    fn test_nonce_must_extend_client_nonce() {
        let (_, mut client) = ScramClient::with_nonce("user", "abc".to_string());
        let err = client.step(b"r=xyz123,s=QUJD,i=4096", "pencil").unwrap_err();
        assert!(matches!(err, SaslError::InvalidChallenge(_)));
    }

    #[test]
    fn test_sasl_name_escaping() {
        assert_eq!(sasl_name("a=b,c"), "a=3Db=2Cc");
    }
}
