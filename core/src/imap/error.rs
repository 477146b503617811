/*
 * error.rs
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

//! Error taxonomy for the IMAP client.

use std::io;

use thiserror::Error;

use super::session::ConnectionState;
use super::types::{ResponseCode, Status};
use crate::config::ConfigError;
use crate::sasl::SaslError;

#[derive(Debug, Error)]
pub enum ImapError {
    /// Socket or TLS failure, or a malformed literal announcement.
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),
    /// The server sent something the grammar does not allow.
    #[error("protocol error: {message}")]
    Protocol { message: String, line: String },
    /// Tagged NO or BAD.
    #[error("server answered {status}: {text}")]
    CommandFailure {
        status: Status,
        code: Option<ResponseCode>,
        text: String,
    },
    /// A command was issued while another is still awaiting completion.
    #[error("command {outstanding} is still awaiting completion")]
    Sequencing { outstanding: String },
    /// End of stream or read timeout.
    #[error("connection lost")]
    ConnectionLost,
    #[error("{command} is not allowed in the {state} state")]
    InvalidState { command: String, state: ConnectionState },
    #[error("authentication failed: {0}")]
    Sasl(#[from] SaslError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ImapError {
    pub(crate) fn protocol(message: impl Into<String>, line: &[u8]) -> Self {
        ImapError::Protocol {
            message: message.into(),
            line: String::from_utf8_lossy(line).into_owned(),
        }
    }

    /// Errors after which the connection is no longer usable.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, ImapError::Transport(_) | ImapError::ConnectionLost)
    }

    pub fn is_command_failure(&self) -> bool {
        matches!(self, ImapError::CommandFailure { .. })
    }

    /// Response code of a tagged NO/BAD, if any.
    pub fn code(&self) -> Option<&ResponseCode> {
        match self {
            ImapError::CommandFailure { code, .. } => code.as_ref(),
            _ => None,
        }
    }
}

impl From<io::Error> for ImapError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut => ImapError::ConnectionLost,
            _ => ImapError::Transport(e),
        }
    }
}
