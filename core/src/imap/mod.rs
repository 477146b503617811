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

//! IMAP4rev1 client core (RFC 3501).
//!
//! Layers, bottom up: [`codec`] frames lines and literals, [`parser`] turns a
//! response into structured data, [`command`] builds command lines, and
//! [`session`] runs the state machine. [`blocking`] wraps a session for
//! synchronous callers.

pub mod blocking;
pub mod body;
pub mod codec;
pub mod command;
pub mod envelope;
pub mod error;
pub mod mailbox_name;
pub mod parser;
pub mod session;
pub mod tag;
pub mod types;

pub use blocking::Client;
pub use body::{BodyFields, BodyStructure, Disposition, MediaType, TransferEncoding};
pub use codec::LineCodec;
pub use command::{Command, Verb};
pub use envelope::{format_address, Address, Envelope};
pub use error::ImapError;
pub use parser::{parse_response, FetchItem, Response, StatusItem, Tagged, Untagged, Value};
pub use session::{Completion, ConnectionState, PendingCommand, Session};
pub use tag::TagAllocator;
pub use types::{
    Condition, Flag, ListEntry, MailboxState, MessageDetails, MessageEnvelope, ResponseCode, SequenceSet, Status,
    StoreKind, StoreOperation,
};
