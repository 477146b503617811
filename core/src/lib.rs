/*
 * lib.rs
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

//! Postino core: an IMAP4rev1 client library.
//!
//! [`imap::Session`] drives one connection over any async byte stream;
//! [`imap::Client`] is the blocking equivalent over TCP/TLS.

pub mod config;
pub mod imap;
pub mod net;
pub mod sasl;

pub use config::{ConfigError, ImapConfig, Security};
pub use imap::{Client, ImapError, Session};
