/*
 * blocking.rs
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

//! Blocking facade: one current-thread runtime per connection.
//!
//! Every call runs the matching [`Session`] operation to completion before
//! returning. Do not call these from inside an async runtime.

use tokio::runtime::{Builder, Runtime};

use super::body::BodyStructure;
use super::error::ImapError;
use super::session::{Completion, ConnectionState, Session};
use super::types::{Flag, ListEntry, MailboxState, MessageDetails, MessageEnvelope, SequenceSet, StoreOperation};
use crate::config::{ImapConfig, Security};
use crate::net::Transport;
use crate::sasl::SaslMechanism;

pub struct Client {
    runtime: Runtime,
    session: Session<Transport>,
}

impl Client {
    pub fn connect(config: &ImapConfig) -> Result<Self, ImapError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ImapError::Transport)?;
        let session = runtime.block_on(Session::connect(config))?;
        Ok(Client { runtime, session })
    }

    /// `use_tls`: implicit TLS when true, plaintext otherwise. Use
    /// [`connect`](Self::connect) with [`Security::StartTls`] to upgrade.
    pub fn connect_to(host: &str, port: u16, use_tls: bool) -> Result<Self, ImapError> {
        let security = if use_tls { Security::Implicit } else { Security::Plain };
        Self::connect(&ImapConfig::new(host, port).with_security(security))
    }

    /// Connect, log in as `config.username` and select `config.mailbox`.
    pub fn open(config: &ImapConfig, password: &str) -> Result<Self, ImapError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(ImapError::Transport)?;
        let session = runtime.block_on(Session::open(config, password))?;
        Ok(Client { runtime, session })
    }

    pub fn session(&self) -> &Session<Transport> {
        &self.session
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn mailbox(&self) -> Option<&MailboxState> {
        self.session.mailbox()
    }

    pub fn execute(&mut self, text: &str) -> Result<Completion, ImapError> {
        self.runtime.block_on(self.session.execute(text))
    }

    pub fn capability(&mut self) -> Result<Vec<String>, ImapError> {
        self.runtime.block_on(self.session.capability())
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<(), ImapError> {
        self.runtime.block_on(self.session.login(username, password))
    }

    pub fn authenticate(&mut self, mechanism: SaslMechanism, username: &str, secret: &str) -> Result<(), ImapError> {
        self.runtime.block_on(self.session.authenticate(mechanism, username, secret))
    }

    pub fn select_mailbox(&mut self, name: &str) -> Result<MailboxState, ImapError> {
        self.runtime.block_on(self.session.select(name))
    }

    pub fn examine(&mut self, name: &str) -> Result<MailboxState, ImapError> {
        self.runtime.block_on(self.session.examine(name))
    }

    pub fn status_of(&mut self, name: &str) -> Result<MailboxState, ImapError> {
        self.runtime.block_on(self.session.status(name))
    }

    pub fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>, ImapError> {
        self.runtime.block_on(self.session.list(reference, pattern))
    }

    pub fn fetch_envelope(&mut self, seq: u32) -> Result<MessageEnvelope, ImapError> {
        self.runtime.block_on(self.session.fetch_envelope(seq))
    }

    pub fn fetch_envelopes(&mut self, set: &SequenceSet) -> Result<Vec<MessageEnvelope>, ImapError> {
        self.runtime.block_on(self.session.fetch_envelopes(set))
    }

    pub fn fetch_body_part(&mut self, seq: u32, part: &str) -> Result<Vec<u8>, ImapError> {
        self.runtime.block_on(self.session.fetch_body_part(seq, part))
    }

    pub fn uid_fetch_body(&mut self, uid: u32, part: &str) -> Result<Vec<u8>, ImapError> {
        self.runtime.block_on(self.session.uid_fetch_body(uid, part))
    }

    pub fn fetch_structure(&mut self, seq: u32) -> Result<BodyStructure, ImapError> {
        self.runtime.block_on(self.session.fetch_structure(seq))
    }

    pub fn fetch_message_details(&mut self, seq: u32) -> Result<MessageDetails, ImapError> {
        self.runtime.block_on(self.session.fetch_message_details(seq))
    }

    pub fn subjects(&mut self, set: &SequenceSet) -> Result<Vec<(u32, String)>, ImapError> {
        self.runtime.block_on(self.session.subjects(set))
    }

    pub fn store(&mut self, set: &SequenceSet, operation: &StoreOperation) -> Result<Vec<(u32, Vec<Flag>)>, ImapError> {
        self.runtime.block_on(self.session.store(set, operation))
    }

    pub fn delete_message(&mut self, seq: u32) -> Result<(), ImapError> {
        self.runtime.block_on(self.session.delete_message(seq))
    }

    pub fn expunge(&mut self) -> Result<Vec<u32>, ImapError> {
        self.runtime.block_on(self.session.expunge())
    }

    pub fn search(&mut self, criteria: &str) -> Result<Vec<u32>, ImapError> {
        self.runtime.block_on(self.session.search(criteria))
    }

    pub fn uid_search(&mut self, criteria: &str) -> Result<Vec<u32>, ImapError> {
        self.runtime.block_on(self.session.uid_search(criteria))
    }

    pub fn copy(&mut self, set: &SequenceSet, mailbox: &str) -> Result<(), ImapError> {
        self.runtime.block_on(self.session.copy(set, mailbox))
    }

    pub fn append(&mut self, mailbox: &str, flags: &[Flag], message: &[u8]) -> Result<(), ImapError> {
        self.runtime.block_on(self.session.append(mailbox, flags, message))
    }

    pub fn close(&mut self) -> Result<(), ImapError> {
        self.runtime.block_on(self.session.close())
    }

    pub fn unselect(&mut self) -> Result<(), ImapError> {
        self.runtime.block_on(self.session.unselect())
    }

    /// Liveness probe. Reconnecting after a failure is up to the caller.
    pub fn keep_alive(&mut self) -> Result<(), ImapError> {
        self.runtime.block_on(self.session.keep_alive())
    }

    pub fn logout(&mut self) -> Result<(), ImapError> {
        self.runtime.block_on(self.session.logout())
    }
}

