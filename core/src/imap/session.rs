/*
 * session.rs
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

//! Command pipeline and protocol state machine.
//!
//! A [`Session`] owns one connection. Every command goes through
//! [`Session::run`]: the state table is checked, a tag is allocated, the
//! command is written (literals wait for the server's `+`), and responses are
//! read until the tagged completion. Untagged data updates the session as it
//! arrives and is handed back in the [`Completion`].
//!
//! Only one command is in flight at a time. A command future dropped after
//! its first line was written leaves the command pending; the connection can
//! then only be discarded.

use std::fmt;
use std::io;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace, warn};

use super::body::BodyStructure;
use super::codec::LineCodec;
use super::command::{Command, Segment, Verb};
use super::error::ImapError;
use super::parser::{parse_response, FetchItem, Response, StatusItem, Untagged};
use super::tag::TagAllocator;
use super::types::{
    flag_list, Condition, Flag, ListEntry, MailboxState, MessageDetails, MessageEnvelope, ResponseCode,
    SequenceSet, Status, StoreOperation,
};
use crate::config::{ConfigError, ImapConfig, Security};
use crate::net::{self, Transport};
use crate::sasl::{SaslClient, SaslError, SaslMechanism};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    NotAuthenticated,
    Authenticated,
    Selected,
    Logout,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::NotAuthenticated => "not authenticated",
            ConnectionState::Authenticated => "authenticated",
            ConnectionState::Selected => "selected",
            ConnectionState::Logout => "logout",
        })
    }
}

/// Tagged completion of one command plus the untagged data read while it ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub tag: String,
    pub status: Status,
    pub code: Option<ResponseCode>,
    pub text: String,
    pub responses: Vec<Untagged>,
}

impl Completion {
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// NO and BAD become [`ImapError::CommandFailure`].
    pub fn into_result(self) -> Result<Completion, ImapError> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(ImapError::CommandFailure {
                status: self.status,
                code: self.code,
                text: self.text,
            })
        }
    }

    fn fetched(&self) -> impl Iterator<Item = (u32, &[FetchItem])> {
        self.responses.iter().filter_map(|response| match response {
            Untagged::Fetch { seq, items } => Some((*seq, items.as_slice())),
            _ => None,
        })
    }

    fn search_results(&self) -> Vec<u32> {
        self.responses
            .iter()
            .filter_map(|response| match response {
                Untagged::Search(ids) => Some(ids.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

/// The command awaiting its tagged completion.
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub tag: String,
    /// Redacted command text.
    pub command: String,
    pub responses: Vec<Untagged>,
}

pub struct Session<S> {
    codec: LineCodec<S>,
    tags: TagAllocator,
    state: ConnectionState,
    capabilities: Vec<String>,
    greeting: Option<String>,
    mailbox: Option<MailboxState>,
    /// Mailbox being built by an outstanding SELECT/EXAMINE.
    selecting: Option<MailboxState>,
    pending: Option<PendingCommand>,
    last_error: Option<String>,
    degraded: bool,
}

impl<S> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("capabilities", &self.capabilities)
            .field("mailbox", &self.mailbox)
            .field("pending", &self.pending)
            .field("degraded", &self.degraded)
            .finish_non_exhaustive()
    }
}

impl<S> Session<S> {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Uppercased capability atoms.
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    /// Text of the server greeting.
    pub fn greeting(&self) -> Option<&str> {
        self.greeting.as_deref()
    }

    /// The selected mailbox, if any.
    pub fn mailbox(&self) -> Option<&MailboxState> {
        self.mailbox.as_ref()
    }

    pub fn pending(&self) -> Option<&PendingCommand> {
        self.pending.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Set after the server sent something unparseable; cleared by the next
    /// successful SELECT or EXAMINE.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn codec(&self) -> &LineCodec<S> {
        &self.codec
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "IMAP state");
            self.state = state;
        }
    }

    fn check_ready(&self, command: &Command) -> Result<(), ImapError> {
        if let Some(pending) = &self.pending {
            return Err(ImapError::Sequencing {
                outstanding: format!("{} {}", pending.tag, pending.command),
            });
        }
        let allowed = match self.state {
            ConnectionState::Disconnected => false,
            ConnectionState::Logout => *command.verb() == Verb::Logout,
            state => *command.verb() == Verb::Logout || command.verb().allowed_in(command.is_uid(), state),
        };
        if allowed {
            Ok(())
        } else {
            Err(ImapError::InvalidState {
                command: command.name(),
                state: self.state,
            })
        }
    }

    fn fail_connection(&mut self, error: &ImapError) {
        warn!(%error, "IMAP connection failed");
        self.last_error = Some(error.to_string());
        self.pending = None;
        self.selecting = None;
        self.mailbox = None;
        self.set_state(ConnectionState::Disconnected);
    }

    fn before_issue(&mut self, command: &Command) {
        if matches!(command.verb(), Verb::Select | Verb::Examine) {
            let mut mailbox = MailboxState::new(command.mailbox_name().unwrap_or_default());
            mailbox.read_only = *command.verb() == Verb::Examine;
            self.selecting = Some(mailbox);
        }
    }

    /// Mailbox that untagged data applies to.
    fn target_mailbox(&mut self) -> Option<&mut MailboxState> {
        if self.selecting.is_some() {
            self.selecting.as_mut()
        } else if self.state == ConnectionState::Selected {
            self.mailbox.as_mut()
        } else {
            None
        }
    }

    fn apply_untagged(&mut self, response: &Untagged) {
        match response {
            Untagged::Capability(capabilities) => self.capabilities = capabilities.clone(),
            Untagged::Status {
                condition: Condition::Bye,
                text,
                ..
            } => {
                debug!(%text, "server closing connection");
                self.last_error = Some(text.clone());
                self.set_state(ConnectionState::Logout);
            }
            Untagged::Status { condition, code, text } => {
                if *condition != Condition::Ok {
                    warn!(?condition, %text, "server warning");
                }
                if let Some(code) = code {
                    self.apply_code(code, text);
                }
            }
            Untagged::Exists(n) => {
                if let Some(mailbox) = self.target_mailbox() {
                    mailbox.message_count = *n;
                }
            }
            Untagged::Recent(n) => {
                if let Some(mailbox) = self.target_mailbox() {
                    mailbox.recent = *n;
                }
            }
            Untagged::Expunge(_) => {
                if let Some(mailbox) = self.target_mailbox() {
                    mailbox.message_count = mailbox.message_count.saturating_sub(1);
                }
            }
            Untagged::Flags(flags) => {
                if let Some(mailbox) = self.target_mailbox() {
                    mailbox.flags = flags.clone();
                }
            }
            _ => {}
        }
    }

    fn apply_code(&mut self, code: &ResponseCode, text: &str) {
        match code {
            ResponseCode::Alert => warn!(%text, "server alert"),
            ResponseCode::Capability(capabilities) => self.capabilities = capabilities.clone(),
            _ => {
                if let Some(mailbox) = self.target_mailbox() {
                    match code {
                        ResponseCode::UidValidity(n) => mailbox.uid_validity = Some(*n),
                        ResponseCode::UidNext(n) => mailbox.uid_next = Some(*n),
                        ResponseCode::Unseen(n) => mailbox.first_unseen = Some(*n),
                        ResponseCode::PermanentFlags(flags) => mailbox.permanent_flags = flags.clone(),
                        ResponseCode::ReadOnly => mailbox.read_only = true,
                        ResponseCode::ReadWrite => mailbox.read_only = false,
                        _ => {}
                    }
                }
            }
        }
    }

    fn after_completion(&mut self, verb: &Verb, completion: &Completion) {
        if let Some(ResponseCode::Capability(capabilities)) = &completion.code {
            self.capabilities = capabilities.clone();
        }
        if *verb == Verb::Logout {
            self.mailbox = None;
            self.set_state(ConnectionState::Disconnected);
            return;
        }
        if self.state == ConnectionState::Logout {
            return;
        }
        match (verb, completion.is_ok()) {
            (Verb::Login | Verb::Authenticate, true) => self.set_state(ConnectionState::Authenticated),
            (Verb::Select | Verb::Examine, true) => {
                if let Some(mut mailbox) = self.selecting.take() {
                    match completion.code {
                        Some(ResponseCode::ReadOnly) => mailbox.read_only = true,
                        Some(ResponseCode::ReadWrite) => mailbox.read_only = false,
                        _ => {}
                    }
                    self.mailbox = Some(mailbox);
                }
                self.degraded = false;
                self.set_state(ConnectionState::Selected);
            }
            (Verb::Select | Verb::Examine, false) => {
                // a failed SELECT leaves no mailbox selected
                self.selecting = None;
                if self.state == ConnectionState::Selected {
                    self.mailbox = None;
                    self.set_state(ConnectionState::Authenticated);
                }
            }
            (Verb::Close | Verb::Unselect, true) => {
                self.mailbox = None;
                self.set_state(ConnectionState::Authenticated);
            }
            _ => {}
        }
    }
}

fn unexpected_continuation(text: &str) -> Result<Vec<u8>, ImapError> {
    Err(ImapError::protocol("unexpected continuation request", text.as_bytes()))
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a connected stream and read the greeting.
    pub async fn start(stream: S) -> Result<Self, ImapError> {
        Self::start_with(LineCodec::new(stream)).await
    }

    pub async fn start_with(codec: LineCodec<S>) -> Result<Self, ImapError> {
        let mut session = Session {
            codec,
            tags: TagAllocator::new(),
            state: ConnectionState::Disconnected,
            capabilities: Vec::new(),
            greeting: None,
            mailbox: None,
            selecting: None,
            pending: None,
            last_error: None,
            degraded: false,
        };
        let raw = session.codec.read_response().await?;
        let Response::Untagged(Untagged::Status { condition, code, text }) = parse_response(&raw)? else {
            return Err(ImapError::protocol("expected server greeting", &raw));
        };
        if let Some(ResponseCode::Capability(capabilities)) = &code {
            session.capabilities = capabilities.clone();
        }
        session.greeting = Some(text.clone());
        match condition {
            Condition::Ok => session.set_state(ConnectionState::NotAuthenticated),
            Condition::PreAuth => session.set_state(ConnectionState::Authenticated),
            Condition::Bye => {
                session.set_state(ConnectionState::Logout);
                return Err(ImapError::CommandFailure {
                    status: Status::No,
                    code,
                    text,
                });
            }
            Condition::No | Condition::Bad => {
                return Err(ImapError::protocol("unexpected greeting", &raw));
            }
        }
        debug!(state = %session.state, "IMAP greeting");
        Ok(session)
    }

    /// Run one command given as text, e.g. `SELECT INBOX`. NO and BAD are
    /// returned as a [`Completion`], not as an error.
    pub async fn execute(&mut self, text: &str) -> Result<Completion, ImapError> {
        self.run(Command::raw(text)).await
    }

    pub async fn run(&mut self, command: Command) -> Result<Completion, ImapError> {
        self.dispatch(command, unexpected_continuation).await
    }

    /// `responder` answers continuation requests that are not literal
    /// acknowledgements; its error cancels the exchange with `*`.
    async fn dispatch<F>(&mut self, command: Command, mut responder: F) -> Result<Completion, ImapError>
    where
        F: FnMut(&str) -> Result<Vec<u8>, ImapError>,
    {
        self.check_ready(&command)?;
        let tag = self.tags.next_tag();
        let verb = command.verb().clone();
        debug!(%tag, command = %command.log_line(), "C:");
        self.pending = Some(PendingCommand {
            tag: tag.clone(),
            command: command.log_line(),
            responses: Vec::new(),
        });
        self.before_issue(&command);
        match self.drive(&tag, command.into_segments(), &mut responder).await {
            Ok((completion, failure)) => {
                self.pending = None;
                self.after_completion(&verb, &completion);
                match failure {
                    Some(error) => {
                        self.last_error = Some(error.to_string());
                        Err(error)
                    }
                    None => {
                        if !completion.is_ok() {
                            self.last_error = Some(completion.text.clone());
                        }
                        Ok(completion)
                    }
                }
            }
            Err(error) => {
                if error.is_connection_error() {
                    self.fail_connection(&error);
                } else {
                    self.pending = None;
                    self.selecting = None;
                    self.last_error = Some(error.to_string());
                }
                Err(error)
            }
        }
    }

    /// Write the command and read until its tagged completion. The second
    /// value is the first error seen on the way, which fails the command
    /// once the completion has been consumed.
    async fn drive<F>(
        &mut self,
        tag: &str,
        segments: Vec<Segment>,
        responder: &mut F,
    ) -> Result<(Completion, Option<ImapError>), ImapError>
    where
        F: FnMut(&str) -> Result<Vec<u8>, ImapError>,
    {
        let mut segments = segments.into_iter();
        let mut literal = None;
        if let Some(first) = segments.next() {
            self.codec.write_command(tag, &first.line).await?;
            literal = first.literal;
        }
        let mut failure: Option<ImapError> = None;
        loop {
            let raw = self.codec.read_response().await?;
            let response = match parse_response(&raw) {
                Ok(response) => response,
                Err(error) => {
                    self.degraded = true;
                    if raw.starts_with(tag.as_bytes()) && raw.get(tag.len()) == Some(&b' ') {
                        return Err(error);
                    }
                    warn!(%error, "skipping malformed response");
                    failure.get_or_insert(error);
                    continue;
                }
            };
            match response {
                Response::Continuation(text) => match literal.take() {
                    Some(data) => {
                        trace!(size = data.len(), "C: literal");
                        self.codec.write_raw(&data).await?;
                        match segments.next() {
                            Some(next) => {
                                self.codec.write_line(&next.line).await?;
                                literal = next.literal;
                            }
                            None => self.codec.write_line(b"").await?,
                        }
                    }
                    None => match responder(&text) {
                        Ok(reply) => self.codec.write_line(&reply).await?,
                        Err(error) => {
                            self.codec.write_line(b"*").await?;
                            failure.get_or_insert(error);
                        }
                    },
                },
                Response::Untagged(untagged) => {
                    self.apply_untagged(&untagged);
                    if let Some(pending) = self.pending.as_mut() {
                        pending.responses.push(untagged);
                    }
                }
                Response::Tagged(tagged) if tagged.tag == tag => {
                    let responses = self
                        .pending
                        .as_mut()
                        .map(|pending| std::mem::take(&mut pending.responses))
                        .unwrap_or_default();
                    debug!(%tag, status = %tagged.status, text = %tagged.text, "S:");
                    let completion = Completion {
                        tag: tagged.tag,
                        status: tagged.status,
                        code: tagged.code,
                        text: tagged.text,
                        responses,
                    };
                    return Ok((completion, failure));
                }
                Response::Tagged(tagged) => {
                    warn!(tag = %tagged.tag, "completion for a command we did not send");
                    self.degraded = true;
                    failure.get_or_insert(ImapError::protocol("completion with unknown tag", &raw));
                }
            }
        }
    }

    pub async fn capability(&mut self) -> Result<Vec<String>, ImapError> {
        self.run(Command::new("CAPABILITY")).await?.into_result()?;
        Ok(self.capabilities.clone())
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), ImapError> {
        let command = Command::new("LOGIN").astring(username).astring(password).sensitive();
        self.run(command).await?.into_result()?;
        Ok(())
    }

    /// AUTHENTICATE with `mechanism`. The initial response goes on the
    /// command line when the server advertises SASL-IR.
    pub async fn authenticate(
        &mut self,
        mechanism: SaslMechanism,
        username: &str,
        secret: &str,
    ) -> Result<(), ImapError> {
        let mut sasl = SaslClient::new(mechanism, username, secret);
        let mut command = Command::new("AUTHENTICATE").atom(mechanism.name()).sensitive();
        let mut deferred = None;
        if let Some(initial) = sasl.initial_response()? {
            if self.has_capability("SASL-IR") {
                command = if initial.is_empty() {
                    command.atom("=")
                } else {
                    command.atom(STANDARD.encode(&initial))
                };
            } else {
                deferred = Some(initial);
            }
        }
        let mut sasl_failure: Option<SaslError> = None;
        let completion = self
            .dispatch(command, |challenge| {
                if let Some(initial) = deferred.take() {
                    return Ok(STANDARD.encode(initial).into_bytes());
                }
                let step = STANDARD
                    .decode(challenge.trim())
                    .map_err(|e| SaslError::InvalidChallenge(e.to_string()))
                    .and_then(|decoded| sasl.step(&decoded));
                match step {
                    Ok(response) => Ok(STANDARD.encode(response).into_bytes()),
                    Err(error) => {
                        sasl_failure = Some(error);
                        Ok(b"*".to_vec())
                    }
                }
            })
            .await?;
        if let Some(error) = sasl_failure {
            return Err(error.into());
        }
        completion.into_result()?;
        Ok(())
    }

    pub async fn select(&mut self, mailbox: &str) -> Result<MailboxState, ImapError> {
        self.open_mailbox("SELECT", mailbox).await
    }

    /// Read-only SELECT.
    pub async fn examine(&mut self, mailbox: &str) -> Result<MailboxState, ImapError> {
        self.open_mailbox("EXAMINE", mailbox).await
    }

    async fn open_mailbox(&mut self, verb: &str, mailbox: &str) -> Result<MailboxState, ImapError> {
        self.run(Command::new(verb).mailbox(mailbox)).await?.into_result()?;
        self.mailbox
            .clone()
            .ok_or_else(|| ImapError::protocol("no mailbox after successful SELECT", mailbox.as_bytes()))
    }

    /// STATUS; the selected mailbox is left alone.
    pub async fn status(&mut self, mailbox: &str) -> Result<MailboxState, ImapError> {
        let command = Command::new("STATUS")
            .mailbox(mailbox)
            .atom("(MESSAGES RECENT UIDNEXT UIDVALIDITY UNSEEN)");
        let completion = self.run(command).await?.into_result()?;
        let items = completion
            .responses
            .iter()
            .find_map(|response| match response {
                Untagged::MailboxStatus { items, .. } => Some(items),
                _ => None,
            })
            .ok_or_else(|| ImapError::protocol("STATUS completed without data", mailbox.as_bytes()))?;
        let mut state = MailboxState::new(mailbox);
        for item in items {
            match *item {
                StatusItem::Messages(n) => state.message_count = n,
                StatusItem::Recent(n) => state.recent = n,
                StatusItem::UidNext(n) => state.uid_next = Some(n),
                StatusItem::UidValidity(n) => state.uid_validity = Some(n),
                StatusItem::Unseen(n) => state.unseen = Some(n),
            }
        }
        Ok(state)
    }

    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>, ImapError> {
        let command = Command::new("LIST").mailbox(reference).mailbox(pattern);
        let completion = self.run(command).await?.into_result()?;
        Ok(completion
            .responses
            .into_iter()
            .filter_map(|response| match response {
                Untagged::List(entry) => Some(entry),
                _ => None,
            })
            .collect())
    }

    pub async fn fetch_envelope(&mut self, seq: u32) -> Result<MessageEnvelope, ImapError> {
        self.fetch_envelopes(&SequenceSet::single(seq))
            .await?
            .into_iter()
            .find(|message| message.seq == seq)
            .ok_or_else(|| ImapError::protocol(format!("no FETCH data for message {}", seq), b""))
    }

    /// UID, flags, envelope, size and internal date, one entry per message in
    /// the order the server reported them.
    pub async fn fetch_envelopes(&mut self, set: &SequenceSet) -> Result<Vec<MessageEnvelope>, ImapError> {
        let command = Command::new("FETCH")
            .atom(set.to_string())
            .atom("(UID FLAGS ENVELOPE RFC822.SIZE INTERNALDATE)");
        let completion = self.run(command).await?.into_result()?;
        let mut messages: Vec<MessageEnvelope> = Vec::new();
        for (seq, items) in completion.fetched() {
            match messages.iter_mut().find(|message| message.seq == seq) {
                Some(message) => message.apply(items),
                None => {
                    let mut message = MessageEnvelope::new(seq);
                    message.apply(items);
                    messages.push(message);
                }
            }
        }
        Ok(messages)
    }

    pub async fn fetch_structure(&mut self, seq: u32) -> Result<BodyStructure, ImapError> {
        let command = Command::new("FETCH").atom(seq.to_string()).atom("(BODYSTRUCTURE)");
        let completion = self.run(command).await?.into_result()?;
        let body = completion
            .fetched()
            .filter(|(n, _)| *n == seq)
            .flat_map(|(_, items)| items)
            .find_map(|item| match item {
                FetchItem::BodyStructure(body) => Some((**body).clone()),
                _ => None,
            });
        body.ok_or_else(|| ImapError::protocol(format!("no BODYSTRUCTURE for message {}", seq), b""))
    }

    /// Raw (still transfer-encoded) octets of one part; `""` is the whole message.
    pub async fn fetch_body_part(&mut self, seq: u32, part: &str) -> Result<Vec<u8>, ImapError> {
        let command = Command::new("FETCH").atom(seq.to_string()).atom(format!("(BODY[{}])", part));
        let completion = self.run(command).await?.into_result()?;
        let data = completion
            .fetched()
            .filter(|(n, _)| *n == seq)
            .find_map(|(_, items)| section_data(items, part));
        data.ok_or_else(|| ImapError::protocol(format!("no BODY[{}] for message {}", part, seq), b""))
    }

    pub async fn uid_fetch_body(&mut self, uid: u32, part: &str) -> Result<Vec<u8>, ImapError> {
        let command = Command::new("UID FETCH").atom(uid.to_string()).atom(format!("(BODY[{}])", part));
        let completion = self.run(command).await?.into_result()?;
        let data = completion
            .fetched()
            .filter(|(_, items)| items.iter().all(|item| !matches!(item, FetchItem::Uid(u) if *u != uid)))
            .find_map(|(_, items)| section_data(items, part));
        data.ok_or_else(|| ImapError::protocol(format!("no BODY[{}] for UID {}", part, uid), b""))
    }

    /// Envelope, flags and readable body: part 1.2 when it has content, else part 1.
    pub async fn fetch_message_details(&mut self, seq: u32) -> Result<MessageDetails, ImapError> {
        let message = self.fetch_envelope(seq).await?;
        let (part, body) = match self.fetch_body_part(seq, "1.2").await {
            Ok(body) if !body.is_empty() => ("1.2", body),
            Ok(_) => ("1", self.fetch_body_part(seq, "1").await?),
            Err(error) if error.is_command_failure() || matches!(error, ImapError::Protocol { .. }) => {
                debug!(seq, %error, "part 1.2 unavailable");
                ("1", self.fetch_body_part(seq, "1").await?)
            }
            Err(error) => return Err(error),
        };
        Ok(MessageDetails {
            message,
            part: part.to_string(),
            body,
        })
    }

    /// Sequence number and subject of each message in `set`.
    pub async fn subjects(&mut self, set: &SequenceSet) -> Result<Vec<(u32, String)>, ImapError> {
        Ok(self
            .fetch_envelopes(set)
            .await?
            .into_iter()
            .map(|message| {
                let subject = message.subject().unwrap_or_default().to_string();
                (message.seq, subject)
            })
            .collect())
    }

    /// STORE; returns the flags the server echoed, per sequence number.
    pub async fn store(&mut self, set: &SequenceSet, operation: &StoreOperation) -> Result<Vec<(u32, Vec<Flag>)>, ImapError> {
        let command = Command::new("STORE").atom(set.to_string()).atom(operation.to_string());
        let completion = self.run(command).await?.into_result()?;
        let flags = completion
            .fetched()
            .filter_map(|(seq, items)| {
                items.iter().find_map(|item| match item {
                    FetchItem::Flags(flags) => Some((seq, flags.clone())),
                    _ => None,
                })
            })
            .collect();
        Ok(flags)
    }

    /// Mark exactly message `seq` as `\Deleted`.
    pub async fn delete_message(&mut self, seq: u32) -> Result<(), ImapError> {
        let operation = StoreOperation::add(vec![Flag::Deleted]).silent();
        self.store(&SequenceSet::single(seq), &operation).await?;
        Ok(())
    }

    /// Returns the expunged sequence numbers in server order.
    pub async fn expunge(&mut self) -> Result<Vec<u32>, ImapError> {
        let completion = self.run(Command::new("EXPUNGE")).await?.into_result()?;
        Ok(completion
            .responses
            .iter()
            .filter_map(|response| match response {
                Untagged::Expunge(n) => Some(*n),
                _ => None,
            })
            .collect())
    }

    /// SEARCH with criteria such as `UNSEEN SINCE 1-Feb-1994`.
    pub async fn search(&mut self, criteria: &str) -> Result<Vec<u32>, ImapError> {
        let completion = self.run(Command::new("SEARCH").atom(criteria)).await?.into_result()?;
        Ok(completion.search_results())
    }

    pub async fn uid_search(&mut self, criteria: &str) -> Result<Vec<u32>, ImapError> {
        let completion = self.run(Command::new("UID SEARCH").atom(criteria)).await?.into_result()?;
        Ok(completion.search_results())
    }

    pub async fn copy(&mut self, set: &SequenceSet, mailbox: &str) -> Result<(), ImapError> {
        let command = Command::new("COPY").atom(set.to_string()).mailbox(mailbox);
        self.run(command).await?.into_result()?;
        Ok(())
    }

    /// APPEND `message` (RFC 5322 octets) as a synchronizing literal.
    pub async fn append(&mut self, mailbox: &str, flags: &[Flag], message: &[u8]) -> Result<(), ImapError> {
        let mut command = Command::new("APPEND").mailbox(mailbox);
        if !flags.is_empty() {
            command = command.atom(flag_list(flags));
        }
        self.run(command.literal(message.to_vec())).await?.into_result()?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), ImapError> {
        self.run(Command::new("CLOSE")).await?.into_result()?;
        Ok(())
    }

    pub async fn unselect(&mut self) -> Result<(), ImapError> {
        self.run(Command::new("UNSELECT")).await?.into_result()?;
        Ok(())
    }

    /// NOOP. Mailbox updates the server sends meanwhile are applied.
    pub async fn keep_alive(&mut self) -> Result<(), ImapError> {
        self.run(Command::new("NOOP")).await?.into_result()?;
        Ok(())
    }

    /// LOGOUT and close the stream. A server that hangs up before the tagged
    /// OK has still logged us out.
    pub async fn logout(&mut self) -> Result<(), ImapError> {
        if self.state == ConnectionState::Disconnected {
            return Ok(());
        }
        let result = self.run(Command::new("LOGOUT")).await;
        self.mailbox = None;
        self.set_state(ConnectionState::Disconnected);
        if let Err(error) = self.codec.shutdown().await {
            debug!(%error, "shutdown after LOGOUT");
        }
        match result {
            Ok(_) | Err(ImapError::ConnectionLost) => Ok(()),
            Err(error) => Err(error),
        }
    }
}

fn section_data(items: &[FetchItem], part: &str) -> Option<Vec<u8>> {
    items.iter().find_map(|item| match item {
        FetchItem::Section { section, data, .. } if section.eq_ignore_ascii_case(part) => {
            Some(data.clone().unwrap_or_default())
        }
        _ => None,
    })
}

impl Session<Transport> {
    /// Connect, read the greeting, and upgrade with STARTTLS when configured.
    pub async fn connect(config: &ImapConfig) -> Result<Self, ImapError> {
        let transport = net::connect(config).await?;
        let codec = LineCodec::new(transport)
            .with_read_timeout(config.read_timeout)
            .with_max_literal_size(config.max_literal_size);
        let session = Session::start_with(codec).await?;
        if config.security == Security::StartTls {
            return session.start_tls(&config.host).await;
        }
        Ok(session)
    }

    /// Connect, log in as `config.username` and select `config.mailbox`.
    /// A PREAUTH greeting skips the login.
    pub async fn open(config: &ImapConfig, password: &str) -> Result<Self, ImapError> {
        let mut session = Self::connect(config).await?;
        if session.state == ConnectionState::NotAuthenticated {
            let username = config.username.as_deref().ok_or(ConfigError::MissingUsername)?;
            session.login(username, password).await?;
        }
        session.select(&config.mailbox).await?;
        Ok(session)
    }

    /// STARTTLS, then re-read capabilities over the secured stream. Fails
    /// when the server does not offer STARTTLS; there is no plaintext fallback.
    pub async fn start_tls(mut self, host: &str) -> Result<Self, ImapError> {
        if self.capabilities.is_empty() {
            self.capability().await?;
        }
        if !self.has_capability("STARTTLS") {
            return Err(ImapError::Transport(io::Error::new(
                io::ErrorKind::Unsupported,
                "server does not offer STARTTLS",
            )));
        }
        self.run(Command::new("STARTTLS")).await?.into_result()?;
        let Session {
            codec,
            tags,
            state,
            greeting,
            ..
        } = self;
        let read_timeout = codec.read_timeout();
        let max_literal_size = codec.max_literal_size();
        let stream = codec.into_inner()?.upgrade_to_tls(host).await?;
        debug!(%host, "STARTTLS complete");
        let mut session = Session {
            codec: LineCodec::new(stream)
                .with_read_timeout(read_timeout)
                .with_max_literal_size(max_literal_size),
            tags,
            state,
            capabilities: Vec::new(),
            greeting,
            mailbox: None,
            selecting: None,
            pending: None,
            last_error: None,
            degraded: false,
        };
        session.capability().await?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(status: Status, responses: Vec<Untagged>) -> Completion {
        Completion {
            tag: "A0001".to_string(),
            status,
            code: None,
            text: "done".to_string(),
            responses,
        }
    }

    #[test]
    fn test_into_result_maps_no_to_command_failure() {
        let err = completion(Status::No, vec![]).into_result().unwrap_err();
        assert!(err.is_command_failure());
        assert!(completion(Status::Ok, vec![]).into_result().is_ok());
    }

    #[test]
    fn test_search_results_are_concatenated() {
        let done = completion(Status::Ok, vec![Untagged::Search(vec![1, 2]), Untagged::Exists(4), Untagged::Search(vec![9])]);
        assert_eq!(done.search_results(), vec![1, 2, 9]);
    }

    #[test]
    fn test_section_data_matches_part() {
        let items = vec![
            FetchItem::Uid(4),
            FetchItem::Section { section: "1".to_string(), origin: None, data: Some(b"one".to_vec()) },
            FetchItem::Section { section: "2".to_string(), origin: None, data: None },
        ];
        assert_eq!(section_data(&items, "1"), Some(b"one".to_vec()));
        assert_eq!(section_data(&items, "2"), Some(Vec::new()));
        assert_eq!(section_data(&items, "3"), None);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::NotAuthenticated.to_string(), "not authenticated");
        assert_eq!(ConnectionState::Selected.to_string(), "selected");
    }
}
