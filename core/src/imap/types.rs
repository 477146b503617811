/*
 * types.rs
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

//! Value types shared by the parser and the session.

use std::fmt;

use chrono::{DateTime, FixedOffset};

use super::body::BodyStructure;
use super::envelope::Envelope;
use super::parser::FetchItem;

/// Completion status of a tagged response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Ok => "OK",
            Status::No => "NO",
            Status::Bad => "BAD",
        })
    }
}

/// Condition of an untagged status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Ok,
    No,
    Bad,
    PreAuth,
    Bye,
}

/// Bracketed response code (`[UIDVALIDITY 3857529045]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    Alert,
    Parse,
    ReadOnly,
    ReadWrite,
    TryCreate,
    UidNext(u32),
    UidValidity(u32),
    Unseen(u32),
    PermanentFlags(Vec<Flag>),
    Capability(Vec<String>),
    Other { name: String, value: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    Seen,
    Answered,
    Flagged,
    Deleted,
    Draft,
    Recent,
    /// `\*` in PERMANENTFLAGS: new keywords may be created.
    MayCreate,
    Keyword(String),
}

impl Flag {
    pub fn parse(s: &str) -> Flag {
        match s.to_ascii_lowercase().as_str() {
            "\\seen" => Flag::Seen,
            "\\answered" => Flag::Answered,
            "\\flagged" => Flag::Flagged,
            "\\deleted" => Flag::Deleted,
            "\\draft" => Flag::Draft,
            "\\recent" => Flag::Recent,
            "\\*" => Flag::MayCreate,
            _ => Flag::Keyword(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Flag::Seen => "\\Seen",
            Flag::Answered => "\\Answered",
            Flag::Flagged => "\\Flagged",
            Flag::Deleted => "\\Deleted",
            Flag::Draft => "\\Draft",
            Flag::Recent => "\\Recent",
            Flag::MayCreate => "\\*",
            Flag::Keyword(k) => k,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(\Seen \Deleted)`
pub(crate) fn flag_list(flags: &[Flag]) -> String {
    let names: Vec<&str> = flags.iter().map(Flag::as_str).collect();
    format!("({})", names.join(" "))
}

/// Snapshot of a mailbox, from SELECT/EXAMINE or STATUS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxState {
    pub name: String,
    pub message_count: u32,
    pub recent: u32,
    /// Unseen count (STATUS only).
    pub unseen: Option<u32>,
    /// Sequence number of the first unseen message (SELECT only).
    pub first_unseen: Option<u32>,
    pub uid_validity: Option<u32>,
    pub uid_next: Option<u32>,
    pub flags: Vec<Flag>,
    pub permanent_flags: Vec<Flag>,
    pub read_only: bool,
}

impl MailboxState {
    pub fn new(name: impl Into<String>) -> Self {
        MailboxState {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Per-message metadata from FETCH.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageEnvelope {
    pub seq: u32,
    pub uid: Option<u32>,
    pub flags: Vec<Flag>,
    pub envelope: Option<Envelope>,
    pub body_structure: Option<BodyStructure>,
    pub size: Option<u32>,
    pub internal_date: Option<DateTime<FixedOffset>>,
}

impl MessageEnvelope {
    pub fn new(seq: u32) -> Self {
        MessageEnvelope {
            seq,
            ..Default::default()
        }
    }

    pub fn has_flag(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    pub fn subject(&self) -> Option<&str> {
        self.envelope.as_ref()?.subject.as_deref()
    }

    /// Merge the items of one FETCH response.
    pub(crate) fn apply(&mut self, items: &[FetchItem]) {
        for item in items {
            match item {
                FetchItem::Uid(uid) => self.uid = Some(*uid),
                FetchItem::Flags(flags) => self.flags = flags.clone(),
                FetchItem::Envelope(envelope) => self.envelope = Some((**envelope).clone()),
                FetchItem::BodyStructure(body) => self.body_structure = Some((**body).clone()),
                FetchItem::Size(size) => self.size = Some(*size),
                FetchItem::InternalDate(date) => self.internal_date = Some(*date),
                FetchItem::Section { .. } | FetchItem::Other { .. } => {}
            }
        }
    }
}

/// Envelope, flags and the readable body of one message.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDetails {
    pub message: MessageEnvelope,
    /// Section the body was taken from (`1.2` or `1`).
    pub part: String,
    pub body: Vec<u8>,
}

impl MessageDetails {
    pub fn is_deleted(&self) -> bool {
        self.message.has_flag(&Flag::Deleted)
    }

    pub fn is_answered(&self) -> bool {
        self.message.has_flag(&Flag::Answered)
    }

    pub fn is_draft(&self) -> bool {
        self.message.has_flag(&Flag::Draft)
    }
}

/// One LIST or LSUB response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub attributes: Vec<String>,
    pub delimiter: Option<char>,
    pub name: String,
}

impl ListEntry {
    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a.eq_ignore_ascii_case(attribute))
    }

    /// `\Noselect` mailboxes cannot be opened.
    pub fn is_selectable(&self) -> bool {
        !self.has_attribute("\\Noselect") && !self.has_attribute("\\NonExistent")
    }
}

/// Message sequence numbers or UIDs: `1`, `2:4`, `5:*`, `1,3,7:9`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSet {
    ranges: Vec<(u32, Option<u32>)>,
}

impl SequenceSet {
    pub fn single(n: u32) -> Self {
        SequenceSet { ranges: vec![(n, Some(n))] }
    }

    pub fn range(start: u32, end: u32) -> Self {
        SequenceSet { ranges: vec![(start.min(end), Some(start.max(end)))] }
    }

    /// `start:*`
    pub fn from(start: u32) -> Self {
        SequenceSet { ranges: vec![(start, None)] }
    }

    pub fn all() -> Self {
        Self::from(1)
    }

    pub fn and(mut self, other: SequenceSet) -> Self {
        self.ranges.extend(other.ranges);
        self
    }
}

impl From<u32> for SequenceSet {
    fn from(n: u32) -> Self {
        SequenceSet::single(n)
    }
}

impl fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (start, end)) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match end {
                Some(end) if end == start => write!(f, "{}", start)?,
                Some(end) => write!(f, "{}:{}", start, end)?,
                None => write!(f, "{}:*", start)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Add,
    Remove,
    Replace,
}

/// Flag mutation for STORE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOperation {
    pub kind: StoreKind,
    pub flags: Vec<Flag>,
    /// Suppress the untagged FETCH echo.
    pub silent: bool,
}

impl StoreOperation {
    pub fn add(flags: Vec<Flag>) -> Self {
        StoreOperation { kind: StoreKind::Add, flags, silent: false }
    }

    pub fn remove(flags: Vec<Flag>) -> Self {
        StoreOperation { kind: StoreKind::Remove, flags, silent: false }
    }

    pub fn replace(flags: Vec<Flag>) -> Self {
        StoreOperation { kind: StoreKind::Replace, flags, silent: false }
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Data item name, e.g. `+FLAGS.SILENT`.
    pub fn item(&self) -> String {
        let prefix = match self.kind {
            StoreKind::Add => "+",
            StoreKind::Remove => "-",
            StoreKind::Replace => "",
        };
        let suffix = if self.silent { ".SILENT" } else { "" };
        format!("{}FLAGS{}", prefix, suffix)
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.item(), flag_list(&self.flags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_parse_round_trip() {
        assert_eq!(Flag::parse("\\SEEN"), Flag::Seen);
        assert_eq!(Flag::parse("\\*"), Flag::MayCreate);
        assert_eq!(Flag::parse("$Forwarded"), Flag::Keyword("$Forwarded".to_string()));
        assert_eq!(Flag::Deleted.to_string(), "\\Deleted");
    }

    #[test]
    fn test_sequence_set_display() {
        assert_eq!(SequenceSet::single(3).to_string(), "3");
        assert_eq!(SequenceSet::range(9, 2).to_string(), "2:9");
        assert_eq!(SequenceSet::all().to_string(), "1:*");
        assert_eq!(SequenceSet::single(1).and(SequenceSet::range(4, 6)).to_string(), "1,4:6");
    }

    #[test]
    fn test_store_operation_display() {
        let op = StoreOperation::add(vec![Flag::Deleted]).silent();
        assert_eq!(op.to_string(), "+FLAGS.SILENT (\\Deleted)");
        let op = StoreOperation::replace(vec![Flag::Seen, Flag::Flagged]);
        assert_eq!(op.to_string(), "FLAGS (\\Seen \\Flagged)");
        assert_eq!(StoreOperation::remove(vec![]).to_string(), "-FLAGS ()");
    }

    #[test]
    fn test_list_entry_selectable() {
        let entry = ListEntry {
            attributes: vec!["\\NoSelect".to_string()],
            delimiter: Some('/'),
            name: "Archive".to_string(),
        };
        assert!(!entry.is_selectable());
    }
}
