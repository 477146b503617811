/*
 * command.rs
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

//! Command construction and the per-state command table.

use std::fmt;

use super::mailbox_name;
use super::session::ConnectionState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Capability,
    Noop,
    Logout,
    StartTls,
    Login,
    Authenticate,
    Select,
    Examine,
    Create,
    Delete,
    Rename,
    Subscribe,
    Unsubscribe,
    List,
    Lsub,
    Status,
    Append,
    Check,
    Close,
    Unselect,
    Expunge,
    Search,
    Fetch,
    Store,
    Copy,
    Move,
    Other(String),
}

impl Verb {
    pub fn parse(name: &str) -> Verb {
        let upper = name.to_ascii_uppercase();
        match upper.as_str() {
            "CAPABILITY" => Verb::Capability,
            "NOOP" => Verb::Noop,
            "LOGOUT" => Verb::Logout,
            "STARTTLS" => Verb::StartTls,
            "LOGIN" => Verb::Login,
            "AUTHENTICATE" => Verb::Authenticate,
            "SELECT" => Verb::Select,
            "EXAMINE" => Verb::Examine,
            "CREATE" => Verb::Create,
            "DELETE" => Verb::Delete,
            "RENAME" => Verb::Rename,
            "SUBSCRIBE" => Verb::Subscribe,
            "UNSUBSCRIBE" => Verb::Unsubscribe,
            "LIST" => Verb::List,
            "LSUB" => Verb::Lsub,
            "STATUS" => Verb::Status,
            "APPEND" => Verb::Append,
            "CHECK" => Verb::Check,
            "CLOSE" => Verb::Close,
            "UNSELECT" => Verb::Unselect,
            "EXPUNGE" => Verb::Expunge,
            "SEARCH" => Verb::Search,
            "FETCH" => Verb::Fetch,
            "STORE" => Verb::Store,
            "COPY" => Verb::Copy,
            "MOVE" => Verb::Move,
            _ => Verb::Other(upper),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Verb::Capability => "CAPABILITY",
            Verb::Noop => "NOOP",
            Verb::Logout => "LOGOUT",
            Verb::StartTls => "STARTTLS",
            Verb::Login => "LOGIN",
            Verb::Authenticate => "AUTHENTICATE",
            Verb::Select => "SELECT",
            Verb::Examine => "EXAMINE",
            Verb::Create => "CREATE",
            Verb::Delete => "DELETE",
            Verb::Rename => "RENAME",
            Verb::Subscribe => "SUBSCRIBE",
            Verb::Unsubscribe => "UNSUBSCRIBE",
            Verb::List => "LIST",
            Verb::Lsub => "LSUB",
            Verb::Status => "STATUS",
            Verb::Append => "APPEND",
            Verb::Check => "CHECK",
            Verb::Close => "CLOSE",
            Verb::Unselect => "UNSELECT",
            Verb::Expunge => "EXPUNGE",
            Verb::Search => "SEARCH",
            Verb::Fetch => "FETCH",
            Verb::Store => "STORE",
            Verb::Copy => "COPY",
            Verb::Move => "MOVE",
            Verb::Other(name) => name,
        }
    }

    /// Whether the command may be issued in `state`. `UID` commands need a
    /// selected mailbox; unknown verbs are left to the server.
    pub fn allowed_in(&self, uid: bool, state: ConnectionState) -> bool {
        use ConnectionState::*;
        if uid {
            return state == Selected;
        }
        match self {
            Verb::Capability | Verb::Noop | Verb::Logout | Verb::Other(_) => {
                matches!(state, NotAuthenticated | Authenticated | Selected)
            }
            Verb::Login | Verb::Authenticate | Verb::StartTls => state == NotAuthenticated,
            Verb::Select
            | Verb::Examine
            | Verb::Create
            | Verb::Delete
            | Verb::Rename
            | Verb::Subscribe
            | Verb::Unsubscribe
            | Verb::List
            | Verb::Lsub
            | Verb::Status
            | Verb::Append => matches!(state, Authenticated | Selected),
            Verb::Check
            | Verb::Close
            | Verb::Unselect
            | Verb::Expunge
            | Verb::Search
            | Verb::Fetch
            | Verb::Store
            | Verb::Copy
            | Verb::Move => state == Selected,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A line to send, optionally announcing a literal that follows once the
/// server answers `+`.
#[derive(Debug, Clone)]
pub(crate) struct Segment {
    pub line: Vec<u8>,
    pub literal: Option<Vec<u8>>,
}

/// Command text without the tag, built argument by argument.
///
/// ```ignore
/// let cmd = Command::new("LOGIN").astring("alice").astring("pass word").sensitive();
/// ```
#[derive(Clone)]
pub struct Command {
    verb: Verb,
    uid: bool,
    mailbox: Option<String>,
    segments: Vec<Segment>,
    line: Vec<u8>,
    sensitive: bool,
}

impl Command {
    /// Start a command; `name` is the verb, optionally prefixed by `UID`.
    pub fn new(name: &str) -> Self {
        let name = name.trim();
        let mut words = name.split_ascii_whitespace();
        let first = words.next().unwrap_or_default();
        let (uid, verb) = if first.eq_ignore_ascii_case("UID") {
            (true, words.next().unwrap_or_default())
        } else {
            (false, first)
        };
        Command {
            verb: Verb::parse(verb),
            uid,
            mailbox: None,
            segments: Vec::new(),
            line: name.as_bytes().to_vec(),
            sensitive: false,
        }
    }

    /// A complete command line as typed, e.g. `SELECT "Sent Items"`.
    pub fn raw(text: &str) -> Self {
        let text = text.trim_end_matches(['\r', '\n']).trim_start();
        let mut words = text.splitn(3, ' ');
        let first = words.next().unwrap_or_default();
        let head_len = if first.eq_ignore_ascii_case("UID") {
            first.len() + words.next().map_or(0, |w| w.len() + 1)
        } else {
            first.len()
        };
        let (head, args) = text.split_at(head_len.min(text.len()));
        let mut command = Command::new(head);
        if matches!(command.verb, Verb::Select | Verb::Examine) {
            command.mailbox = first_argument(args.trim_start()).map(|name| mailbox_name::decode(&name));
        }
        command.line = text.as_bytes().to_vec();
        command
    }

    /// Append an atom (or any pre-formatted argument) verbatim.
    pub fn atom(mut self, atom: impl AsRef<str>) -> Self {
        self.line.push(b' ');
        self.line.extend_from_slice(atom.as_ref().as_bytes());
        self
    }

    /// Append an astring: bare atom when possible, else quoted, else literal.
    pub fn astring(self, value: &str) -> Self {
        if is_atom(value) {
            self.atom(value)
        } else if is_quotable(value) {
            self.atom(quote(value))
        } else {
            self.literal(value.as_bytes().to_vec())
        }
    }

    /// Append a mailbox name, encoded to modified UTF-7.
    pub fn mailbox(mut self, name: &str) -> Self {
        if matches!(self.verb, Verb::Select | Verb::Examine) && self.mailbox.is_none() {
            self.mailbox = Some(name.to_string());
        }
        self.astring(&mailbox_name::encode(name))
    }

    /// Append a synchronizing literal.
    pub fn literal(mut self, data: Vec<u8>) -> Self {
        self.line.extend_from_slice(format!(" {{{}}}", data.len()).as_bytes());
        let line = std::mem::take(&mut self.line);
        self.segments.push(Segment { line, literal: Some(data) });
        self
    }

    /// Keep arguments out of logs.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn verb(&self) -> &Verb {
        &self.verb
    }

    pub fn is_uid(&self) -> bool {
        self.uid
    }

    /// Mailbox named by SELECT/EXAMINE.
    pub fn mailbox_name(&self) -> Option<&str> {
        self.mailbox.as_deref()
    }

    /// `FETCH`, `UID FETCH`, ...
    pub fn name(&self) -> String {
        if self.uid {
            format!("UID {}", self.verb)
        } else {
            self.verb.to_string()
        }
    }

    /// The command as it may appear in logs.
    pub fn log_line(&self) -> String {
        if self.sensitive {
            return format!("{} <redacted>", self.name());
        }
        let mut out = String::new();
        for segment in &self.segments {
            out.push_str(&String::from_utf8_lossy(&segment.line));
            if let Some(literal) = &segment.literal {
                out.push_str(&format!("<{} octets>", literal.len()));
            }
        }
        out.push_str(&String::from_utf8_lossy(&self.line));
        out
    }

    /// Wire form: the first segment follows the tag, each later one follows a literal.
    pub(crate) fn into_segments(self) -> Vec<Segment> {
        let mut segments = self.segments;
        segments.push(Segment {
            line: self.line,
            literal: None,
        });
        segments
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("verb", &self.verb)
            .field("uid", &self.uid)
            .field("text", &self.log_line())
            .finish()
    }
}

fn is_atom_char(b: u8) -> bool {
    (0x21..0x7f).contains(&b) && !b"(){ %*\"\\]".contains(&b)
}

fn is_atom(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(is_atom_char)
}

fn is_quotable(value: &str) -> bool {
    value.bytes().all(|b| b.is_ascii() && b != b'\r' && b != b'\n' && b != 0)
}

pub(crate) fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// First astring argument of a typed command line (quoted or bare).
fn first_argument(args: &str) -> Option<String> {
    if let Some(rest) = args.strip_prefix('"') {
        let mut out = String::new();
        let mut chars = rest.chars();
        while let Some(c) = chars.next() {
            match c {
                '"' => return Some(out),
                '\\' => out.extend(chars.next()),
                c => out.push(c),
            }
        }
        None
    } else {
        args.split_ascii_whitespace().next().map(str::to_string)
    }
}
