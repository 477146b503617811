/*
 * parser.rs
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

//! Response parser: recursive descent over one assembled response.
//!
//! Input is what [`LineCodec::read_response`](super::codec::LineCodec::read_response)
//! returns: a response without its final CRLF, literal octets inline after
//! their `{n}\r\n` announcement. Every failure is an [`ImapError::Protocol`]
//! carrying the offending text; a partial structure is never returned.

use chrono::{DateTime, FixedOffset};

use super::body::{BodyFields, BodyStructure, Disposition, MediaType, TransferEncoding};
use super::envelope::{Address, Envelope};
use super::error::ImapError;
use super::mailbox_name;
use super::types::{Condition, Flag, ListEntry, ResponseCode, Status};

const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Tagged(Tagged),
    Untagged(Untagged),
    /// `+ text`; for AUTHENTICATE the text is a base64 challenge.
    Continuation(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagged {
    pub tag: String,
    pub status: Status,
    pub code: Option<ResponseCode>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Untagged {
    Status {
        condition: Condition,
        code: Option<ResponseCode>,
        text: String,
    },
    Capability(Vec<String>),
    Flags(Vec<Flag>),
    Exists(u32),
    Recent(u32),
    Expunge(u32),
    Fetch { seq: u32, items: Vec<FetchItem> },
    MailboxStatus { mailbox: String, items: Vec<StatusItem> },
    List(ListEntry),
    Lsub(ListEntry),
    Search(Vec<u32>),
    Other { keyword: String, text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusItem {
    Messages(u32),
    Recent(u32),
    UidNext(u32),
    UidValidity(u32),
    Unseen(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchItem {
    Uid(u32),
    Flags(Vec<Flag>),
    Envelope(Box<Envelope>),
    BodyStructure(Box<BodyStructure>),
    /// `BODY[section]<origin>`; RFC822, RFC822.HEADER and RFC822.TEXT map to
    /// sections `""`, `HEADER` and `TEXT`. `data` is `None` for NIL.
    Section {
        section: String,
        origin: Option<u32>,
        data: Option<Vec<u8>>,
    },
    Size(u32),
    InternalDate(DateTime<FixedOffset>),
    Other { name: String, value: Value },
}

/// Generic parenthesized data. Quoted strings and literals are both `String`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Nil,
    Atom(String),
    String(Vec<u8>),
    List(Vec<Value>),
}

impl Value {
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Atom(a) => Some(a.clone()),
            Value::String(s) => Some(String::from_utf8_lossy(s).into_owned()),
            Value::Nil | Value::List(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<u32> {
        match self {
            Value::Atom(a) => a.parse().ok(),
            _ => None,
        }
    }
}

pub fn parse_response(input: &[u8]) -> Result<Response, ImapError> {
    let mut cursor = Cursor::new(input);
    match cursor.peek() {
        Some(b'+') => {
            cursor.pos += 1;
            cursor.eat(b' ');
            Ok(Response::Continuation(cursor.rest_text()))
        }
        Some(b'*') => {
            cursor.pos += 1;
            cursor.space()?;
            untagged(&mut cursor).map(Response::Untagged)
        }
        Some(_) => tagged(&mut cursor).map(Response::Tagged),
        None => Err(cursor.error("empty response")),
    }
}

/// Parse exactly one value, e.g. a parenthesized list.
pub fn parse_value(input: &[u8]) -> Result<Value, ImapError> {
    let mut cursor = Cursor::new(input);
    let value = cursor.value(0)?;
    cursor.finish()?;
    Ok(value)
}

/// `17-Jul-1996 02:44:25 -0700`; the day may be space padded.
pub fn parse_internal_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(raw.trim(), "%d-%b-%Y %H:%M:%S %z").ok()
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a [u8]) -> Self {
        Cursor { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn error(&self, message: impl Into<String>) -> ImapError {
        ImapError::Protocol {
            message: format!("{} at offset {}", message.into(), self.pos),
            line: String::from_utf8_lossy(self.input).into_owned(),
        }
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), ImapError> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}", byte as char)))
        }
    }

    /// One or more spaces.
    fn space(&mut self) -> Result<(), ImapError> {
        self.expect(b' ')?;
        self.skip_spaces();
        Ok(())
    }

    fn skip_spaces(&mut self) -> bool {
        let start = self.pos;
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
        self.pos > start
    }

    fn finish(&mut self) -> Result<(), ImapError> {
        self.skip_spaces();
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error("unexpected trailing data"))
        }
    }

    fn rest_text(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.input[self.pos..]).into_owned();
        self.pos = self.input.len();
        text
    }

    /// Atom characters, plus bracketed sections so that `BODY[HEADER.FIELDS (TO)]<0>`
    /// is one token.
    fn atom(&mut self) -> Result<&'a str, ImapError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b'[' => self.skip_section()?,
                b' ' | b'(' | b')' | b'"' | b'{' | b']' => break,
                b if b < 0x20 || b == 0x7f => break,
                _ => self.pos += 1,
            }
        }
        if self.pos == start {
            return Err(self.error("expected atom"));
        }
        let input = self.input;
        std::str::from_utf8(&input[start..self.pos]).map_err(|_| self.error("atom is not valid UTF-8"))
    }

    fn skip_section(&mut self) -> Result<(), ImapError> {
        let mut depth = 0usize;
        while let Some(b) = self.peek() {
            match b {
                b'[' => depth += 1,
                b']' => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        return Ok(());
                    }
                }
                b'"' => {
                    self.quoted()?;
                    continue;
                }
                b'\r' | b'\n' => break,
                _ => {}
            }
            self.pos += 1;
        }
        Err(self.error("unterminated section"))
    }

    fn number64(&mut self) -> Result<u64, ImapError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected number"));
        }
        self.input[start..self.pos]
            .iter()
            .try_fold(0u64, |acc, &d| acc.checked_mul(10)?.checked_add(u64::from(d - b'0')))
            .ok_or_else(|| self.error("number out of range"))
    }

    fn number(&mut self) -> Result<u32, ImapError> {
        let n = self.number64()?;
        u32::try_from(n).map_err(|_| self.error("number out of range"))
    }

    fn quoted(&mut self) -> Result<Vec<u8>, ImapError> {
        self.expect(b'"')?;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'\r') | Some(b'\n') => return Err(self.error("unterminated quoted string")),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        None | Some(b'\r') | Some(b'\n') => {
                            return Err(self.error("unterminated quoted string"))
                        }
                        Some(c) => {
                            out.push(c);
                            self.pos += 1;
                        }
                    }
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn literal(&mut self) -> Result<Vec<u8>, ImapError> {
        self.expect(b'{')?;
        let size = usize::try_from(self.number64()?).map_err(|_| self.error("literal too large"))?;
        self.eat(b'+');
        self.expect(b'}')?;
        self.expect(b'\r')?;
        self.expect(b'\n')?;
        let end = self
            .pos
            .checked_add(size)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| self.error("literal runs past end of response"))?;
        let data = self.input[self.pos..end].to_vec();
        self.pos = end;
        Ok(data)
    }

    fn string(&mut self) -> Result<Vec<u8>, ImapError> {
        match self.peek() {
            Some(b'{') => self.literal(),
            _ => self.quoted(),
        }
    }

    fn astring(&mut self) -> Result<String, ImapError> {
        match self.peek() {
            Some(b'"') | Some(b'{') => Ok(String::from_utf8_lossy(&self.string()?).into_owned()),
            _ => Ok(self.atom()?.to_string()),
        }
    }

    fn nstring(&mut self) -> Result<Option<Vec<u8>>, ImapError> {
        match self.value(0)? {
            Value::Nil => Ok(None),
            Value::String(s) => Ok(Some(s)),
            _ => Err(self.error("expected string or NIL")),
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, ImapError> {
        match self.peek() {
            Some(b'(') => Ok(Value::List(self.list(depth)?)),
            Some(b'"') => Ok(Value::String(self.quoted()?)),
            Some(b'{') => Ok(Value::String(self.literal()?)),
            Some(b')') => Err(self.error("unbalanced parenthesis")),
            None => Err(self.error("unexpected end of response")),
            Some(_) => {
                let atom = self.atom()?;
                if atom.eq_ignore_ascii_case("NIL") {
                    Ok(Value::Nil)
                } else {
                    Ok(Value::Atom(atom.to_string()))
                }
            }
        }
    }

    fn list(&mut self, depth: usize) -> Result<Vec<Value>, ImapError> {
        if depth >= MAX_DEPTH {
            return Err(self.error("lists nested too deeply"));
        }
        self.expect(b'(')?;
        let mut items = Vec::new();
        loop {
            self.skip_spaces();
            match self.peek() {
                Some(b')') => {
                    self.pos += 1;
                    return Ok(items);
                }
                None => return Err(self.error("unbalanced parenthesis: list not closed")),
                Some(_) => items.push(self.value(depth + 1)?),
            }
        }
    }

    /// `(atom atom ...)`
    fn atom_list(&mut self) -> Result<Vec<String>, ImapError> {
        self.expect(b'(')?;
        let mut atoms = Vec::new();
        loop {
            self.skip_spaces();
            match self.peek() {
                Some(b')') => {
                    self.pos += 1;
                    return Ok(atoms);
                }
                None => return Err(self.error("unbalanced parenthesis: list not closed")),
                Some(_) => atoms.push(self.atom()?.to_string()),
            }
        }
    }

    fn flag_list(&mut self) -> Result<Vec<Flag>, ImapError> {
        Ok(self.atom_list()?.iter().map(|f| Flag::parse(f)).collect())
    }

    fn until_bracket(&mut self) -> Result<String, ImapError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b']' {
                return Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned());
            }
            self.pos += 1;
        }
        Err(self.error("unterminated response code"))
    }
}

fn tagged(c: &mut Cursor) -> Result<Tagged, ImapError> {
    let tag = c.atom()?.to_string();
    if tag.contains('+') {
        return Err(c.error(format!("invalid tag {:?}", tag)));
    }
    c.space()?;
    let keyword = c.atom()?;
    let status = match keyword.to_ascii_uppercase().as_str() {
        "OK" => Status::Ok,
        "NO" => Status::No,
        "BAD" => Status::Bad,
        _ => return Err(c.error(format!("unknown completion status {:?}", keyword))),
    };
    let (code, text) = status_tail(c)?;
    Ok(Tagged { tag, status, code, text })
}

fn status_tail(c: &mut Cursor) -> Result<(Option<ResponseCode>, String), ImapError> {
    if c.at_end() {
        return Ok((None, String::new()));
    }
    c.space()?;
    let code = if c.peek() == Some(b'[') {
        let code = response_code(c)?;
        c.skip_spaces();
        Some(code)
    } else {
        None
    };
    Ok((code, c.rest_text()))
}

fn response_code(c: &mut Cursor) -> Result<ResponseCode, ImapError> {
    c.expect(b'[')?;
    let name = c.atom()?.to_ascii_uppercase();
    let code = match name.as_str() {
        "ALERT" => ResponseCode::Alert,
        "PARSE" => ResponseCode::Parse,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "UIDNEXT" => {
            c.space()?;
            ResponseCode::UidNext(c.number()?)
        }
        "UIDVALIDITY" => {
            c.space()?;
            ResponseCode::UidValidity(c.number()?)
        }
        "UNSEEN" => {
            c.space()?;
            ResponseCode::Unseen(c.number()?)
        }
        "PERMANENTFLAGS" => {
            c.space()?;
            ResponseCode::PermanentFlags(c.flag_list()?)
        }
        "CAPABILITY" => {
            let mut capabilities = Vec::new();
            while c.skip_spaces() && c.peek() != Some(b']') {
                capabilities.push(c.atom()?.to_ascii_uppercase());
            }
            ResponseCode::Capability(capabilities)
        }
        _ => {
            let value = if c.skip_spaces() { Some(c.until_bracket()?) } else { None };
            ResponseCode::Other { name, value }
        }
    };
    c.expect(b']')?;
    Ok(code)
}

fn untagged(c: &mut Cursor) -> Result<Untagged, ImapError> {
    let response = if matches!(c.peek(), Some(b'0'..=b'9')) {
        let n = c.number()?;
        c.space()?;
        let keyword = c.atom()?.to_ascii_uppercase();
        match keyword.as_str() {
            "EXISTS" => Untagged::Exists(n),
            "RECENT" => Untagged::Recent(n),
            "EXPUNGE" => Untagged::Expunge(n),
            "FETCH" => {
                c.space()?;
                Untagged::Fetch { seq: n, items: fetch_items(c)? }
            }
            _ => {
                c.skip_spaces();
                Untagged::Other { keyword: format!("{} {}", n, keyword), text: c.rest_text() }
            }
        }
    } else {
        let keyword = c.atom()?.to_ascii_uppercase();
        match keyword.as_str() {
            "OK" | "NO" | "BAD" | "PREAUTH" | "BYE" => {
                let condition = match keyword.as_str() {
                    "OK" => Condition::Ok,
                    "NO" => Condition::No,
                    "BAD" => Condition::Bad,
                    "PREAUTH" => Condition::PreAuth,
                    _ => Condition::Bye,
                };
                let (code, text) = status_tail(c)?;
                Untagged::Status { condition, code, text }
            }
            "CAPABILITY" => {
                let mut capabilities = Vec::new();
                while c.skip_spaces() && !c.at_end() {
                    capabilities.push(c.atom()?.to_ascii_uppercase());
                }
                Untagged::Capability(capabilities)
            }
            "FLAGS" => {
                c.space()?;
                Untagged::Flags(c.flag_list()?)
            }
            "LIST" | "LSUB" => {
                c.space()?;
                let entry = list_entry(c)?;
                if keyword == "LIST" {
                    Untagged::List(entry)
                } else {
                    Untagged::Lsub(entry)
                }
            }
            "STATUS" => {
                c.space()?;
                let mailbox = mailbox_name::decode(&c.astring()?);
                c.space()?;
                Untagged::MailboxStatus { mailbox, items: status_items(c)? }
            }
            "SEARCH" => {
                let mut ids = Vec::new();
                while c.skip_spaces() && !c.at_end() {
                    if c.peek() == Some(b'(') {
                        // (MODSEQ n) trailer
                        c.list(0)?;
                    } else {
                        ids.push(c.number()?);
                    }
                }
                Untagged::Search(ids)
            }
            _ => {
                c.skip_spaces();
                Untagged::Other { keyword, text: c.rest_text() }
            }
        }
    };
    c.finish()?;
    Ok(response)
}

fn list_entry(c: &mut Cursor) -> Result<ListEntry, ImapError> {
    let attributes = c.atom_list()?;
    c.space()?;
    let delimiter = match c.value(0)? {
        Value::Nil => None,
        Value::String(d) => d.first().map(|&b| b as char),
        _ => return Err(c.error("expected hierarchy delimiter")),
    };
    c.space()?;
    let name = mailbox_name::decode(&c.astring()?);
    // LIST-EXTENDED data is not interpreted
    while c.skip_spaces() && !c.at_end() {
        c.value(0)?;
    }
    Ok(ListEntry { attributes, delimiter, name })
}

fn status_items(c: &mut Cursor) -> Result<Vec<StatusItem>, ImapError> {
    c.expect(b'(')?;
    let mut items = Vec::new();
    loop {
        c.skip_spaces();
        match c.peek() {
            Some(b')') => {
                c.pos += 1;
                return Ok(items);
            }
            None => return Err(c.error("unbalanced parenthesis: STATUS list not closed")),
            Some(_) => {}
        }
        let name = c.atom()?.to_ascii_uppercase();
        c.space()?;
        let value = c.number64()?;
        let value32 = u32::try_from(value);
        let item = match (name.as_str(), value32) {
            ("MESSAGES", Ok(n)) => StatusItem::Messages(n),
            ("RECENT", Ok(n)) => StatusItem::Recent(n),
            ("UIDNEXT", Ok(n)) => StatusItem::UidNext(n),
            ("UIDVALIDITY", Ok(n)) => StatusItem::UidValidity(n),
            ("UNSEEN", Ok(n)) => StatusItem::Unseen(n),
            _ => continue,
        };
        items.push(item);
    }
}

fn fetch_items(c: &mut Cursor) -> Result<Vec<FetchItem>, ImapError> {
    c.expect(b'(')?;
    let mut items = Vec::new();
    loop {
        c.skip_spaces();
        match c.peek() {
            Some(b')') => {
                c.pos += 1;
                return Ok(items);
            }
            None => return Err(c.error("unbalanced parenthesis: FETCH list not closed")),
            Some(_) => {}
        }
        let name = c.atom()?.to_string();
        c.space()?;
        items.push(fetch_item(c, &name)?);
    }
}

fn fetch_item(c: &mut Cursor, name: &str) -> Result<FetchItem, ImapError> {
    let upper = name.to_ascii_uppercase();
    let item = match upper.as_str() {
        "UID" => FetchItem::Uid(c.number()?),
        "FLAGS" => FetchItem::Flags(c.flag_list()?),
        "RFC822.SIZE" => FetchItem::Size(c.number()?),
        "INTERNALDATE" => {
            let raw = c.string()?;
            let date = parse_internal_date(&String::from_utf8_lossy(&raw))
                .ok_or_else(|| c.error("invalid INTERNALDATE"))?;
            FetchItem::InternalDate(date)
        }
        "ENVELOPE" => {
            let values = c.list(0)?;
            FetchItem::Envelope(Box::new(envelope(&values).map_err(|m| c.error(m))?))
        }
        "BODYSTRUCTURE" | "BODY" => {
            let values = c.list(0)?;
            FetchItem::BodyStructure(Box::new(body_structure(&values, 0).map_err(|m| c.error(m))?))
        }
        "RFC822" => section_item(c, "", None)?,
        "RFC822.HEADER" => section_item(c, "HEADER", None)?,
        "RFC822.TEXT" => section_item(c, "TEXT", None)?,
        _ if upper.starts_with("BODY[") || upper.starts_with("BINARY[") => {
            let (section, origin) =
                split_section(name).ok_or_else(|| c.error(format!("malformed section {:?}", name)))?;
            section_item(c, &section, origin)?
        }
        _ => FetchItem::Other { name: upper, value: c.value(0)? },
    };
    Ok(item)
}

fn section_item(c: &mut Cursor, section: &str, origin: Option<u32>) -> Result<FetchItem, ImapError> {
    Ok(FetchItem::Section {
        section: section.to_string(),
        origin,
        data: c.nstring()?,
    })
}

/// `BODY[1.2]<0>` -> (`1.2`, Some(0))
fn split_section(name: &str) -> Option<(String, Option<u32>)> {
    let open = name.find('[')?;
    let close = name.rfind(']')?;
    if close < open {
        return None;
    }
    let section = name[open + 1..close].to_string();
    let tail = &name[close + 1..];
    let origin = if tail.is_empty() {
        None
    } else {
        Some(tail.strip_prefix('<')?.strip_suffix('>')?.parse().ok()?)
    };
    Some((section, origin))
}

fn text(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Nil => Ok(None),
        Value::List(_) => Err("expected string, found list".to_string()),
        other => Ok(other.as_text()),
    }
}

fn required_text(value: Option<&Value>, what: &str) -> Result<String, String> {
    value
        .and_then(Value::as_text)
        .ok_or_else(|| format!("missing {}", what))
}

fn number(value: &Value, what: &str) -> Result<u32, String> {
    value.as_number().ok_or_else(|| format!("expected number for {}", what))
}

fn envelope(values: &[Value]) -> Result<Envelope, String> {
    if values.len() < 10 {
        return Err(format!("envelope has {} fields, expected 10", values.len()));
    }
    Ok(Envelope {
        date: text(&values[0])?,
        subject: text(&values[1])?,
        from: addresses(&values[2])?,
        sender: addresses(&values[3])?,
        reply_to: addresses(&values[4])?,
        to: addresses(&values[5])?,
        cc: addresses(&values[6])?,
        bcc: addresses(&values[7])?,
        in_reply_to: text(&values[8])?,
        message_id: text(&values[9])?,
    })
}

fn addresses(value: &Value) -> Result<Vec<Address>, String> {
    let items = match value {
        Value::Nil => return Ok(Vec::new()),
        Value::List(items) => items,
        _ => return Err("expected address list".to_string()),
    };
    items
        .iter()
        .map(|item| match item {
            Value::List(fields) if fields.len() == 4 => Ok(Address {
                name: text(&fields[0])?,
                adl: text(&fields[1])?,
                mailbox: text(&fields[2])?,
                host: text(&fields[3])?,
            }),
            _ => Err("malformed address".to_string()),
        })
        .collect()
}

fn parameters(value: &Value) -> Result<Vec<(String, String)>, String> {
    match value {
        Value::Nil => Ok(Vec::new()),
        Value::List(items) if items.len() % 2 == 0 => items
            .chunks_exact(2)
            .map(|pair| {
                let key = required_text(Some(&pair[0]), "parameter name")?;
                let value = required_text(Some(&pair[1]), "parameter value")?;
                Ok((key.to_ascii_lowercase(), value))
            })
            .collect(),
        _ => Err("malformed body parameter list".to_string()),
    }
}

fn disposition(value: Option<&Value>) -> Result<Option<Disposition>, String> {
    match value {
        None | Some(Value::Nil) => Ok(None),
        Some(Value::List(items)) if !items.is_empty() => Ok(Some(Disposition {
            kind: required_text(items.first(), "disposition type")?.to_ascii_lowercase(),
            parameters: items.get(1).map(parameters).transpose()?.unwrap_or_default(),
        })),
        _ => Err("malformed body disposition".to_string()),
    }
}

fn body_structure(values: &[Value], depth: usize) -> Result<BodyStructure, String> {
    if depth >= MAX_DEPTH {
        return Err("body structure nested too deeply".to_string());
    }
    match values.first() {
        None => Err("empty body structure".to_string()),
        Some(Value::List(_)) => {
            let mut children = Vec::new();
            let mut index = 0;
            while let Some(Value::List(child)) = values.get(index) {
                children.push(body_structure(child, depth + 1)?);
                index += 1;
            }
            let subtype = required_text(values.get(index), "multipart subtype")?;
            let parameters = values.get(index + 1).map(parameters).transpose()?.unwrap_or_default();
            let disposition = disposition(values.get(index + 2))?;
            Ok(BodyStructure::Multipart { subtype, children, parameters, disposition })
        }
        Some(_) => {
            if values.len() < 7 {
                return Err(format!("single-part body has {} fields, expected at least 7", values.len()));
            }
            let mut fields = BodyFields {
                media_type: MediaType::parse(&required_text(values.first(), "media type")?),
                subtype: required_text(values.get(1), "media subtype")?,
                parameters: parameters(&values[2])?,
                id: text(&values[3])?,
                description: text(&values[4])?,
                encoding: TransferEncoding::parse(&required_text(values.get(5), "transfer encoding")?),
                size: number(&values[6], "body size")?,
                md5: None,
                disposition: None,
            };
            let is_message = fields.media_type == MediaType::Message
                && (fields.subtype.eq_ignore_ascii_case("RFC822") || fields.subtype.eq_ignore_ascii_case("GLOBAL"));
            if is_message && values.len() >= 10 {
                let envelope = match &values[7] {
                    Value::List(items) => envelope(items)?,
                    _ => return Err("expected envelope in message/rfc822 part".to_string()),
                };
                let body = match &values[8] {
                    Value::List(items) => body_structure(items, depth + 1)?,
                    _ => return Err("expected body in message/rfc822 part".to_string()),
                };
                let lines = number(&values[9], "line count")?;
                extension(&mut fields, values, 10)?;
                Ok(BodyStructure::Message {
                    fields,
                    envelope: Box::new(envelope),
                    body: Box::new(body),
                    lines,
                })
            } else if fields.media_type == MediaType::Text {
                let lines = values.get(7).map(|v| number(v, "line count")).transpose()?;
                extension(&mut fields, values, 8)?;
                Ok(BodyStructure::Single { fields, lines })
            } else {
                extension(&mut fields, values, 7)?;
                Ok(BodyStructure::Single { fields, lines: None })
            }
        }
    }
}

/// Single-part extension data: md5, disposition; language and location are ignored.
fn extension(fields: &mut BodyFields, values: &[Value], index: usize) -> Result<(), String> {
    if let Some(md5) = values.get(index) {
        fields.md5 = text(md5)?;
    }
    fields.disposition = disposition(values.get(index + 1))?;
    Ok(())
}
