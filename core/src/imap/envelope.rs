/*
 * envelope.rs
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

//! ENVELOPE data and RFC 5322 address helpers.

use std::fmt;

/// Parsed FETCH ENVELOPE. Header strings are as the server sent them
/// (RFC 2047 encoded words are not decoded).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    pub date: Option<String>,
    pub subject: Option<String>,
    pub from: Vec<Address>,
    pub sender: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub in_reply_to: Option<String>,
    pub message_id: Option<String>,
}

/// One address from an ENVELOPE list, or from [`Address::parse_list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    /// Display name (personal part).
    pub name: Option<String>,
    /// Source route, obsolete.
    pub adl: Option<String>,
    pub mailbox: Option<String>,
    pub host: Option<String>,
}

impl Address {
    pub fn new(name: Option<&str>, mailbox: &str, host: &str) -> Self {
        Address {
            name: name.map(str::to_string),
            adl: None,
            mailbox: Some(mailbox.to_string()),
            host: (!host.is_empty()).then(|| host.to_string()),
        }
    }

    /// `mailbox@host`, or `None` for group markers.
    pub fn email(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(mailbox), Some(host)) => Some(format!("{}@{}", mailbox, host)),
            _ => None,
        }
    }

    /// Start of an RFC 822 group: mailbox holds the group name, host is NIL.
    pub fn is_group_start(&self) -> bool {
        self.host.is_none() && self.mailbox.is_some()
    }

    pub fn is_group_end(&self) -> bool {
        self.host.is_none() && self.mailbox.is_none()
    }

    pub fn to_rfc822(&self) -> String {
        format_address(
            self.mailbox.as_deref().unwrap_or_default(),
            self.host.as_deref().unwrap_or_default(),
            self.name.as_deref(),
        )
    }

    /// Parse a header-style address list: `"Doe, Jane" <jane@example.org>, bob@example.net (Bob)`.
    /// Group syntax is flattened; entries without a mailbox are skipped.
    pub fn parse_list(input: &str) -> Vec<Address> {
        split_unquoted(input).into_iter().filter_map(parse_address).collect()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc822())
    }
}

/// `Personal Name <mailbox@host>`, or the bare address when there is no name.
/// The name is quoted when it contains RFC 5322 specials.
pub fn format_address(mailbox: &str, host: &str, personal: Option<&str>) -> String {
    let addr = if host.is_empty() {
        mailbox.to_string()
    } else {
        format!("{}@{}", mailbox, host)
    };
    match personal.map(str::trim) {
        Some(name) if !name.is_empty() => {
            if name.chars().any(|c| "()<>@,;:\\\".[]".contains(c)) {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\" <{}>", escaped, addr)
            } else {
                format!("{} <{}>", name, addr)
            }
        }
        _ => addr,
    }
}

fn split_unquoted(input: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    let mut comment = 0usize;
    let mut angle = 0usize;
    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted || comment > 0 => escaped = true,
            '"' if comment == 0 => quoted = !quoted,
            '(' if !quoted => comment += 1,
            ')' if !quoted && comment > 0 => comment -= 1,
            '<' if !quoted && comment == 0 => angle += 1,
            '>' if !quoted && comment == 0 && angle > 0 => angle -= 1,
            ',' | ';' if !quoted && comment == 0 && angle == 0 => {
                entries.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&input[start..]);
    entries
}

fn parse_address(entry: &str) -> Option<Address> {
    let mut entry = entry.trim();
    if let Some(colon) = find_unquoted(entry, ':') {
        let head = &entry[..colon];
        if !head.contains('@') && !head.contains('<') {
            entry = entry[colon + 1..].trim();
        }
    }
    if entry.is_empty() {
        return None;
    }
    let (name, addr) = match find_unquoted(entry, '<') {
        Some(open) => {
            let close = entry[open..].find('>').map_or(entry.len(), |i| open + i);
            (phrase(&entry[..open]), entry[open + 1..close].trim().to_string())
        }
        None => split_comment(entry),
    };
    let (mailbox, host) = match addr.rfind('@') {
        Some(at) => (unquote(&addr[..at]), Some(addr[at + 1..].to_string())),
        None => (unquote(&addr), None),
    };
    if mailbox.is_empty() {
        return None;
    }
    Some(Address {
        name,
        adl: None,
        mailbox: Some(mailbox),
        host,
    })
}

fn find_unquoted(s: &str, target: char) -> Option<usize> {
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' && quoted {
            escaped = true;
        } else if c == '"' {
            quoted = !quoted;
        } else if c == target && !quoted {
            return Some(i);
        }
    }
    None
}

/// `addr (Comment)` -> (comment as name, addr)
fn split_comment(entry: &str) -> (Option<String>, String) {
    match (find_unquoted(entry, '('), entry.rfind(')')) {
        (Some(open), Some(close)) if close > open => {
            let comment = entry[open + 1..close].trim();
            let addr = format!("{}{}", &entry[..open], &entry[close + 1..]);
            let name = (!comment.is_empty()).then(|| comment.to_string());
            (name, addr.trim().to_string())
        }
        _ => (None, entry.to_string()),
    }
}

fn phrase(s: &str) -> Option<String> {
    let s = unquote(s.trim());
    (!s.is_empty()).then_some(s)
}

fn unquote(s: &str) -> String {
    match s.strip_prefix('"').and_then(|inner| inner.strip_suffix('"')) {
        Some(inner) => {
            let mut out = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => out.extend(chars.next()),
                    c => out.push(c),
                }
            }
            out
        }
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_address() {
        assert_eq!(
            format_address("testusername", "samplehost.com", Some("TestFirst TestLastName")),
            "TestFirst TestLastName <testusername@samplehost.com>"
        );
        assert_eq!(format_address("bob", "example.net", None), "bob@example.net");
        assert_eq!(format_address("jane", "x.org", Some("Doe, Jane")), "\"Doe, Jane\" <jane@x.org>");
    }

    #[test]
    fn test_parse_list() {
        let list = Address::parse_list("\"Doe, Jane\" <jane@x.org>, bob@y.net (Bob), John Doe <johndoe@sample.com>");
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].name.as_deref(), Some("Doe, Jane"));
        assert_eq!(list[0].email().as_deref(), Some("jane@x.org"));
        assert_eq!(list[1].name.as_deref(), Some("Bob"));
        assert_eq!(list[1].mailbox.as_deref(), Some("bob"));
        assert_eq!(list[2].host.as_deref(), Some("sample.com"));
    }

    #[test]
    fn test_parse_list_flattens_groups() {
        let list = Address::parse_list("Team: a@example.com, b@example.com;, undisclosed-recipients:;");
        let emails: Vec<String> = list.iter().filter_map(Address::email).collect();
        assert_eq!(emails, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn test_group_markers() {
        let start = Address { mailbox: Some("team".into()), ..Default::default() };
        assert!(start.is_group_start());
        assert!(Address::default().is_group_end());
        assert_eq!(start.email(), None);
    }
}
