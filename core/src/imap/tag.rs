/*
 * tag.rs
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

//! Per-connection command tags.

/// Issues `A0001`, `A0002`, ... The counter widens past four digits and never
/// wraps, so a tag is never reused on one connection.
#[derive(Debug, Clone)]
pub struct TagAllocator {
    prefix: char,
    next: u64,
}

impl TagAllocator {
    pub fn new() -> Self {
        Self::with_prefix('A')
    }

    pub fn with_prefix(prefix: char) -> Self {
        TagAllocator { prefix, next: 1 }
    }

    pub fn next_tag(&mut self) -> String {
        let n = self.next;
        self.next += 1;
        format!("{}{:04}", self.prefix, n)
    }

    /// Number of tags issued so far.
    pub fn issued(&self) -> u64 {
        self.next - 1
    }
}

impl Default for TagAllocator {
    fn default() -> Self {
        Self::new()
    }
}
