/*
 * body.rs
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

//! BODYSTRUCTURE tree, media types and transfer encodings.

use std::fmt;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use super::envelope::Envelope;
use super::error::ImapError;

/// MIME base64 bodies are wrapped and often lack padding.
const MIME_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Top-level media type. `numeric` gives the classic c-client body type codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaType {
    Text,
    Multipart,
    Message,
    Application,
    Audio,
    Image,
    Video,
    Other(String),
}

impl MediaType {
    pub fn parse(s: &str) -> MediaType {
        match s.to_ascii_lowercase().as_str() {
            "text" => MediaType::Text,
            "multipart" => MediaType::Multipart,
            "message" => MediaType::Message,
            "application" => MediaType::Application,
            "audio" => MediaType::Audio,
            "image" => MediaType::Image,
            "video" => MediaType::Video,
            _ => MediaType::Other(s.to_ascii_lowercase()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MediaType::Text => "text",
            MediaType::Multipart => "multipart",
            MediaType::Message => "message",
            MediaType::Application => "application",
            MediaType::Audio => "audio",
            MediaType::Image => "image",
            MediaType::Video => "video",
            MediaType::Other(s) => s,
        }
    }

    pub fn numeric(&self) -> u8 {
        match self {
            MediaType::Text => 0,
            MediaType::Multipart => 1,
            MediaType::Message => 2,
            MediaType::Application => 3,
            MediaType::Audio => 4,
            MediaType::Image => 5,
            MediaType::Video => 6,
            MediaType::Other(_) => 7,
        }
    }

    /// Display label: `Text`, `Multipart`, ... `Other`.
    pub fn label(&self) -> &'static str {
        match self {
            MediaType::Text => "Text",
            MediaType::Multipart => "Multipart",
            MediaType::Message => "Message",
            MediaType::Application => "Application",
            MediaType::Audio => "Audio",
            MediaType::Image => "Image",
            MediaType::Video => "Video",
            MediaType::Other(_) => "Other",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content-Transfer-Encoding of a leaf part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEncoding {
    SevenBit,
    EightBit,
    Binary,
    Base64,
    QuotedPrintable,
    Other(String),
}

impl TransferEncoding {
    pub fn parse(s: &str) -> TransferEncoding {
        match s.to_ascii_uppercase().as_str() {
            "7BIT" => TransferEncoding::SevenBit,
            "8BIT" => TransferEncoding::EightBit,
            "BINARY" => TransferEncoding::Binary,
            "BASE64" => TransferEncoding::Base64,
            "QUOTED-PRINTABLE" => TransferEncoding::QuotedPrintable,
            _ => TransferEncoding::Other(s.to_ascii_uppercase()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TransferEncoding::SevenBit => "7BIT",
            TransferEncoding::EightBit => "8BIT",
            TransferEncoding::Binary => "BINARY",
            TransferEncoding::Base64 => "BASE64",
            TransferEncoding::QuotedPrintable => "QUOTED-PRINTABLE",
            TransferEncoding::Other(s) => s,
        }
    }

    /// c-client encoding codes: 0 7BIT .. 5 OTHER.
    pub fn numeric(&self) -> u8 {
        match self {
            TransferEncoding::SevenBit => 0,
            TransferEncoding::EightBit => 1,
            TransferEncoding::Binary => 2,
            TransferEncoding::Base64 => 3,
            TransferEncoding::QuotedPrintable => 4,
            TransferEncoding::Other(_) => 5,
        }
    }

    /// Undo the transfer encoding of fetched part content.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>, ImapError> {
        match self {
            TransferEncoding::Base64 => {
                let compact: Vec<u8> = data.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect();
                MIME_BASE64
                    .decode(compact)
                    .map_err(|e| ImapError::protocol(format!("invalid base64 body: {}", e), &[]))
            }
            TransferEncoding::QuotedPrintable => Ok(decode_quoted_printable(data)),
            _ => Ok(data.to_vec()),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

/// Handles `=XX` and soft line breaks; a stray `=` is kept literally.
fn decode_quoted_printable(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    let mut i = 0;
    while i < src.len() {
        let b = src[i];
        if b != b'=' {
            out.push(b);
            i += 1;
            continue;
        }
        let high = src.get(i + 1).copied().and_then(hex_value);
        let low = src.get(i + 2).copied().and_then(hex_value);
        match (high, low, src.get(i + 1), src.get(i + 2)) {
            (Some(h), Some(l), _, _) => {
                out.push(h << 4 | l);
                i += 3;
            }
            (_, _, Some(b'\r'), Some(b'\n')) => i += 3,
            (_, _, Some(b'\n'), _) => i += 2,
            _ => {
                out.push(b);
                i += 1;
            }
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposition {
    /// `inline`, `attachment`, ...
    pub kind: String,
    pub parameters: Vec<(String, String)>,
}

/// Fields shared by every non-multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyFields {
    pub media_type: MediaType,
    pub subtype: String,
    pub parameters: Vec<(String, String)>,
    pub id: Option<String>,
    pub description: Option<String>,
    pub encoding: TransferEncoding,
    /// Size in octets of the encoded content.
    pub size: u32,
    pub md5: Option<String>,
    pub disposition: Option<Disposition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyStructure {
    /// A leaf. `lines` is present for text parts.
    Single { fields: BodyFields, lines: Option<u32> },
    /// message/rfc822 carrying its own envelope and structure.
    Message {
        fields: BodyFields,
        envelope: Box<Envelope>,
        body: Box<BodyStructure>,
        lines: u32,
    },
    Multipart {
        subtype: String,
        children: Vec<BodyStructure>,
        parameters: Vec<(String, String)>,
        disposition: Option<Disposition>,
    },
}

impl BodyStructure {
    pub fn media_type(&self) -> MediaType {
        match self {
            BodyStructure::Single { fields, .. } | BodyStructure::Message { fields, .. } => fields.media_type.clone(),
            BodyStructure::Multipart { .. } => MediaType::Multipart,
        }
    }

    pub fn subtype(&self) -> &str {
        match self {
            BodyStructure::Single { fields, .. } | BodyStructure::Message { fields, .. } => &fields.subtype,
            BodyStructure::Multipart { subtype, .. } => subtype,
        }
    }

    /// `text/plain`, `multipart/alternative`, ...
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.media_type(), self.subtype().to_ascii_lowercase())
    }

    pub fn fields(&self) -> Option<&BodyFields> {
        match self {
            BodyStructure::Single { fields, .. } | BodyStructure::Message { fields, .. } => Some(fields),
            BodyStructure::Multipart { .. } => None,
        }
    }

    /// Transfer encoding; multipart containers are 7BIT by definition.
    pub fn encoding(&self) -> TransferEncoding {
        self.fields()
            .map_or(TransferEncoding::SevenBit, |fields| fields.encoding.clone())
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        let parameters = match self {
            BodyStructure::Single { fields, .. } | BodyStructure::Message { fields, .. } => &fields.parameters,
            BodyStructure::Multipart { parameters, .. } => parameters,
        };
        parameters
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, BodyStructure::Multipart { .. })
    }

    pub fn children(&self) -> &[BodyStructure] {
        match self {
            BodyStructure::Multipart { children, .. } => children,
            _ => &[],
        }
    }

    /// Leaf parts with their IMAP part numbers, depth first.
    /// An attached message counts as one leaf.
    pub fn leaves(&self) -> Vec<(String, &BodyStructure)> {
        let mut out = Vec::new();
        collect_leaves(self, String::new(), &mut out);
        out
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            BodyStructure::Multipart { children, .. } => children.iter().map(BodyStructure::leaf_count).sum(),
            _ => 1,
        }
    }

    /// Resolve a part number such as `1.2`. A single-part message answers to `1`.
    pub fn find_part(&self, path: &str) -> Option<&BodyStructure> {
        let mut node = self;
        for (depth, segment) in path.split('.').enumerate() {
            let index: usize = segment.parse().ok()?;
            let index = index.checked_sub(1)?;
            node = match node {
                BodyStructure::Multipart { children, .. } => children.get(index)?,
                BodyStructure::Message { body, .. } => match body.as_ref() {
                    BodyStructure::Multipart { children, .. } => children.get(index)?,
                    single if index == 0 => single,
                    _ => return None,
                },
                BodyStructure::Single { .. } if depth == 0 && index == 0 => node,
                BodyStructure::Single { .. } => return None,
            };
        }
        Some(node)
    }
}

fn collect_leaves<'a>(node: &'a BodyStructure, prefix: String, out: &mut Vec<(String, &'a BodyStructure)>) {
    match node {
        BodyStructure::Multipart { children, .. } => {
            for (i, child) in children.iter().enumerate() {
                let path = if prefix.is_empty() {
                    (i + 1).to_string()
                } else {
                    format!("{}.{}", prefix, i + 1)
                };
                collect_leaves(child, path, out);
            }
        }
        _ => {
            let path = if prefix.is_empty() { "1".to_string() } else { prefix };
            out.push((path, node));
        }
    }
}
