//! Cross-reference reader.
//!
//! The xref maps object numbers to byte offsets (or object-stream slots).
//! Both classic tables (`xref ... trailer`) and cross-reference streams
//! (`/Type /XRef`) are read, and the `/Prev` chain left by incremental
//! updates is followed back to the original section. Newer sections win.
//!
//! The kind of the most recent section matters when appending: a classic
//! table must be followed by a classic table, a stream by a stream.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use crate::parser::{describe_nom_error, parse_indirect_object, parse_object, trim_start};
use std::collections::{HashMap, HashSet};

/// Maximum number of chained xref sections.
const MAX_PREV_DEPTH: u32 = 100;

/// Upper bound on entries in one classic subsection.
const MAX_SUBSECTION_COUNT: u64 = 1_000_000;

/// Trailer keys carried forward from older sections when the newest omits them.
const INHERITED_TRAILER_KEYS: &[&str] = &["Root", "Info", "ID", "Encrypt", "Size"];

/// Cross-reference table entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntryType {
    /// Entry for a free object
    Free,
    /// Object stored at a byte offset
    Uncompressed,
    /// Object stored inside an object stream
    Compressed,
}

/// Cross-reference table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XRefEntry {
    /// Type of entry
    pub entry_type: XRefEntryType,
    /// Byte offset (uncompressed) or object stream number (compressed)
    pub offset: u64,
    /// Generation number (uncompressed) or index within the stream (compressed)
    pub generation: u16,
}

impl XRefEntry {
    /// Object at a byte offset.
    pub fn uncompressed(offset: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Uncompressed,
            offset,
            generation,
        }
    }

    /// Object `index_in_stream` inside object stream `stream_obj_num`.
    pub fn compressed(stream_obj_num: u64, index_in_stream: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Compressed,
            offset: stream_obj_num,
            generation: index_in_stream,
        }
    }

    /// Free entry.
    pub fn free(next_free: u64, generation: u16) -> Self {
        Self {
            entry_type: XRefEntryType::Free,
            offset: next_free,
            generation,
        }
    }

    /// Whether the entry points at a live object.
    pub fn in_use(&self) -> bool {
        self.entry_type != XRefEntryType::Free
    }
}

/// Merged view over every xref section of a document.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: HashMap<u32, XRefEntry>,
    trailer: Dictionary,
    last_section_is_stream: bool,
}

impl CrossRefTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merged trailer: the newest section's dictionary plus inherited keys.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Replace the trailer dictionary.
    pub(crate) fn set_trailer(&mut self, trailer: Dictionary) {
        self.trailer = trailer;
    }

    /// Add an entry, replacing any previous one.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Get an entry by object number.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// Object numbers with a live entry.
    pub fn in_use_object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.in_use())
            .map(|(num, _)| *num)
    }

    /// Whether the most recent section is a cross-reference stream.
    pub fn last_section_is_stream(&self) -> bool {
        self.last_section_is_stream
    }

    /// Number of object slots: the larger of /Size and the highest entry + 1.
    pub fn size(&self) -> u32 {
        let declared = self
            .trailer
            .get("Size")
            .and_then(|o| o.as_integer())
            .unwrap_or(0)
            .clamp(0, u32::MAX as i64) as u32;
        let highest = self.entries.keys().max().map(|n| n.saturating_add(1)).unwrap_or(0);
        declared.max(highest)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge an older section; entries and trailer keys already present win.
    fn merge_older(&mut self, older: CrossRefTable) {
        for (num, entry) in older.entries {
            self.entries.entry(num).or_insert(entry);
        }
        for key in INHERITED_TRAILER_KEYS {
            if let Some(value) = older.trailer.get(*key) {
                self.trailer
                    .entry((*key).to_string())
                    .or_insert_with(|| value.clone());
            }
        }
    }
}

/// Locate the offset after the last `startxref` keyword.
pub fn find_xref_offset(data: &[u8]) -> Result<u64> {
    let tail_start = data.len().saturating_sub(2048);
    let tail = &data[tail_start..];
    let keyword = b"startxref";
    let pos = tail
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or(Error::InvalidXref)?;

    let (digits, _) = read_digits(trim_start(&tail[pos + keyword.len()..]))
        .ok_or(Error::InvalidXref)?;
    if digits as usize >= data.len() {
        log::warn!("startxref {} points past end of file ({} bytes)", digits, data.len());
        return Err(Error::InvalidXref);
    }
    Ok(digits)
}

/// Read the xref at `offset` and every section reachable through /Prev.
pub fn parse_xref(data: &[u8], offset: u64) -> Result<CrossRefTable> {
    let mut visited = HashSet::new();
    parse_xref_chain(data, offset, 0, &mut visited)
}

fn parse_xref_chain(
    data: &[u8],
    offset: u64,
    depth: u32,
    visited: &mut HashSet<u64>,
) -> Result<CrossRefTable> {
    if depth > MAX_PREV_DEPTH {
        return Err(Error::InvalidPdf(format!(
            "xref /Prev chain depth exceeded {}",
            MAX_PREV_DEPTH
        )));
    }
    if !visited.insert(offset) {
        return Err(Error::InvalidPdf(format!("xref /Prev chain loops at offset {}", offset)));
    }

    let section = data
        .get(offset as usize..)
        .map(trim_start)
        .ok_or(Error::InvalidXref)?;

    let mut xref = if section.starts_with(b"xref") {
        log::debug!("Classic xref section at offset {}", offset);
        let mut table = parse_classic_section(section)?;
        // Hybrid files list compressed objects in a side stream
        if let Some(stm_offset) = table.trailer.get("XRefStm").and_then(|o| o.as_integer()) {
            match parse_stream_section(data, stm_offset as u64) {
                Ok(side) => {
                    for (num, entry) in side.entries {
                        table.entries.entry(num).or_insert(entry);
                    }
                },
                Err(e) => log::warn!("Ignoring unreadable /XRefStm at {}: {}", stm_offset, e),
            }
        }
        table
    } else if section.first().is_some_and(|c| c.is_ascii_digit()) {
        log::debug!("Cross-reference stream at offset {}", offset);
        parse_stream_section(data, offset)?
    } else {
        return Err(Error::InvalidXref);
    };

    if let Some(prev) = xref.trailer.get("Prev").and_then(|o| o.as_integer()) {
        if prev < 0 {
            return Err(Error::InvalidPdf(format!("negative /Prev offset {}", prev)));
        }
        let older = parse_xref_chain(data, prev as u64, depth + 1, visited)?;
        xref.merge_older(older);
    }

    Ok(xref)
}

/// Parse `xref` subsections followed by `trailer << ... >>`.
///
/// ```text
/// xref
/// 0 3
/// 0000000000 65535 f
/// 0000000017 00000 n
/// 0000000081 00000 n
/// trailer
/// << /Size 3 /Root 1 0 R >>
/// ```
fn parse_classic_section(section: &[u8]) -> Result<CrossRefTable> {
    let mut xref = CrossRefTable::new();
    let mut rest = trim_start(&section[b"xref".len()..]);

    loop {
        if rest.starts_with(b"trailer") {
            let (_, trailer) = parse_object(&rest[b"trailer".len()..]).map_err(|e| {
                Error::InvalidPdf(format!("unreadable trailer: {}", describe_nom_error(&e)))
            })?;
            xref.trailer = match trailer {
                Object::Dictionary(dict) => dict,
                other => {
                    return Err(Error::InvalidObjectType {
                        expected: "Dictionary".to_string(),
                        found: other.type_name().to_string(),
                    })
                },
            };
            return Ok(xref);
        }

        let (start, after) = read_digits(rest).ok_or(Error::InvalidXref)?;
        let (count, after) = read_digits(trim_start(after)).ok_or(Error::InvalidXref)?;
        if count > MAX_SUBSECTION_COUNT {
            return Err(Error::InvalidPdf("xref subsection count exceeds limit".to_string()));
        }
        rest = trim_start(after);

        for i in 0..count {
            if rest.starts_with(b"trailer") {
                log::warn!("Expected {} entries but only found {} before trailer", count, i);
                break;
            }
            let (entry, after) = parse_classic_entry(rest).ok_or_else(|| {
                Error::InvalidPdf(format!("malformed xref entry {} of subsection {}", i, start))
            })?;
            let number = start
                .checked_add(i)
                .and_then(|n| u32::try_from(n).ok())
                .ok_or(Error::InvalidXref)?;
            xref.add_entry(number, entry);
            rest = trim_start(after);
        }
    }
}

/// `nnnnnnnnnn ggggg n|f`, tolerant of irregular spacing.
fn parse_classic_entry(input: &[u8]) -> Option<(XRefEntry, &[u8])> {
    let (offset, rest) = read_digits(input)?;
    let (generation, rest) = read_digits(trim_start(rest))?;
    let rest = trim_start(rest);
    let generation = u16::try_from(generation).unwrap_or(u16::MAX);
    let entry = match rest.first()? {
        b'n' | b'N' => XRefEntry::uncompressed(offset, generation),
        b'f' | b'F' => XRefEntry::free(offset, generation),
        _ => return None,
    };
    Some((entry, &rest[1..]))
}

fn read_digits(input: &[u8]) -> Option<(u64, &[u8])> {
    let len = input.iter().take_while(|c| c.is_ascii_digit()).count();
    if len == 0 {
        return None;
    }
    let text = std::str::from_utf8(&input[..len]).ok()?;
    Some((text.parse().ok()?, &input[len..]))
}

/// Parse a `/Type /XRef` stream object at `offset`.
fn parse_stream_section(data: &[u8], offset: u64) -> Result<CrossRefTable> {
    let input = data.get(offset as usize..).ok_or(Error::InvalidXref)?;
    let (_, (obj_ref, obj)) = parse_indirect_object(input).map_err(|e| Error::ParseError {
        offset: offset as usize,
        reason: format!("xref stream object: {}", describe_nom_error(&e)),
    })?;

    let dict = match &obj {
        Object::Stream { dict, .. } => dict.clone(),
        other => {
            return Err(Error::InvalidObjectType {
                expected: "Stream".to_string(),
                found: other.type_name().to_string(),
            })
        },
    };
    if let Some(kind) = dict.get("Type").and_then(|o| o.as_name()) {
        if kind != "XRef" {
            return Err(Error::InvalidPdf(format!(
                "object {} is /Type /{}, expected /XRef",
                obj_ref, kind
            )));
        }
    }

    let widths = field_widths(&dict)?;
    let entry_size: usize = widths.iter().sum();
    if entry_size == 0 {
        return Err(Error::InvalidPdf("xref stream /W sums to zero".to_string()));
    }

    let size = dict
        .get("Size")
        .and_then(|o| o.as_integer())
        .ok_or_else(|| Error::InvalidPdf("missing /Size in xref stream".to_string()))?;
    let ranges = index_ranges(&dict, size)?;
    let rows = obj.decode_stream_data()?;

    let mut xref = CrossRefTable::new();
    let mut pos = 0;
    for (start, count) in ranges {
        for i in 0..count {
            let Some(row) = rows.get(pos..pos + entry_size) else {
                return Err(Error::InvalidPdf("truncated xref stream data".to_string()));
            };
            pos += entry_size;

            let (t, rest) = row.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            // A zero-width type field defaults to type 1
            let entry_type = if widths[0] == 0 { 1 } else { read_be(t) };
            let field2 = read_be(f2);
            let field3 = read_be(f3);

            let entry = match entry_type {
                0 => XRefEntry::free(field2, field3.min(u16::MAX as u64) as u16),
                1 => XRefEntry::uncompressed(field2, field3.min(u16::MAX as u64) as u16),
                2 => XRefEntry::compressed(field2, field3.min(u16::MAX as u64) as u16),
                other => {
                    log::debug!("Skipping xref stream entry of unknown type {}", other);
                    continue;
                },
            };
            let Some(number) = start.checked_add(i) else {
                return Err(Error::InvalidXref);
            };
            xref.add_entry(number, entry);
        }
    }

    xref.trailer = dict;
    xref.last_section_is_stream = true;
    Ok(xref)
}

fn field_widths(dict: &Dictionary) -> Result<[usize; 3]> {
    let w = dict
        .get("W")
        .and_then(|o| o.as_array())
        .ok_or_else(|| Error::InvalidPdf("missing /W array in xref stream".to_string()))?;
    if w.len() != 3 {
        return Err(Error::InvalidPdf(format!("/W has {} entries, expected 3", w.len())));
    }
    let mut widths = [0usize; 3];
    for (slot, value) in widths.iter_mut().zip(w) {
        let width = value
            .as_integer()
            .filter(|v| (0..=8).contains(v))
            .ok_or_else(|| Error::InvalidPdf("invalid /W field width".to_string()))?;
        *slot = width as usize;
    }
    Ok(widths)
}

fn index_ranges(dict: &Dictionary, size: i64) -> Result<Vec<(u32, u32)>> {
    let Some(index) = dict.get("Index").and_then(|o| o.as_array()) else {
        return Ok(vec![(0, size.clamp(0, u32::MAX as i64) as u32)]);
    };
    index
        .chunks(2)
        .map(|pair| match pair {
            [start, count] => match (start.as_integer(), count.as_integer()) {
                (Some(s), Some(c)) if s >= 0 && c >= 0 => Ok((s as u32, c as u32)),
                _ => Err(Error::InvalidPdf("invalid /Index pair".to_string())),
            },
            _ => Err(Error::InvalidPdf("odd /Index length".to_string())),
        })
        .collect()
}

/// Big-endian unsigned integer of up to 8 bytes.
fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}
