//! Cross-reference reconstruction for damaged files.
//!
//! When `startxref` is missing or the chain it points at cannot be read,
//! the file is scanned for `N G obj` headers instead. Later headers win, so
//! the newest revision of every object is found. This is a read-only
//! fallback: verification can still inspect such files, but signing refuses
//! them because an incremental update needs a real `/Prev` offset.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use crate::parser::{parse_indirect_object, parse_object};
use crate::xref::{CrossRefTable, XRefEntry};
use lazy_static::lazy_static;

lazy_static! {
    /// `N G obj` headers
    static ref RE_OBJ_HEADER: regex::bytes::Regex =
        regex::bytes::Regex::new(r"(\d+)\s+(\d+)\s+obj\b").expect("object header pattern");

    /// `trailer <<`
    static ref RE_TRAILER: regex::bytes::Regex =
        regex::bytes::Regex::new(r"trailer\s*<<").expect("trailer pattern");
}

/// Rebuild an xref table and trailer by scanning the whole file.
pub fn reconstruct_xref(data: &[u8]) -> Result<CrossRefTable> {
    log::info!("Reconstructing cross-reference table by scanning {} bytes", data.len());

    let mut xref = CrossRefTable::new();
    let mut found = 0usize;

    for capture in RE_OBJ_HEADER.captures_iter(data) {
        let (Some(whole), Some(num), Some(gen)) = (capture.get(0), capture.get(1), capture.get(2))
        else {
            continue;
        };
        let (Some(num), Some(gen)) =
            (parse_ascii::<u32>(num.as_bytes()), parse_ascii::<u16>(gen.as_bytes()))
        else {
            log::debug!("Skipping unparsable object header at offset {}", whole.start());
            continue;
        };
        xref.add_entry(num, XRefEntry::uncompressed(whole.start() as u64, gen));
        found += 1;
    }

    if found == 0 {
        return Err(Error::InvalidPdf("no objects found while reconstructing xref".to_string()));
    }
    log::info!("Reconstructed xref with {} object headers", found);

    let trailer = scan_trailers(data).or_else(|| minimal_trailer(data, &xref)).ok_or_else(|| {
        Error::InvalidPdf("could not locate a catalog in reconstructed xref".to_string())
    })?;
    xref.set_trailer(trailer);
    Ok(xref)
}

fn parse_ascii<T: std::str::FromStr>(bytes: &[u8]) -> Option<T> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Merge every classic trailer in file order; later keys win.
fn scan_trailers(data: &[u8]) -> Option<Dictionary> {
    let mut merged: Option<Dictionary> = None;
    for m in RE_TRAILER.find_iter(data) {
        let input = &data[m.start() + b"trailer".len()..];
        match parse_object(input) {
            Ok((_, Object::Dictionary(dict))) => {
                merged.get_or_insert_with(Dictionary::new).extend(dict);
            },
            _ => log::debug!("Unreadable trailer at offset {}", m.start()),
        }
    }
    merged
        .map(|mut dict| {
            dict.remove("Prev");
            dict.remove("XRefStm");
            dict
        })
        .filter(|dict| dict.contains_key("Root"))
}

/// Build `<< /Root .. /Size .. >>` from the last catalog or xref stream found.
fn minimal_trailer(data: &[u8], xref: &CrossRefTable) -> Option<Dictionary> {
    let mut best: Option<(u64, Dictionary)> = None;

    for num in xref.in_use_object_numbers() {
        let Some(entry) = xref.get(num) else {
            continue;
        };
        let Some(input) = data.get(entry.offset as usize..) else {
            continue;
        };
        let Ok((_, (obj_ref, obj))) = parse_indirect_object(input) else {
            continue;
        };
        let Some(dict) = obj.as_dict() else {
            continue;
        };

        let candidate = match dict.get("Type").and_then(|o| o.as_name()) {
            Some("Catalog") => {
                let mut trailer = Dictionary::new();
                trailer.insert("Root".to_string(), Object::Reference(obj_ref));
                trailer
            },
            // An xref stream dictionary is itself a trailer
            Some("XRef") if dict.contains_key("Root") => dict
                .iter()
                .filter(|(k, _)| matches!(k.as_str(), "Root" | "Info" | "ID"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            _ => continue,
        };

        if best.as_ref().map_or(true, |(offset, _)| entry.offset > *offset) {
            best = Some((entry.offset, candidate));
        }
    }

    best.map(|(_, mut trailer)| {
        trailer.insert("Size".to_string(), Object::Integer(xref.size() as i64));
        trailer
    })
}
