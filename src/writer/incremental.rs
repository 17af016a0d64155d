//! Incremental updates.
//!
//! New and replaced objects are appended after the original bytes, followed
//! by a cross-reference section chained to the previous one with `/Prev`.
//! The original bytes are never touched, so every earlier signature keeps
//! covering exactly what it covered before.
//!
//! The new section matches the kind of the last one: a classic table after a
//! classic table, a cross-reference stream after a stream.

use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::writer::ObjectSerializer;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;

/// Trailer entries copied from the previous revision.
const CARRIED_TRAILER_KEYS: &[&str] = &["Root", "Info", "ID"];

/// Body of an object in the update.
#[derive(Debug, Clone)]
pub enum UpdateBody {
    /// Serialized with [`ObjectSerializer`]
    Object(Object),
    /// Pre-formatted object body, written verbatim between `obj` and `endobj`
    Raw(Vec<u8>),
}

/// An incremental update being assembled against an existing document.
#[derive(Debug)]
pub struct IncrementalUpdate {
    prev_xref: u64,
    use_xref_stream: bool,
    next_id: u32,
    carried_trailer: Dictionary,
    objects: BTreeMap<u32, (u16, UpdateBody)>,
}

/// The bytes of a finished update.
#[derive(Debug)]
pub struct WrittenUpdate {
    /// Original document followed by the appended revision
    pub bytes: Vec<u8>,
    /// Byte offset of every object written in this revision
    pub offsets: HashMap<u32, u64>,
    /// Offset of the new cross-reference section
    pub xref_offset: u64,
}

impl IncrementalUpdate {
    /// Start an update on `doc`.
    ///
    /// Encrypted documents are refused, as are documents whose
    /// cross-reference chain had to be reconstructed: an update needs a
    /// genuine `/Prev` offset.
    pub fn new(doc: &PdfDocument) -> Result<Self> {
        if doc.is_encrypted() {
            return Err(Error::Unsupported(
                "incremental update of an encrypted document".to_string(),
            ));
        }
        let prev_xref = doc.startxref().ok_or_else(|| {
            Error::InvalidPdf("cross-reference chain is damaged; cannot append an update".to_string())
        })?;

        let carried_trailer = CARRIED_TRAILER_KEYS
            .iter()
            .filter_map(|key| doc.trailer().get(*key).map(|v| (key.to_string(), v.clone())))
            .collect();

        Ok(Self {
            prev_xref,
            use_xref_stream: doc.last_xref_is_stream(),
            next_id: doc.next_object_number(),
            carried_trailer,
            objects: BTreeMap::new(),
        })
    }

    /// Reserve a fresh object number.
    ///
    /// Fails once the object number space is exhausted, which only a
    /// trailer declaring a `/Size` near `u32::MAX` can cause.
    pub fn allocate(&mut self) -> Result<ObjectRef> {
        let id = self.next_id;
        self.next_id = id
            .checked_add(1)
            .ok_or_else(|| Error::InvalidPdf(format!("no object number left after {}", id)))?;
        Ok(ObjectRef::new(id, 0))
    }

    /// Add or replace an object.
    pub fn set_object(&mut self, obj_ref: ObjectRef, obj: Object) {
        self.objects.insert(obj_ref.id, (obj_ref.gen, UpdateBody::Object(obj)));
    }

    /// Add an object whose body is already formatted.
    pub fn set_raw(&mut self, obj_ref: ObjectRef, body: Vec<u8>) {
        self.objects.insert(obj_ref.id, (obj_ref.gen, UpdateBody::Raw(body)));
    }

    /// Whether the new section will be a cross-reference stream.
    pub fn uses_xref_stream(&self) -> bool {
        self.use_xref_stream
    }

    /// Append the update to `original` and return the combined bytes.
    pub fn write(mut self, original: &[u8]) -> Result<WrittenUpdate> {
        let serializer = ObjectSerializer::compact();
        let mut out = Vec::with_capacity(original.len() + 64 * 1024);
        out.extend_from_slice(original);
        if !out.ends_with(b"\n") && !out.ends_with(b"\r") {
            out.push(b'\n');
        }

        let mut offsets = HashMap::with_capacity(self.objects.len() + 1);
        for (&id, (gen, body)) in &self.objects {
            offsets.insert(id, out.len() as u64);
            match body {
                UpdateBody::Object(obj) => {
                    out.extend_from_slice(&serializer.serialize_indirect(id, *gen, obj));
                },
                UpdateBody::Raw(raw) => {
                    out.extend_from_slice(format!("{} {} obj\n", id, gen).as_bytes());
                    out.extend_from_slice(raw);
                    out.extend_from_slice(b"\nendobj\n");
                },
            }
        }

        let xref_offset = out.len() as u64;
        if self.use_xref_stream {
            let xref_ref = self.allocate()?;
            offsets.insert(xref_ref.id, xref_offset);
            let generations: HashMap<u32, u16> =
                self.objects.iter().map(|(id, (gen, _))| (*id, *gen)).collect();
            let stream = self.xref_stream(&offsets, &generations)?;
            out.extend_from_slice(&serializer.serialize_indirect(xref_ref.id, 0, &stream));
        } else {
            self.write_classic_xref(&mut out, &offsets, &serializer);
        }
        out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_offset).as_bytes());

        log::debug!(
            "Appended {} objects and a {} xref at offset {}",
            self.objects.len(),
            if self.use_xref_stream { "stream" } else { "classic" },
            xref_offset
        );

        Ok(WrittenUpdate {
            bytes: out,
            offsets,
            xref_offset,
        })
    }

    fn trailer_dict(&self) -> Dictionary {
        let mut trailer = self.carried_trailer.clone();
        trailer.insert("Size".to_string(), Object::Integer(self.next_id as i64));
        trailer.insert("Prev".to_string(), Object::Integer(self.prev_xref as i64));
        trailer
    }

    fn write_classic_xref(
        &self,
        out: &mut Vec<u8>,
        offsets: &HashMap<u32, u64>,
        serializer: &ObjectSerializer,
    ) {
        out.extend_from_slice(b"xref\n");
        let ids: Vec<u32> = self.objects.keys().copied().collect();
        for run in consecutive_runs(&ids) {
            out.extend_from_slice(format!("{} {}\n", run[0], run.len()).as_bytes());
            for id in run {
                let gen = self.objects.get(id).map(|(g, _)| *g).unwrap_or(0);
                let offset = offsets.get(id).copied().unwrap_or(0);
                // Each entry is exactly 20 bytes
                out.extend_from_slice(format!("{:010} {:05} n \n", offset, gen).as_bytes());
            }
        }
        out.extend_from_slice(b"trailer\n");
        serializer.write_object(out, &Object::Dictionary(self.trailer_dict()));
        out.push(b'\n');
    }

    /// Build the `/Type /XRef` stream covering this revision's objects.
    fn xref_stream(
        &self,
        offsets: &HashMap<u32, u64>,
        generations: &HashMap<u32, u16>,
    ) -> Result<Object> {
        let mut ids: Vec<u32> = offsets.keys().copied().collect();
        ids.sort_unstable();

        let max_offset = offsets.values().copied().max().unwrap_or(0);
        let offset_width = bytes_needed(max_offset);
        let widths = [1usize, offset_width, 2];

        let mut rows = Vec::with_capacity(ids.len() * widths.iter().sum::<usize>());
        for id in &ids {
            rows.push(1u8);
            let offset = offsets.get(id).copied().unwrap_or(0);
            rows.extend_from_slice(&offset.to_be_bytes()[8 - offset_width..]);
            let gen = generations.get(id).copied().unwrap_or(0);
            rows.extend_from_slice(&gen.to_be_bytes());
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&rows)?;
        let compressed = encoder.finish()?;

        let mut index = Vec::new();
        for run in consecutive_runs(&ids) {
            index.push(Object::Integer(run[0] as i64));
            index.push(Object::Integer(run.len() as i64));
        }

        let mut dict = self.trailer_dict();
        dict.insert("Type".to_string(), Object::Name("XRef".to_string()));
        dict.insert(
            "W".to_string(),
            Object::Array(widths.iter().map(|w| Object::Integer(*w as i64)).collect()),
        );
        dict.insert("Index".to_string(), Object::Array(index));
        dict.insert("Filter".to_string(), Object::Name("FlateDecode".to_string()));

        Ok(Object::Stream {
            dict,
            data: bytes::Bytes::from(compressed),
        })
    }
}

/// Split sorted ids into runs of consecutive numbers.
fn consecutive_runs(ids: &[u32]) -> Vec<&[u32]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=ids.len() {
        if i == ids.len() || ids[i] != ids[i - 1] + 1 {
            if start < i {
                runs.push(&ids[start..i]);
            }
            start = i;
        }
    }
    runs
}

fn bytes_needed(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}
