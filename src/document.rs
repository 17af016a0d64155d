//! PDF document model.
//!
//! A [`PdfDocument`] owns the complete file bytes. Signing needs them anyway
//! (the incremental update is appended to the original bytes, and the
//! digest runs over the whole output), so objects are parsed straight out of
//! the buffer instead of through a seekable reader.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::objstm::parse_object_stream;
use crate::parser::{describe_nom_error, parse_indirect_object};
use crate::xref::{find_xref_offset, parse_xref, CrossRefTable, XRefEntryType};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Maximum recursion depth for object resolution
const MAX_RECURSION_DEPTH: u32 = 100;

/// Maximum page tree depth walked when looking for the first page.
const MAX_PAGE_TREE_DEPTH: usize = 64;

/// A parsed PDF file.
///
/// # Example
///
/// ```no_run
/// use pdf_seal::document::PdfDocument;
///
/// let mut doc = PdfDocument::open("contract.pdf")?;
/// println!("PDF version: {}.{}", doc.version().0, doc.version().1);
/// let catalog = doc.catalog()?;
/// println!("AcroForm present: {}", catalog.contains_key("AcroForm"));
/// # Ok::<(), pdf_seal::error::Error>(())
/// ```
pub struct PdfDocument {
    /// Complete file contents
    data: Vec<u8>,
    /// PDF version (major, minor)
    version: (u8, u8),
    /// Merged cross-reference table
    xref: CrossRefTable,
    /// Offset named by the final `startxref`; `None` when the xref was rebuilt
    startxref: Option<u64>,
    /// Cache for loaded objects
    object_cache: HashMap<ObjectRef, Object>,
    /// Objects currently being loaded (cycle detection)
    resolving_stack: HashSet<ObjectRef>,
    /// Current recursion depth
    recursion_depth: u32,
}

impl std::fmt::Debug for PdfDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfDocument")
            .field("version", &self.version)
            .field("size", &self.data.len())
            .field("xref_entries", &self.xref.len())
            .field("startxref", &self.startxref)
            .field("cached_objects", &self.object_cache.len())
            .finish_non_exhaustive()
    }
}

impl PdfDocument {
    /// Open a PDF document from a file path.
    ///
    /// Any failure to read the file is reported as [`Error::InputNotFound`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            log::debug!("Cannot read {}: {}", path.display(), e);
            Error::InputNotFound(path.to_path_buf())
        })?;
        Self::from_bytes(data)
    }

    /// Parse a PDF held in memory.
    ///
    /// Falls back to scanning for object headers when the cross-reference
    /// chain is missing or unreadable. Such documents can be inspected but
    /// not incrementally updated (see [`PdfDocument::startxref`]).
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let version = parse_header(&data)?;

        let (xref, startxref) = match Self::read_xref_chain(&data) {
            Ok((xref, offset)) if !xref.is_empty() => (xref, Some(offset)),
            Ok(_) => {
                log::warn!("Cross-reference table is empty, attempting reconstruction");
                (crate::xref_reconstruction::reconstruct_xref(&data)?, None)
            },
            Err(e) => {
                log::warn!("Cross-reference parsing failed: {}, attempting reconstruction", e);
                match crate::xref_reconstruction::reconstruct_xref(&data) {
                    Ok(xref) => (xref, None),
                    Err(recon_err) => {
                        log::error!("Cross-reference reconstruction also failed: {}", recon_err);
                        return Err(e);
                    },
                }
            },
        };

        Ok(Self {
            data,
            version,
            xref,
            startxref,
            object_cache: HashMap::new(),
            resolving_stack: HashSet::new(),
            recursion_depth: 0,
        })
    }

    fn read_xref_chain(data: &[u8]) -> Result<(CrossRefTable, u64)> {
        let offset = find_xref_offset(data)?;
        Ok((parse_xref(data, offset)?, offset))
    }

    /// PDF version from the header.
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Complete file contents.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the document, returning the file contents.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Merged trailer dictionary.
    pub fn trailer(&self) -> &Dictionary {
        self.xref.trailer()
    }

    /// Offset of the most recent xref section, if the chain was readable.
    pub fn startxref(&self) -> Option<u64> {
        self.startxref
    }

    /// Whether the most recent xref section is a cross-reference stream.
    pub fn last_xref_is_stream(&self) -> bool {
        self.xref.last_section_is_stream()
    }

    /// First object number not used by any revision.
    pub fn next_object_number(&self) -> u32 {
        self.xref.size().max(1)
    }

    /// Whether the trailer declares an /Encrypt dictionary.
    pub fn is_encrypted(&self) -> bool {
        self.trailer().contains_key("Encrypt")
    }

    /// Load an indirect object.
    ///
    /// Objects are cached. Reference cycles are reported as
    /// [`Error::CircularReference`] and runaway nesting as
    /// [`Error::RecursionLimitExceeded`].
    pub fn load_object(&mut self, obj_ref: ObjectRef) -> Result<Object> {
        if let Some(cached) = self.object_cache.get(&obj_ref) {
            return Ok(cached.clone());
        }
        if self.recursion_depth >= MAX_RECURSION_DEPTH {
            log::error!("Recursion depth limit exceeded while loading object {}", obj_ref);
            return Err(Error::RecursionLimitExceeded(MAX_RECURSION_DEPTH));
        }
        if !self.resolving_stack.insert(obj_ref) {
            log::error!("Circular reference detected for object {}", obj_ref);
            return Err(Error::CircularReference(obj_ref));
        }

        self.recursion_depth += 1;
        let result = self.load_object_uncached(obj_ref);
        self.recursion_depth -= 1;
        self.resolving_stack.remove(&obj_ref);

        let obj = result?;
        self.object_cache.insert(obj_ref, obj.clone());
        Ok(obj)
    }

    fn load_object_uncached(&mut self, obj_ref: ObjectRef) -> Result<Object> {
        let entry = self
            .xref
            .get(obj_ref.id)
            .cloned()
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))?;

        match entry.entry_type {
            XRefEntryType::Uncompressed => {
                if entry.generation != obj_ref.gen {
                    log::debug!(
                        "Object {} requested with generation {}, xref has {}",
                        obj_ref.id,
                        obj_ref.gen,
                        entry.generation
                    );
                }
                self.load_uncompressed_object(obj_ref, entry.offset)
            },
            XRefEntryType::Compressed => self.load_compressed_object(obj_ref, entry.offset as u32),
            XRefEntryType::Free => Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen)),
        }
    }

    fn load_uncompressed_object(&self, obj_ref: ObjectRef, offset: u64) -> Result<Object> {
        let input = self
            .data
            .get(offset as usize..)
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))?;
        let (_, (found, obj)) = parse_indirect_object(input).map_err(|e| Error::ParseError {
            offset: offset as usize,
            reason: describe_nom_error(&e),
        })?;
        if found.id != obj_ref.id {
            log::warn!("xref offset {} for object {} holds object {}", offset, obj_ref, found);
            return Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen));
        }
        Ok(obj)
    }

    fn load_compressed_object(&mut self, obj_ref: ObjectRef, stream_obj_num: u32) -> Result<Object> {
        let stream = self.load_object(ObjectRef::new(stream_obj_num, 0))?;
        let objects = parse_object_stream(&stream)?;

        let requested = objects
            .get(&obj_ref.id)
            .cloned()
            .ok_or(Error::ObjectNotFound(obj_ref.id, obj_ref.gen))?;

        // Only cache members the xref still assigns to this stream; newer
        // revisions of the same numbers live elsewhere
        for (num, obj) in objects {
            let current = self.xref.get(num).is_some_and(|e| {
                e.entry_type == XRefEntryType::Compressed && e.offset == stream_obj_num as u64
            });
            if current && num != obj_ref.id {
                self.object_cache.insert(ObjectRef::new(num, 0), obj);
            }
        }

        Ok(requested)
    }

    /// Follow a reference, or clone a direct object.
    pub fn resolve(&mut self, obj: &Object) -> Result<Object> {
        match obj {
            Object::Reference(r) => self.load_object(*r),
            other => Ok(other.clone()),
        }
    }

    /// Resolve `obj` and require a dictionary (stream dictionaries included).
    pub fn resolve_dict(&mut self, obj: &Object) -> Result<Dictionary> {
        let resolved = self.resolve(obj)?;
        match resolved {
            Object::Dictionary(dict) => Ok(dict),
            Object::Stream { dict, .. } => Ok(dict),
            other => Err(Error::InvalidObjectType {
                expected: "Dictionary".to_string(),
                found: other.type_name().to_string(),
            }),
        }
    }

    /// Reference to the document catalog (/Root).
    pub fn catalog_ref(&self) -> Result<ObjectRef> {
        self.trailer()
            .get("Root")
            .ok_or_else(|| Error::InvalidPdf("Trailer missing /Root entry".to_string()))?
            .as_reference()
            .ok_or_else(|| Error::InvalidPdf("/Root is not a reference".to_string()))
    }

    /// The document catalog dictionary.
    pub fn catalog(&mut self) -> Result<Dictionary> {
        let root = self.catalog_ref()?;
        self.resolve_dict(&Object::Reference(root))
    }

    /// Reference to the first leaf of the page tree.
    pub fn first_page_ref(&mut self) -> Result<ObjectRef> {
        let catalog = self.catalog()?;
        let pages_ref = catalog
            .get("Pages")
            .and_then(|p| p.as_reference())
            .ok_or_else(|| Error::InvalidPdf("Catalog missing /Pages reference".to_string()))?;
        self.first_page_below(pages_ref, 0)?
            .ok_or_else(|| Error::InvalidPdf("Document has no pages".to_string()))
    }

    fn first_page_below(&mut self, node_ref: ObjectRef, depth: usize) -> Result<Option<ObjectRef>> {
        if depth > MAX_PAGE_TREE_DEPTH {
            return Err(Error::RecursionLimitExceeded(MAX_PAGE_TREE_DEPTH as u32));
        }
        let node = self.resolve_dict(&Object::Reference(node_ref))?;
        match node.get("Type").and_then(|t| t.as_name()) {
            Some("Page") => Ok(Some(node_ref)),
            _ => {
                // Untyped nodes with /Kids are treated as intermediate nodes
                let Some(kids) = node.get("Kids") else {
                    return Ok(None);
                };
                let kids = self.resolve(kids)?;
                for kid in kids.as_array().map(|k| k.as_slice()).unwrap_or_default() {
                    if let Some(kid_ref) = kid.as_reference() {
                        if let Some(page) = self.first_page_below(kid_ref, depth + 1)? {
                            return Ok(Some(page));
                        }
                    }
                }
                Ok(None)
            },
        }
    }
}

/// Parse the `%PDF-M.m` header.
///
/// The header may be preceded by up to 1024 bytes of junk, as readers
/// commonly tolerate.
///
/// ```
/// # use pdf_seal::document::parse_header;
/// assert_eq!(parse_header(b"%PDF-1.7\n").unwrap(), (1, 7));
/// assert!(parse_header(b"GIF89a").is_err());
/// ```
pub fn parse_header(data: &[u8]) -> Result<(u8, u8)> {
    let window = &data[..data.len().min(1024 + 8)];
    let start = window
        .windows(5)
        .position(|w| w == b"%PDF-")
        .ok_or_else(|| {
            Error::InvalidHeader(String::from_utf8_lossy(&data[..data.len().min(8)]).into_owned())
        })?;

    let version = &data[start + 5..];
    match version {
        [major, b'.', minor, ..] if major.is_ascii_digit() && minor.is_ascii_digit() => {
            if start > 0 {
                log::warn!("PDF header found at offset {} instead of 0", start);
            }
            Ok((major - b'0', minor - b'0'))
        },
        _ => Err(Error::InvalidHeader(
            String::from_utf8_lossy(&data[start..data.len().min(start + 8)]).into_owned(),
        )),
    }
}
