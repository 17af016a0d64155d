//! Signature field discovery.
//!
//! Fields are found by walking the AcroForm field tree:
//!
//! ```text
//! Catalog /AcroForm -> /Fields [ ... ]
//!                         field /T (parent) /Kids [ field /T (child) /FT /Sig /V sig ]
//! ```
//!
//! Names are fully qualified (`parent.child`), `/FT` is inherited from
//! ancestors, and only fields whose `/V` is a signature dictionary are
//! reported. Results are ordered by the end of their byte range, which is
//! the order the signatures were applied in.

use super::types::SignatureField;
use crate::document::PdfDocument;
use crate::error::Result;
use crate::object::{Dictionary, Object, ObjectRef};
use std::collections::HashSet;

/// Deepest field tree accepted.
const MAX_FIELD_DEPTH: usize = 32;

/// A node of the field tree with its inherited state.
struct FieldNode {
    name: String,
    field_type: Option<String>,
    dict: Dictionary,
}

/// Collect every signed signature field, in revision order.
pub fn collect_fields(doc: &mut PdfDocument) -> Result<Vec<SignatureField>> {
    let mut fields = Vec::new();
    for node in walk_fields(doc)? {
        if node.field_type.as_deref() != Some("Sig") {
            continue;
        }
        let Some(value) = node.dict.get("V") else {
            log::debug!("Signature field '{}' is not signed yet", node.name);
            continue;
        };
        let sig = match doc.resolve_dict(value) {
            Ok(sig) => sig,
            Err(e) => {
                log::warn!("Signature field '{}' has an unreadable value: {}", node.name, e);
                continue;
            },
        };
        fields.push(signature_field(node.name, &sig));
    }

    fields.sort_by_key(|f| f.revision_end());
    log::debug!("Found {} signature fields", fields.len());
    Ok(fields)
}

/// Fully qualified names of every terminal field, signed or not.
pub fn field_names(doc: &mut PdfDocument) -> Result<Vec<String>> {
    Ok(walk_fields(doc)?.into_iter().map(|node| node.name).collect())
}

fn signature_field(name: String, sig: &Dictionary) -> SignatureField {
    let text = |key: &str| sig.get(key).and_then(|o| o.as_text());
    SignatureField {
        name,
        byte_range: sig
            .get("ByteRange")
            .and_then(|o| o.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_integer()).collect())
            .unwrap_or_default(),
        contents: sig
            .get("Contents")
            .and_then(|o| o.as_string())
            .map(|s| s.to_vec())
            .unwrap_or_default(),
        sub_filter: sig.get("SubFilter").and_then(|o| o.as_name()).map(str::to_string),
        reason: text("Reason"),
        location: text("Location"),
        contact_info: text("ContactInfo"),
        signer_name: text("Name"),
        signing_time: text("M"),
        signer_subject: None,
        identity: None,
    }
}

/// Terminal fields of the AcroForm, depth first in `/Fields` order.
fn walk_fields(doc: &mut PdfDocument) -> Result<Vec<FieldNode>> {
    let catalog = doc.catalog()?;
    let Some(acroform) = catalog.get("AcroForm") else {
        return Ok(Vec::new());
    };
    let acroform = doc.resolve_dict(acroform)?;
    let roots = match acroform.get("Fields") {
        Some(fields) => doc.resolve(fields)?,
        None => return Ok(Vec::new()),
    };
    let Some(roots) = roots.as_array() else {
        log::warn!("AcroForm /Fields is not an array");
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    let mut visited = HashSet::new();
    for root in roots {
        walk(doc, root, None, None, 0, &mut visited, &mut out);
    }
    Ok(out)
}

fn walk(
    doc: &mut PdfDocument,
    obj: &Object,
    parent_name: Option<&str>,
    inherited_type: Option<&str>,
    depth: usize,
    visited: &mut HashSet<ObjectRef>,
    out: &mut Vec<FieldNode>,
) {
    if depth > MAX_FIELD_DEPTH {
        log::warn!("Field tree deeper than {} levels; ignoring the rest", MAX_FIELD_DEPTH);
        return;
    }
    if let Some(r) = obj.as_reference() {
        if !visited.insert(r) {
            log::warn!("Field {} visited twice; skipping", r);
            return;
        }
    }
    let dict = match doc.resolve_dict(obj) {
        Ok(dict) => dict,
        Err(e) => {
            log::warn!("Skipping unreadable field: {}", e);
            return;
        },
    };

    let partial = dict.get("T").and_then(|t| t.as_text());
    let name = match (parent_name, partial.as_deref()) {
        (Some(parent), Some(own)) => format!("{}.{}", parent, own),
        (None, Some(own)) => own.to_string(),
        (Some(parent), None) => parent.to_string(),
        (None, None) => String::new(),
    };
    let field_type = dict
        .get("FT")
        .and_then(|o| o.as_name())
        .or(inherited_type)
        .map(str::to_string);

    // Kids without /T are widgets of this field, not child fields
    let child_fields: Vec<Object> = dict
        .get("Kids")
        .and_then(|k| doc.resolve(k).ok())
        .and_then(|k| k.as_array().cloned())
        .unwrap_or_default()
        .into_iter()
        .filter(|kid| {
            doc.resolve_dict(kid)
                .map(|d| d.contains_key("T"))
                .unwrap_or(false)
        })
        .collect();

    if child_fields.is_empty() {
        out.push(FieldNode {
            name,
            field_type,
            dict,
        });
        return;
    }
    for kid in &child_fields {
        walk(doc, kid, Some(&name), field_type.as_deref(), depth + 1, visited, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Classic-xref PDF from numbered object bodies.
    fn build_pdf(objects: &[&str]) -> Vec<u8> {
        let mut pdf = b"%PDF-1.7\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref = pdf.len();
        pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for offset in offsets {
            pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref
            )
            .as_bytes(),
        );
        pdf
    }

    #[test]
    fn test_no_acroform() {
        let pdf = build_pdf(&["<< /Type /Catalog >>"]);
        let mut doc = PdfDocument::from_bytes(pdf).unwrap();
        assert!(collect_fields(&mut doc).unwrap().is_empty());
        assert!(field_names(&mut doc).unwrap().is_empty());
    }

    #[test]
    fn test_signed_and_unsigned_fields() {
        let pdf = build_pdf(&[
            "<< /Type /Catalog /AcroForm << /Fields [2 0 R 3 0 R 5 0 R] >> >>",
            "<< /FT /Sig /T (Signature2) /V 4 0 R >>",
            "<< /FT /Sig /T (Empty) >>",
            "<< /Type /Sig /SubFilter /adbe.pkcs7.detached /ByteRange [0 10 30 5] /Contents <3082> /Reason (Approved) /M (D:20240101000000Z) >>",
            "<< /FT /Tx /T (Text) /V (hello) >>",
        ]);
        let mut doc = PdfDocument::from_bytes(pdf).unwrap();
        let fields = collect_fields(&mut doc).unwrap();
        assert_eq!(fields.len(), 1);
        let field = &fields[0];
        assert_eq!(field.name, "Signature2");
        assert_eq!(field.byte_range(), Some([0, 10, 30, 5]));
        assert_eq!(field.contents, vec![0x30, 0x82]);
        assert_eq!(field.reason.as_deref(), Some("Approved"));
        assert_eq!(field.sub_filter.as_deref(), Some("adbe.pkcs7.detached"));

        let names = field_names(&mut doc).unwrap();
        assert_eq!(names, vec!["Signature2", "Empty", "Text"]);
    }

    #[test]
    fn test_hierarchical_names_and_inherited_type() {
        let pdf = build_pdf(&[
            "<< /Type /Catalog /AcroForm 2 0 R >>",
            "<< /Fields 3 0 R >>",
            "[4 0 R]",
            "<< /T (approvals) /FT /Sig /Kids [5 0 R] >>",
            "<< /T (manager) /Parent 4 0 R /V << /ByteRange [0 1 3 1] /Contents <00> >> >>",
        ]);
        let mut doc = PdfDocument::from_bytes(pdf).unwrap();
        let fields = collect_fields(&mut doc).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "approvals.manager");
    }

    #[test]
    fn test_widget_kids_are_not_fields() {
        let pdf = build_pdf(&[
            "<< /Type /Catalog /AcroForm << /Fields [2 0 R] >> >>",
            "<< /T (Sig) /FT /Sig /V << /ByteRange [0 1 3 1] /Contents <00> >> /Kids [3 0 R] >>",
            "<< /Type /Annot /Subtype /Widget /Parent 2 0 R >>",
        ]);
        let mut doc = PdfDocument::from_bytes(pdf).unwrap();
        let fields = collect_fields(&mut doc).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "Sig");
    }

    #[test]
    fn test_sorted_by_revision() {
        let pdf = build_pdf(&[
            "<< /Type /Catalog /AcroForm << /Fields [2 0 R 3 0 R] >> >>",
            "<< /FT /Sig /T (Later) /V << /ByteRange [0 10 40 60] /Contents <00> >> >>",
            "<< /FT /Sig /T (Earlier) /V << /ByteRange [0 10 20 10] /Contents <00> >> >>",
        ]);
        let mut doc = PdfDocument::from_bytes(pdf).unwrap();
        let names: Vec<_> = collect_fields(&mut doc).unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["Earlier", "Later"]);
    }

    #[test]
    fn test_cyclic_kids_terminate() {
        let pdf = build_pdf(&[
            "<< /Type /Catalog /AcroForm << /Fields [2 0 R] >> >>",
            "<< /T (loop) /FT /Sig /Kids [2 0 R] >>",
        ]);
        let mut doc = PdfDocument::from_bytes(pdf).unwrap();
        assert!(collect_fields(&mut doc).is_ok());
    }
}
