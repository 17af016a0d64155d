//! PDF writing.
//!
//! ```text
//! PdfDocument ──► IncrementalUpdate (new and replaced objects)
//!                      │
//!                      ▼
//!               ObjectSerializer ──► original bytes + appended revision
//! ```

mod incremental;
mod object_serializer;

pub use incremental::{IncrementalUpdate, UpdateBody, WrittenUpdate};
pub use object_serializer::ObjectSerializer;
