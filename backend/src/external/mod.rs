//! External collaborators: paperwork rendering and order extraction

pub mod documents;
pub mod extraction;

pub use documents::{render_label_sheet, CsvDocumentGenerator, DocumentGenerator};
pub use extraction::{ExtractionClient, ExtractionRequest};
