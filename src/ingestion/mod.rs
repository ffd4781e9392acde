pub mod chunker;
pub mod pdf;
pub mod stage;

pub use chunker::TextChunker;
pub use pdf::{PageText, ParsedPdf, PdfParser};
pub use stage::{IngestOutcome, IngestStage};
