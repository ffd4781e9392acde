//! PDF text extraction

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Extracted text of one page
#[derive(Debug, Clone)]
pub struct PageText {
    /// 1-based page number
    pub number: u32,
    pub content: String,
}

/// A parsed PDF: page count plus per-page text
#[derive(Debug, Clone)]
pub struct ParsedPdf {
    pub page_count: u32,
    /// Pages with non-empty text, in page order
    pub pages: Vec<PageText>,
}

impl ParsedPdf {
    pub fn total_chars(&self) -> usize {
        self.pages.iter().map(|p| p.content.len()).sum()
    }
}

pub struct PdfParser;

impl PdfParser {
    /// Parse a PDF from raw bytes, extracting text page by page.
    ///
    /// Page-level extraction goes through lopdf so each chunk can carry
    /// its page number. When that yields nothing (scanned or unusual
    /// encodings), the whole document is re-extracted in one pass and
    /// attributed to page 1.
    pub fn parse(filename: &str, data: &[u8]) -> Result<ParsedPdf> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::pdf_parse(filename, e))?;

        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        let page_count = page_numbers.len() as u32;
        if page_count == 0 {
            return Err(Error::pdf_parse(filename, "document has no pages"));
        }

        let mut pages = Vec::new();
        for number in page_numbers {
            match doc.extract_text(&[number]) {
                Ok(raw) => {
                    let content = clean_text(&raw);
                    if !content.is_empty() {
                        pages.push(PageText { number, content });
                    }
                }
                Err(e) => {
                    warn!("[{filename}] page {number} extraction failed: {e}");
                }
            }
        }

        if pages.is_empty() {
            debug!("[{filename}] no per-page text, trying whole-document extraction");
            if let Ok(raw) = pdf_extract::extract_text_from_mem(data) {
                let content = clean_text(&raw);
                if !content.is_empty() {
                    pages.push(PageText { number: 1, content });
                }
            }
        }

        if pages.is_empty() {
            return Err(Error::EmptyDocument(filename.to_string()));
        }

        debug!(
            "[{filename}] extracted {} chars across {} of {} pages",
            pages.iter().map(|p| p.content.len()).sum::<usize>(),
            pages.len(),
            page_count
        );

        Ok(ParsedPdf { page_count, pages })
    }
}

/// Normalize extracted text: trim per line, collapse blank runs
fn clean_text(raw: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut last_blank = true;
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !last_blank {
                lines.push("");
            }
            last_blank = true;
        } else {
            lines.push(trimmed);
            last_blank = false;
        }
    }
    while lines.last() == Some(&"") {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_collapses_blanks() {
        let raw = "  Heading  \n\n\n\nBody line one.  \nBody line two.\n\n\n";
        assert_eq!(clean_text(raw), "Heading\n\nBody line one.\nBody line two.");
    }

    #[test]
    fn test_clean_text_empty() {
        assert_eq!(clean_text("   \n \n  "), "");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = PdfParser::parse("junk.pdf", b"not a pdf at all").unwrap_err();
        assert!(matches!(err, Error::PdfParse { .. }));
    }
}
