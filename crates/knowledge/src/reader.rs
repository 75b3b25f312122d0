//! Document readers: bytes in, numbered pages of text out.

use bocs_core::{AppError, AppResult};
use std::path::Path;

/// One page of extracted text. Page numbers start at 1.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPage {
    pub number: u32,
    pub text: String,
}

/// Extracts text from a document file.
#[async_trait::async_trait]
pub trait DocumentReader: Send + Sync {
    fn name(&self) -> &str;

    /// Read `path` into pages. Blank pages may be omitted.
    async fn read(&self, path: &Path) -> AppResult<Vec<DocumentPage>>;
}

/// PDF reader: per-page extraction with lopdf, falling back to pdf-extract
/// when lopdf finds no text.
#[derive(Debug, Clone, Default)]
pub struct PdfReader;

impl PdfReader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl DocumentReader for PdfReader {
    fn name(&self) -> &str {
        "pdf"
    }

    async fn read(&self, path: &Path) -> AppResult<Vec<DocumentPage>> {
        tracing::debug!("Extracting PDF: {:?}", path);
        let bytes = tokio::fs::read(path).await?;

        tokio::task::spawn_blocking(move || extract_pdf_pages(&bytes))
            .await
            .map_err(|e| AppError::Knowledge(format!("PDF extraction task failed: {}", e)))?
    }
}

fn extract_pdf_pages(bytes: &[u8]) -> AppResult<Vec<DocumentPage>> {
    match extract_with_lopdf(bytes) {
        Ok(pages) if !pages.is_empty() => return Ok(pages),
        Ok(_) => tracing::debug!("lopdf found no text, trying pdf-extract"),
        Err(e) => tracing::debug!("lopdf extraction failed ({}), trying pdf-extract", e),
    }

    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| AppError::Knowledge(format!("PDF extraction failed: {}", e)))?;

    // pdf-extract separates pages with form feeds
    Ok(text
        .split('\u{c}')
        .enumerate()
        .filter_map(|(i, page)| non_blank(i as u32 + 1, page))
        .collect())
}

fn extract_with_lopdf(bytes: &[u8]) -> Result<Vec<DocumentPage>, lopdf::Error> {
    let doc = lopdf::Document::load_mem(bytes)?;
    let mut pages = Vec::new();

    for page_number in doc.get_pages().keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(text) => {
                if let Some(page) = non_blank(*page_number, &text) {
                    pages.push(page);
                }
            }
            Err(e) => tracing::debug!("Skipping page {}: {}", page_number, e),
        }
    }

    Ok(pages)
}

fn non_blank(number: u32, text: &str) -> Option<DocumentPage> {
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(DocumentPage {
            number,
            text: text.to_string(),
        })
    }
}

/// Reads UTF-8 text files as a single page.
#[derive(Debug, Clone, Default)]
pub struct PlainTextReader;

impl PlainTextReader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl DocumentReader for PlainTextReader {
    fn name(&self) -> &str {
        "text"
    }

    async fn read(&self, path: &Path) -> AppResult<Vec<DocumentPage>> {
        let bytes = tokio::fs::read(path).await?;
        let text = String::from_utf8(bytes).map_err(|e| {
            AppError::Knowledge(format!("{} is not valid UTF-8: {}", path.display(), e))
        })?;
        Ok(non_blank(1, &text).into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};
    use tempfile::TempDir;

    fn one_page_pdf(text: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_pdf_reader_extracts_page_text() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("decree_12.pdf");
        std::fs::write(&path, one_page_pdf("Decree 12 on programme monitoring")).unwrap();

        let pages = PdfReader::new().read(&path).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, 1);
        assert!(pages[0].text.contains("Decree 12"));
    }

    #[tokio::test]
    async fn test_pdf_reader_rejects_garbage() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        assert!(PdfReader::new().read(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_plain_text_reader() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("note.pdf");
        std::fs::write(&path, "  Four strategic axes.  \n").unwrap();

        let pages = PlainTextReader::new().read(&path).await.unwrap();
        assert_eq!(
            pages,
            vec![DocumentPage {
                number: 1,
                text: "Four strategic axes.".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_plain_text_blank_file_has_no_pages() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blank.pdf");
        std::fs::write(&path, "\n\n").unwrap();

        assert!(PlainTextReader::new().read(&path).await.unwrap().is_empty());
    }
}
