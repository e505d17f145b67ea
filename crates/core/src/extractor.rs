use crate::error::ExtractError;
use crate::traits::TextExtractor;
use lopdf::Document;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct LopdfExtractor;

impl LopdfExtractor {
    pub fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, ExtractError> {
        let document =
            Document::load(path).map_err(|error| ExtractError::PdfParse(error.to_string()))?;

        if document.is_encrypted() {
            return Err(ExtractError::PdfParse(format!(
                "pdf is password protected: {}",
                path.display()
            )));
        }

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| ExtractError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        Ok(pages)
    }
}

impl TextExtractor for LopdfExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        let pages = self.extract_pages(path)?;
        if pages.is_empty() {
            return Err(ExtractError::Empty(path.display().to_string()));
        }
        Ok(join_pages(&pages))
    }
}

/// Reads `.txt` and `.md` files as UTF-8.
#[derive(Debug, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, ExtractError> {
        let text = std::fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Err(ExtractError::Empty(path.display().to_string()));
        }
        Ok(text)
    }
}

pub fn join_pages(pages: &[PageText]) -> String {
    let mut text = String::new();
    for page in pages {
        text.push_str(&page.text);
        text.push('\n');
    }
    text
}

/// Picks an extractor by file extension.
pub fn extract_document_text(path: &Path) -> Result<String, ExtractError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => LopdfExtractor.extract_text(path),
        "txt" | "md" | "text" => PlainTextExtractor.extract_text(path),
        other => Err(ExtractError::Unsupported(format!(
            "{} (extension {other:?})",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn pages_are_joined_with_newlines() {
        let pages = vec![
            PageText {
                number: 1,
                text: "First".to_string(),
            },
            PageText {
                number: 2,
                text: "Second".to_string(),
            },
        ];
        assert_eq!(join_pages(&pages), "First\nSecond\n");
    }

    #[test]
    fn plain_text_is_read_verbatim() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.TXT");
        fs::write(&path, "The sky is blue.\n")?;

        assert_eq!(extract_document_text(&path)?, "The sky is blue.\n");
        Ok(())
    }

    #[test]
    fn blank_text_file_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("blank.md");
        fs::write(&path, "\n\n")?;

        assert!(matches!(
            extract_document_text(&path),
            Err(ExtractError::Empty(_))
        ));
        Ok(())
    }

    #[test]
    fn broken_pdf_fails_before_chunking() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        assert!(matches!(
            extract_document_text(&path),
            Err(ExtractError::PdfParse(_))
        ));
        Ok(())
    }

    #[test]
    fn unknown_extensions_are_unsupported() {
        assert!(matches!(
            extract_document_text(Path::new("slides.pptx")),
            Err(ExtractError::Unsupported(_))
        ));
    }
}
