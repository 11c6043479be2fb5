//! Document source and sink.
//!
//! Loads plain text, markdown, HTML (as raw text) and DOCX (paragraph text)
//! and writes answers back out. PDF is recognized and rejected.

mod docx;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tokio::fs;

/// Errors from loading or saving documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to load document {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not read document {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("Unsupported document format: {0}")]
    FormatUnsupported(String),

    #[error("Failed to save document {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Markdown,
    Html,
    Docx,
}

fn lowercase_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default()
}

impl DocumentFormat {
    /// Input format implied by the file extension (case-insensitive).
    ///
    /// # Errors
    /// `FormatUnsupported` for PDF and unknown extensions.
    pub fn from_path(path: &Path) -> Result<Self, DocumentError> {
        let extension = lowercase_extension(path);

        match extension.as_str() {
            "txt" => Ok(Self::Text),
            "md" | "markdown" => Ok(Self::Markdown),
            "html" | "htm" => Ok(Self::Html),
            "docx" => Ok(Self::Docx),
            "pdf" => Err(DocumentError::FormatUnsupported(
                ".pdf (convert it to text or DOCX first)".to_string(),
            )),
            "" => Err(DocumentError::FormatUnsupported(format!(
                "{} has no file extension",
                path.display()
            ))),
            other => Err(DocumentError::FormatUnsupported(format!(".{other}"))),
        }
    }

    /// Output format for `path`. Anything other than markdown, HTML or DOCX
    /// is written as plain text.
    pub fn for_output(path: &Path) -> Self {
        match lowercase_extension(path).as_str() {
            "md" | "markdown" => Self::Markdown,
            "html" | "htm" => Self::Html,
            "docx" => Self::Docx,
            _ => Self::Text,
        }
    }

    /// Extension used in `file_type` metadata.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => ".txt",
            Self::Markdown => ".md",
            Self::Html => ".html",
            Self::Docx => ".docx",
        }
    }
}

/// A loaded document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    /// `file_type`, `file_size`, `title` when the file declares one, and
    /// `paragraph_count` for DOCX
    pub metadata: BTreeMap<String, String>,
}

/// Where documents come from.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Document, DocumentError>;
}

/// Where answers go.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Write `content` to `destination`. `title` heads HTML and DOCX output.
    async fn save(
        &self,
        content: &str,
        destination: &Path,
        format: DocumentFormat,
        title: &str,
    ) -> Result<(), DocumentError>;
}

/// Local filesystem source and sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDocumentStore;

#[async_trait]
impl DocumentSource for FsDocumentStore {
    async fn load(&self, path: &Path) -> Result<Document, DocumentError> {
        let format = DocumentFormat::from_path(path)?;
        let load_error = |source| DocumentError::Load {
            path: path.to_path_buf(),
            source,
        };

        let bytes = fs::read(path).await.map_err(load_error)?;
        let file_size = bytes.len();
        let mut metadata = BTreeMap::from([
            ("file_type".to_string(), format.extension().to_string()),
            ("file_size".to_string(), file_size.to_string()),
        ]);

        let content = match format {
            DocumentFormat::Docx => {
                let text = docx::extract_text(&bytes).map_err(|message| {
                    DocumentError::Malformed {
                        path: path.to_path_buf(),
                        message,
                    }
                })?;
                metadata.insert(
                    "paragraph_count".to_string(),
                    text.paragraph_count.to_string(),
                );
                if let Some(title) = text.title {
                    metadata.insert("title".to_string(), title);
                }
                text.content
            }
            _ => String::from_utf8(bytes).map_err(|e| {
                load_error(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?,
        };

        if format == DocumentFormat::Html {
            if let Some(title) = html_title(&content) {
                metadata.insert("title".to_string(), title);
            }
        }

        tracing::debug!(
            path = %path.display(),
            file_size,
            chars = content.chars().count(),
            "Loaded document"
        );
        Ok(Document { content, metadata })
    }
}

#[async_trait]
impl DocumentSink for FsDocumentStore {
    async fn save(
        &self,
        content: &str,
        destination: &Path,
        format: DocumentFormat,
        title: &str,
    ) -> Result<(), DocumentError> {
        let save_error = |source| DocumentError::Save {
            path: destination.to_path_buf(),
            source,
        };

        let body = match format {
            DocumentFormat::Text | DocumentFormat::Markdown => content.as_bytes().to_vec(),
            DocumentFormat::Html => html_page(title, content).into_bytes(),
            DocumentFormat::Docx => docx::build(title, content)
                .map_err(|e| save_error(std::io::Error::other(e)))?,
        };

        fs::write(destination, body).await.map_err(save_error)?;

        tracing::debug!(path = %destination.display(), ?format, "Saved document");
        Ok(())
    }
}

/// Text of the first `<title>` element, whitespace-trimmed.
fn html_title(html: &str) -> Option<String> {
    let pattern = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").ok()?;
    pattern
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Wrap `content` in a standalone page with table-friendly styling.
fn html_page(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            line-height: 1.6;
            max-width: 900px;
            margin: 0 auto;
            padding: 20px;
            color: #333;
        }}
        h1, h2, h3 {{ color: #2c3e50; }}
        table {{ border-collapse: collapse; width: 100%; margin: 20px 0; }}
        th, td {{ border: 1px solid #ddd; padding: 12px; text-align: left; }}
        th {{ background-color: #3498db; color: white; }}
        tr:nth-child(even) {{ background-color: #f2f2f2; }}
        pre, code {{ background-color: #f4f4f4; border-radius: 3px; }}
        pre {{ padding: 15px; overflow-x: auto; }}
    </style>
</head>
<body>
{content}
</body>
</html>
"#,
        title = docx::escape_xml(title),
        content = content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("notes.TXT")).unwrap(),
            DocumentFormat::Text
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("page.htm")).unwrap(),
            DocumentFormat::Html
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("brief.DOCX")).unwrap(),
            DocumentFormat::Docx
        );
        assert!(matches!(
            DocumentFormat::from_path(Path::new("report.pdf")),
            Err(DocumentError::FormatUnsupported(_))
        ));
        assert!(matches!(
            DocumentFormat::from_path(Path::new("README")),
            Err(DocumentError::FormatUnsupported(_))
        ));
    }

    #[test]
    fn unknown_output_extensions_are_plain_text() {
        assert_eq!(
            DocumentFormat::for_output(Path::new("answer.rtf")),
            DocumentFormat::Text
        );
        assert_eq!(
            DocumentFormat::for_output(Path::new("answer")),
            DocumentFormat::Text
        );
        assert_eq!(
            DocumentFormat::for_output(Path::new("answer.docx")),
            DocumentFormat::Docx
        );
        assert_eq!(
            DocumentFormat::for_output(Path::new("answer.htm")),
            DocumentFormat::Html
        );
    }

    #[tokio::test]
    async fn loads_text_with_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Notes\nhello").unwrap();

        let doc = FsDocumentStore.load(&path).await.unwrap();

        assert_eq!(doc.content, "# Notes\nhello");
        assert_eq!(doc.metadata["file_type"], ".md");
        assert_eq!(doc.metadata["file_size"], "13");
        assert!(!doc.metadata.contains_key("title"));
    }

    #[tokio::test]
    async fn html_title_goes_into_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::write(
            &path,
            "<html><head><TITLE> Annual Report </TITLE></head><body>x</body></html>",
        )
        .unwrap();

        let doc = FsDocumentStore.load(&path).await.unwrap();

        assert_eq!(doc.metadata["title"], "Annual Report");
        assert!(doc.content.contains("<body>x</body>"));
    }

    #[tokio::test]
    async fn missing_file_is_a_load_error() {
        let dir = tempdir().unwrap();
        let err = FsDocumentStore
            .load(&dir.path().join("absent.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::Load { .. }));
    }

    #[tokio::test]
    async fn docx_loads_paragraph_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("brief.docx");
        FsDocumentStore
            .save(
                "Revenue grew 12%.\n\nCosts fell.",
                &path,
                DocumentFormat::Docx,
                "Q3 Brief",
            )
            .await
            .unwrap();

        let doc = FsDocumentStore.load(&path).await.unwrap();

        assert_eq!(doc.content, "Q3 Brief\n\nRevenue grew 12%.\n\nCosts fell.");
        assert_eq!(doc.metadata["file_type"], ".docx");
        assert_eq!(doc.metadata["paragraph_count"], "3");
        assert_eq!(doc.metadata["title"], "Q3 Brief");
    }

    #[tokio::test]
    async fn corrupt_docx_is_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.docx");
        std::fs::write(&path, "not a zip archive").unwrap();

        let err = FsDocumentStore.load(&path).await.unwrap_err();
        assert!(matches!(err, DocumentError::Malformed { .. }));
    }

    #[tokio::test]
    async fn saves_text_verbatim_and_html_wrapped_with_given_title() {
        let dir = tempdir().unwrap();
        let text_path = dir.path().join("out.txt");
        let html_path = dir.path().join("tables.html");

        FsDocumentStore
            .save("plain answer", &text_path, DocumentFormat::Text, "ignored")
            .await
            .unwrap();
        FsDocumentStore
            .save(
                "<table><tr><td>1</td></tr></table>",
                &html_path,
                DocumentFormat::Html,
                "annual_report",
            )
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&text_path).unwrap(), "plain answer");
        let html = std::fs::read_to_string(&html_path).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>annual_report</title>"));
        assert!(!html.contains("<title>tables</title>"));
        assert!(html.contains("<table><tr><td>1</td></tr></table>"));
    }

    #[tokio::test]
    async fn save_into_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let err = FsDocumentStore
            .save(
                "x",
                &dir.path().join("nope").join("out.md"),
                DocumentFormat::Markdown,
                "x",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::Save { .. }));
    }
}
