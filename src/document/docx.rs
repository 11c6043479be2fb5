//! Minimal DOCX support: paragraph text in, titled paragraphs out.
//!
//! Reads `word/document.xml` (and the title from `docProps/core.xml`) out of
//! the archive. Formatting, tables and images are ignored.

use std::io::{Cursor, Read, Write};

use regex::Regex;
use zip::write::SimpleFileOptions;
use zip::ZipArchive;

/// Text extracted from a DOCX archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct DocxText {
    /// Non-empty paragraphs joined by blank lines
    pub content: String,
    pub paragraph_count: usize,
    pub title: Option<String>,
}

/// Extract paragraph text from DOCX bytes.
pub(super) fn extract_text(bytes: &[u8]) -> Result<DocxText, String> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("Invalid DOCX archive: {}", e))?;

    let body = read_entry(&mut archive, "word/document.xml")?
        .ok_or_else(|| "DOCX archive has no word/document.xml".to_string())?;
    let title = read_entry(&mut archive, "docProps/core.xml")?
        .and_then(|core| core_title(&core));

    let paragraphs = paragraphs(&body)?;
    Ok(DocxText {
        content: paragraphs.join("\n\n"),
        paragraph_count: paragraphs.len(),
        title,
    })
}

fn read_entry(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<String>, String> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(format!("Failed to read {}: {}", name, e)),
    };

    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .map_err(|e| format!("Failed to read {}: {}", name, e))?;
    Ok(Some(xml))
}

/// Non-empty paragraph texts of a `document.xml` body, in order.
fn paragraphs(xml: &str) -> Result<Vec<String>, String> {
    let paragraph = Regex::new(r"(?s)<w:p[ >].*?</w:p>").map_err(|e| e.to_string())?;
    let run = Regex::new(r"(?s)<w:tab/>|<w:br/>|<w:t(?:\s[^>]*)?>(.*?)</w:t>")
        .map_err(|e| e.to_string())?;

    let texts = paragraph
        .find_iter(xml)
        .map(|p| {
            let mut text = String::new();
            for caps in run.captures_iter(p.as_str()) {
                match caps.get(1) {
                    Some(t) => text.push_str(&unescape_xml(t.as_str())),
                    None if &caps[0] == "<w:tab/>" => text.push('\t'),
                    None => text.push('\n'),
                }
            }
            text
        })
        .filter(|text| !text.trim().is_empty())
        .collect();
    Ok(texts)
}

fn core_title(core: &str) -> Option<String> {
    let pattern = Regex::new(r"(?s)<dc:title>(.*?)</dc:title>").ok()?;
    pattern
        .captures(core)
        .and_then(|caps| caps.get(1))
        .map(|m| unescape_xml(m.as_str()).trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Build a DOCX archive: a centered title heading, then one paragraph per
/// blank-line-separated block of `content`.
pub(super) fn build(title: &str, content: &str) -> Result<Vec<u8>, zip::result::ZipError> {
    let mut buffer = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(Cursor::new(&mut buffer));
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        let parts = [
            ("[Content_Types].xml", CONTENT_TYPES.to_string()),
            ("_rels/.rels", PACKAGE_RELS.to_string()),
            ("docProps/core.xml", core_xml(title)),
            ("word/document.xml", document_xml(title, content)),
        ];
        for (name, body) in parts {
            writer.start_file(name, options)?;
            writer.write_all(body.as_bytes())?;
        }
        writer.finish()?;
    }
    Ok(buffer)
}

fn document_xml(title: &str, content: &str) -> String {
    let mut body = format!(
        r#"<w:p><w:pPr><w:pStyle w:val="Title"/><w:jc w:val="center"/></w:pPr><w:r><w:rPr><w:b/><w:sz w:val="48"/></w:rPr><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        escape_xml(title)
    );

    for block in content.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
        body.push_str("<w:p>");
        for (i, line) in block.lines().enumerate() {
            if i > 0 {
                body.push_str("<w:r><w:br/></w:r>");
            }
            body.push_str(&format!(
                r#"<w:r><w:t xml:space="preserve">{}</w:t></w:r>"#,
                escape_xml(line)
            ));
        }
        body.push_str("</w:p>");
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
    )
}

fn core_xml(title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>{}</dc:title></cp:coreProperties>"#,
        escape_xml(title)
    )
}

pub(super) fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;

#[cfg(test)]
mod tests {
    use super::*;

    /// Create a DOCX archive in memory with the given document body.
    fn create_docx(body: &str, core: Option<&str>) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options = SimpleFileOptions::default();
            writer.start_file("word/document.xml", options).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
            if let Some(core) = core {
                writer.start_file("docProps/core.xml", options).unwrap();
                writer.write_all(core.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn joins_runs_and_skips_empty_paragraphs() {
        let body = r#"<w:document><w:body>
            <w:p w:rsidR="00A1"><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Q3 </w:t></w:r><w:r><w:t xml:space="preserve">Report</w:t></w:r></w:p>
            <w:p><w:r><w:t></w:t></w:r></w:p>
            <w:p><w:r><w:t>Revenue</w:t><w:tab/><w:t>&lt;10%&amp;up</w:t></w:r></w:p>
            <w:tbl><w:tr><w:tc><w:p><w:r><w:t>cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl>
        </w:body></w:document>"#;

        let text = extract_text(&create_docx(body, None)).unwrap();

        assert_eq!(text.content, "Q3 Report\n\nRevenue\t<10%&up\n\ncell");
        assert_eq!(text.paragraph_count, 3);
        assert_eq!(text.title, None);
    }

    #[test]
    fn reads_core_title() {
        let core = r#"<cp:coreProperties><dc:title>Annual &amp; Final</dc:title></cp:coreProperties>"#;
        let text = extract_text(&create_docx("<w:p><w:r><w:t>x</w:t></w:r></w:p>", Some(core)))
            .unwrap();
        assert_eq!(text.title.as_deref(), Some("Annual & Final"));
    }

    #[test]
    fn rejects_non_archives_and_missing_body() {
        assert!(extract_text(b"plain text, not a zip").is_err());

        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
            writer
                .start_file("other.xml", SimpleFileOptions::default())
                .unwrap();
            writer.finish().unwrap();
        }
        let err = extract_text(&buf).unwrap_err();
        assert!(err.contains("word/document.xml"));
    }

    #[test]
    fn built_archive_reads_back_as_title_and_blocks() {
        let bytes = build("Report <Q3>", "First block\nsecond line\n\n\n\nSecond block").unwrap();

        let text = extract_text(&bytes).unwrap();
        assert_eq!(
            text.content,
            "Report <Q3>\n\nFirst block\nsecond line\n\nSecond block"
        );
        assert_eq!(text.title.as_deref(), Some("Report <Q3>"));
    }
}
