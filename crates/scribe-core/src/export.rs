//! Export descriptors handed to an external renderer

use crate::document::DocumentId;
use crate::error::Error;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Pdf,
    Docx,
    Html,
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Pdf => write!(f, "pdf"),
            ExportFormat::Docx => write!(f, "docx"),
            ExportFormat::Html => write!(f, "html"),
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pdf" => Ok(ExportFormat::Pdf),
            "docx" | "word" => Ok(ExportFormat::Docx),
            "html" | "htm" => Ok(ExportFormat::Html),
            _ => Err(Error::InvalidInput(format!("Unknown export format: {}", s))),
        }
    }
}

/// Where the renderer will make the exported file available
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTicket {
    pub doc_id: DocumentId,
    pub format: ExportFormat,
    pub url: String,
    pub generated_at: u64,
}

impl ExportTicket {
    pub(crate) fn new(base_url: &str, doc_id: DocumentId, format: ExportFormat, now: u64) -> Self {
        let url = format!("{}/{}/export/{}", base_url.trim_end_matches('/'), doc_id, format);
        Self {
            doc_id,
            format,
            url,
            generated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_url() {
        let id = DocumentId::new("doc_9").unwrap();
        let ticket = ExportTicket::new("/api/documents/", id, ExportFormat::Docx, 1);
        assert_eq!(ticket.url, "/api/documents/doc_9/export/docx");
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("PDF".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
        assert!("odt".parse::<ExportFormat>().is_err());
    }
}
