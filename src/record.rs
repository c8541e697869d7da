use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use crate::error::PipelineError;

/// An audio file found in the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioRecord {
    pub identifier: i64,
    pub filename: String,
    pub source_path: PathBuf,
}

impl AudioRecord {
    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let filename = path
            .file_name()
            .and_then(|f| f.to_str())
            .ok_or_else(|| PipelineError::InvalidFilename(path.display().to_string()))?
            .to_string();

        let identifier = parse_identifier(&filename)?;
        debug!("Parsed identifier {} from {}", identifier, filename);

        Ok(Self {
            identifier,
            filename,
            source_path: path.to_path_buf(),
        })
    }
}

/// The identifier is everything before the first space.
pub fn parse_identifier(filename: &str) -> Result<i64, PipelineError> {
    let prefix = filename.split(' ').next().unwrap_or_default().trim();
    prefix
        .parse::<i64>()
        .map_err(|_| PipelineError::InvalidFilename(filename.to_string()))
}

pub const DATE_HEADER: &str = "Data Verificacao";
pub const VERIFIER_HEADER: &str = "Verificador";
pub const RESEARCHER_HEADER: &str = "Pesquisador";
pub const COLLECTION_DATE_HEADER: &str = "Data da coleta em Campo";
pub const STATUS_HEADER: &str = "Status do Monitoramento";
pub const LINK_HEADER: &str = "Link original do audio (colar)";

/// One line of the tracking sheet. Only the identifier and link are filled in here;
/// the remaining columns belong to the people reviewing the recordings.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct TrackingRow {
    pub date: String,
    pub verifier: String,
    pub researcher: String,
    pub identifier: i64,
    pub collection_date: String,
    pub status: String,
    pub link: String,
}

impl TrackingRow {
    pub fn new(identifier: i64, link: Option<&str>) -> Self {
        Self {
            identifier,
            link: link.unwrap_or_default().to_string(),
            ..Self::default()
        }
    }

    pub fn headers(id_column: &str) -> Vec<String> {
        vec![
            DATE_HEADER.to_string(),
            VERIFIER_HEADER.to_string(),
            RESEARCHER_HEADER.to_string(),
            id_column.to_string(),
            COLLECTION_DATE_HEADER.to_string(),
            STATUS_HEADER.to_string(),
            LINK_HEADER.to_string(),
        ]
    }

    /// Value for a column of an existing sheet, matched by header text.
    /// Headers this row knows nothing about get `None`.
    pub fn cell(&self, header: &str, id_column: &str) -> Option<String> {
        let header = header.trim();
        if header == id_column {
            return Some(self.identifier.to_string());
        }
        let value = match header {
            DATE_HEADER => &self.date,
            VERIFIER_HEADER => &self.verifier,
            RESEARCHER_HEADER => &self.researcher,
            COLLECTION_DATE_HEADER => &self.collection_date,
            STATUS_HEADER => &self.status,
            LINK_HEADER => &self.link,
            _ => return None,
        };
        Some(value.clone())
    }

    pub fn has_link(&self) -> bool {
        !self.link.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_is_prefix_before_first_space() {
        assert_eq!(parse_identifier("1023 fieldrecording.wav").unwrap(), 1023);
        assert_eq!(parse_identifier("77 pista 2 manhã.mp3").unwrap(), 77);
    }

    #[test]
    fn malformed_identifier_is_rejected() {
        assert!(matches!(
            parse_identifier("fieldrecording.wav"),
            Err(PipelineError::InvalidFilename(_))
        ));
        assert!(parse_identifier("12a ruido.wav").is_err());
        assert!(parse_identifier(" 12 leading-space.wav").is_err());
    }

    #[test]
    fn record_from_path_keeps_full_source_path() {
        let path = Path::new("/audio/in/lote 3/1023 fieldrecording.wav");
        let record = AudioRecord::from_path(path).unwrap();
        assert_eq!(record.identifier, 1023);
        assert_eq!(record.filename, "1023 fieldrecording.wav");
        assert_eq!(record.source_path, path);
    }

    #[test]
    fn cells_are_looked_up_by_header() {
        let row = TrackingRow::new(1023, Some("https://drive.google.com/file/d/abc"));
        assert_eq!(row.cell("Nro", "Nro").as_deref(), Some("1023"));
        assert_eq!(row.cell(LINK_HEADER, "Nro").as_deref(), Some("https://drive.google.com/file/d/abc"));
        assert_eq!(row.cell(" Verificador ", "Nro").as_deref(), Some(""));
        assert_eq!(row.cell("Observações", "Nro"), None);
        assert!(row.has_link());
        assert!(!TrackingRow::new(1023, None).has_link());
    }
}
