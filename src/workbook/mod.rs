//! The tracking table: which identifiers already have a row, and where new rows go.

use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};
use crate::error::PipelineError;
use crate::record::{TrackingRow, LINK_HEADER};

pub mod csv_sink;
pub mod xlsx;

pub use csv_sink::CsvWorkbook;
pub use xlsx::XlsxWorkbook;

pub trait TrackingStore {
    fn tracked(&self) -> &TrackedIds;

    /// Queue a row. The identifier counts as tracked from here on.
    fn append(&mut self, row: TrackingRow) -> Result<(), PipelineError>;

    /// Write every queued row to disk.
    fn save(&mut self) -> Result<(), PipelineError>;

    fn contains(&self, identifier: i64) -> bool {
        self.tracked().contains(identifier)
    }
}

/// Identifiers present in the sheet, plus how many of them were recorded without a link.
#[derive(Debug, Default, Clone)]
pub struct TrackedIds {
    ids: BTreeSet<i64>,
    without_link: BTreeSet<i64>,
}

impl TrackedIds {
    pub fn insert(&mut self, identifier: i64, has_link: bool) {
        self.ids.insert(identifier);
        if has_link {
            self.without_link.remove(&identifier);
        } else {
            self.without_link.insert(identifier);
        }
    }

    pub fn contains(&self, identifier: i64) -> bool {
        self.ids.contains(&identifier)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn without_link(&self) -> impl Iterator<Item = i64> + '_ {
        self.without_link.iter().copied()
    }
}

/// Where each value of a new row goes, read from the header row of an existing sheet.
#[derive(Debug, Clone)]
pub struct ColumnLayout {
    headers: Vec<String>,
    id_column: String,
    id_index: usize,
    link_index: Option<usize>,
}

impl ColumnLayout {
    pub fn from_headers(headers: Vec<String>, id_column: &str, origin: &str) -> Result<Self, PipelineError> {
        let headers: Vec<String> = headers.into_iter().map(|h| h.trim().to_string()).collect();
        let id_index = headers
            .iter()
            .position(|h| h == id_column)
            .ok_or_else(|| PipelineError::Workbook(format!("no '{}' column in {}", id_column, origin)))?;
        let link_index = headers.iter().position(|h| h == LINK_HEADER).or_else(|| {
            headers
                .iter()
                .enumerate()
                .position(|(i, h)| i != id_index && h.to_lowercase().contains("link"))
        });

        Ok(Self {
            headers,
            id_column: id_column.to_string(),
            id_index,
            link_index,
        })
    }

    /// Layout of a sheet this program creates itself.
    pub fn standard(id_column: &str) -> Self {
        Self {
            headers: TrackingRow::headers(id_column),
            id_column: id_column.to_string(),
            id_index: 3,
            link_index: Some(6),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn id_index(&self) -> usize {
        self.id_index
    }

    pub fn link_index(&self) -> Option<usize> {
        self.link_index
    }

    /// One cell per header, in header order. Columns the row has no value for stay empty.
    pub fn cells(&self, row: &TrackingRow) -> Vec<String> {
        self.headers
            .iter()
            .enumerate()
            .map(|(index, header)| {
                if index == self.id_index {
                    row.identifier.to_string()
                } else if Some(index) == self.link_index {
                    row.link.clone()
                } else {
                    row.cell(header, &self.id_column).unwrap_or_default()
                }
            })
            .collect()
    }
}

/// Opens the store matching the file extension.
pub fn open(path: &str, sheet_name: &str, id_column: &str) -> Result<Box<dyn TrackingStore>, PipelineError> {
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let store: Box<dyn TrackingStore> = match extension.as_deref() {
        Some("xlsx") | Some("xlsm") => Box::new(XlsxWorkbook::open(path, sheet_name, id_column)?),
        Some("csv") => Box::new(CsvWorkbook::open(path, id_column)?),
        _ => {
            return Err(PipelineError::Workbook(format!(
                "unsupported workbook type: {}",
                path
            )))
        }
    };

    report_unlinked(store.tracked());
    Ok(store)
}

fn report_unlinked(tracked: &TrackedIds) {
    let unlinked: Vec<i64> = tracked.without_link().collect();
    info!("Tracking table holds {} identifiers", tracked.len());
    if !unlinked.is_empty() {
        warn!(
            "{} tracked identifiers have no link and will not be retried until their rows are removed: {:?}",
            unlinked.len(),
            unlinked
        );
    }
}

/// Spreadsheet cells hold ids as text or as floats ("1023", "1023.0").
pub fn parse_cell_id(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(id) = value.parse::<i64>() {
        return Some(id);
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|f| f.fract() == 0.0 && f.is_finite())
        .map(|f| f as i64)
}
