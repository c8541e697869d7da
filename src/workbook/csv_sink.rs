use csv::{ReaderBuilder, Writer};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{info, debug, warn};
use crate::error::PipelineError;
use crate::record::TrackingRow;
use super::{parse_cell_id, ColumnLayout, TrackedIds, TrackingStore};

/// Tracking table kept as a csv file. New rows are appended on save, in the file's own column order.
pub struct CsvWorkbook {
    path: PathBuf,
    layout: ColumnLayout,
    tracked: TrackedIds,
    pending: Vec<TrackingRow>,
}

impl CsvWorkbook {
    pub fn open(csv_path: &str, id_column: &str) -> Result<Self, PipelineError> {
        let path = PathBuf::from(csv_path);
        let mut tracked = TrackedIds::default();

        let layout = if has_content(&path) {
            info!("Reading tracking table: {}", csv_path);
            let mut reader = ReaderBuilder::new().flexible(true).from_path(&path)?;
            let headers = reader.headers()?.iter().map(str::to_string).collect();
            let layout = ColumnLayout::from_headers(headers, id_column, csv_path)?;

            for record in reader.records() {
                let record = record?;
                match record.get(layout.id_index()).and_then(parse_cell_id) {
                    Some(id) => {
                        let has_link = layout
                            .link_index()
                            .and_then(|i| record.get(i))
                            .is_some_and(|link| !link.trim().is_empty());
                        tracked.insert(id, has_link);
                    }
                    None => debug!("Ignoring row without identifier: {:?}", record),
                }
            }
            layout
        } else {
            warn!("Tracking table {} not found, starting empty", csv_path);
            ColumnLayout::standard(id_column)
        };

        Ok(Self {
            path,
            layout,
            tracked,
            pending: Vec::new(),
        })
    }
}

fn has_content(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

impl TrackingStore for CsvWorkbook {
    fn tracked(&self) -> &TrackedIds {
        &self.tracked
    }

    fn append(&mut self, row: TrackingRow) -> Result<(), PipelineError> {
        self.tracked.insert(row.identifier, row.has_link());
        self.pending.push(row);
        Ok(())
    }

    fn save(&mut self) -> Result<(), PipelineError> {
        append(&self.path, &self.pending, &self.layout)?;
        self.pending.clear();
        Ok(())
    }
}

pub fn append(path: &Path, rows: &[TrackingRow], layout: &ColumnLayout) -> Result<(), PipelineError> {
    if rows.is_empty() {
        debug!("No rows to append, skipping");
        return Ok(());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let needs_header = !has_content(path);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    let mut writer = Writer::from_writer(file);

    if needs_header {
        info!("Writing csv header to new file");
        writer.write_record(layout.headers())?;
    }

    for row in rows {
        writer.write_record(layout.cells(row))?;
    }

    writer.flush()?;
    debug!("Appended {} rows to {}", rows.len(), path.display());

    Ok(())
}
