use std::path::PathBuf;
use tracing::{info, debug, error};
use umya_spreadsheet::{reader, writer, Spreadsheet};
use crate::error::PipelineError;
use crate::record::TrackingRow;
use super::{parse_cell_id, ColumnLayout, TrackedIds, TrackingStore};

/// Tracking table stored in a named sheet of an Excel workbook. Saving rewrites the file.
pub struct XlsxWorkbook {
    path: PathBuf,
    sheet_name: String,
    book: Spreadsheet,
    layout: ColumnLayout,
    next_row: u32,
    tracked: TrackedIds,
}

impl XlsxWorkbook {
    pub fn open(path: &str, sheet_name: &str, id_column: &str) -> Result<Self, PipelineError> {
        info!("Loading workbook {} (sheet {})", path, sheet_name);

        let book = reader::xlsx::read(path)
            .map_err(|e| PipelineError::Workbook(format!("cannot read {}: {}", path, e)))?;
        let sheet = book
            .get_sheet_by_name(sheet_name)
            .ok_or_else(|| PipelineError::Workbook(format!("no sheet named '{}'", sheet_name)))?;

        let last_row = sheet.get_highest_row();
        let last_col = sheet.get_highest_column();

        let headers = (1..=last_col).map(|col| sheet.get_value((col, 1))).collect();
        let layout = ColumnLayout::from_headers(headers, id_column, &format!("sheet '{}'", sheet_name))?;
        let id_col = layout.id_index() as u32 + 1;
        let link_col = layout.link_index().map(|i| i as u32 + 1);

        let mut tracked = TrackedIds::default();
        for row in 2..=last_row {
            if let Some(id) = parse_cell_id(&sheet.get_value((id_col, row))) {
                let has_link = link_col
                    .map(|col| !sheet.get_value((col, row)).trim().is_empty())
                    .unwrap_or(false);
                tracked.insert(id, has_link);
            }
        }
        debug!("Sheet {} has {} rows", sheet_name, last_row);

        Ok(Self {
            path: PathBuf::from(path),
            sheet_name: sheet_name.to_string(),
            book,
            layout,
            next_row: last_row.max(1) + 1,
            tracked,
        })
    }
}

impl TrackingStore for XlsxWorkbook {
    fn tracked(&self) -> &TrackedIds {
        &self.tracked
    }

    fn append(&mut self, row: TrackingRow) -> Result<(), PipelineError> {
        let Some(sheet) = self.book.get_sheet_by_name_mut(&self.sheet_name) else {
            error!("Sheet '{}' is gone, cannot record {}", self.sheet_name, row.identifier);
            return Err(PipelineError::Workbook(format!("no sheet named '{}'", self.sheet_name)));
        };

        let target = self.next_row;
        for (index, value) in self.layout.cells(&row).into_iter().enumerate() {
            let col = index as u32 + 1;
            if index == self.layout.id_index() {
                sheet.get_cell_mut((col, target)).set_value_number(row.identifier as f64);
            } else if !value.is_empty() {
                sheet.get_cell_mut((col, target)).set_value(value);
            }
        }

        self.next_row += 1;
        self.tracked.insert(row.identifier, row.has_link());
        Ok(())
    }

    fn save(&mut self) -> Result<(), PipelineError> {
        writer::xlsx::write(&self.book, &self.path).map_err(|e| {
            PipelineError::Workbook(format!("cannot save {}: {}", self.path.display(), e))
        })?;
        debug!("Saved workbook {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_workbook(path: &std::path::Path) {
        let mut book = umya_spreadsheet::new_file();
        let sheet = book.get_sheet_by_name_mut("Sheet1").unwrap();
        for (index, header) in TrackingRow::headers("ID").into_iter().enumerate() {
            sheet.get_cell_mut((index as u32 + 1, 1)).set_value(header);
        }
        sheet.get_cell_mut((4, 2)).set_value_number(1001);
        sheet.get_cell_mut((7, 2)).set_value("https://drive.google.com/file/d/old");
        sheet.get_cell_mut((4, 3)).set_value("1002");
        writer::xlsx::write(&book, path).unwrap();
    }

    #[test]
    fn reads_existing_ids_and_appends_below_them() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("Consultas.xlsx");
        seeded_workbook(&path);
        let path_str = path.to_str().unwrap();

        let mut book = XlsxWorkbook::open(path_str, "Sheet1", "ID").unwrap();
        assert!(book.contains(1001));
        assert!(book.contains(1002));
        assert_eq!(book.tracked().without_link().collect::<Vec<_>>(), vec![1002]);

        book.append(TrackingRow::new(1023, Some("https://drive.google.com/file/d/new"))).unwrap();
        book.save().unwrap();

        let reopened = XlsxWorkbook::open(path_str, "Sheet1", "ID").unwrap();
        assert!(reopened.contains(1023));
        assert_eq!(reopened.tracked().len(), 3);
    }

    #[test]
    fn appends_into_the_columns_named_by_the_header() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("Consultas.xlsx");
        let mut seed = umya_spreadsheet::new_file();
        let sheet = seed.get_sheet_by_name_mut("Sheet1").unwrap();
        sheet.get_cell_mut((1, 1)).set_value("ID");
        sheet.get_cell_mut((2, 1)).set_value(crate::record::LINK_HEADER);
        sheet.get_cell_mut((1, 2)).set_value_number(1001);
        writer::xlsx::write(&seed, &path).unwrap();
        let path_str = path.to_str().unwrap();

        let mut book = XlsxWorkbook::open(path_str, "Sheet1", "ID").unwrap();
        book.append(TrackingRow::new(1023, Some("https://drive.google.com/file/d/new"))).unwrap();
        book.save().unwrap();

        let reopened = XlsxWorkbook::open(path_str, "Sheet1", "ID").unwrap();
        assert!(reopened.contains(1001));
        assert!(reopened.contains(1023));
        assert_eq!(reopened.tracked().without_link().collect::<Vec<_>>(), vec![1001]);

        let written = umya_spreadsheet::reader::xlsx::read(&path).unwrap();
        let sheet = written.get_sheet_by_name("Sheet1").unwrap();
        assert_eq!(parse_cell_id(&sheet.get_value((1, 3))), Some(1023));
        assert_eq!(sheet.get_value((2, 3)), "https://drive.google.com/file/d/new");
        assert_eq!(sheet.get_highest_column(), 2);
    }

    #[test]
    fn append_to_a_vanished_sheet_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("Consultas.xlsx");
        seeded_workbook(&path);

        let mut book = XlsxWorkbook::open(path.to_str().unwrap(), "Sheet1", "ID").unwrap();
        book.sheet_name = "Planilha9".to_string();
        assert!(matches!(
            book.append(TrackingRow::new(1023, None)),
            Err(PipelineError::Workbook(_))
        ));
        assert!(!book.contains(1023));
    }

    #[test]
    fn missing_sheet_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("Consultas.xlsx");
        seeded_workbook(&path);
        assert!(matches!(
            XlsxWorkbook::open(path.to_str().unwrap(), "Planilha9", "ID"),
            Err(PipelineError::Workbook(_))
        ));
    }
}
