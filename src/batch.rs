use std::path::Path;
use tracing::{info, debug, warn, error};
use walkdir::WalkDir;
use crate::{
    drive::LinkSource,
    error::PipelineError,
    metadata::AirportDirectory,
    record::AudioRecord,
    relocate::{FileRelocator, Relocation, SkipReason},
    retrieve::{LinkResult, LinkRetriever},
    workbook::TrackingStore,
};

/// Per-run failure counter. A limit of 0 never trips.
#[derive(Debug, Clone)]
pub struct ErrorBudget {
    count: u32,
    limit: u32,
}

impl ErrorBudget {
    pub fn new(limit: u32) -> Self {
        Self { count: 0, limit }
    }

    /// Counts one failure; true once the limit is reached.
    pub fn spend(&mut self) -> bool {
        self.count += 1;
        self.exhausted()
    }

    pub fn exhausted(&self) -> bool {
        self.limit > 0 && self.count >= self.limit
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub files_seen: usize,
    pub invalid_names: usize,
    pub already_tracked: usize,
    pub copied: usize,
    pub already_present: usize,
    pub relocation_failed: usize,
    pub links_found: usize,
    pub links_missing: usize,
    pub lookup_errors: usize,
    pub aborted: bool,
}

impl RunSummary {
    pub fn log(&self) {
        info!(
            "Run finished: {} files, {} already tracked, {} copied, {} already in place, {} relocation failures, {} links found, {} without link, {} lookup errors, {} invalid names{}",
            self.files_seen,
            self.already_tracked,
            self.copied,
            self.already_present,
            self.relocation_failed,
            self.links_found,
            self.links_missing,
            self.lookup_errors,
            self.invalid_names,
            if self.aborted { " (aborted: error budget exhausted)" } else { "" }
        );
    }
}

pub struct BatchDriver<'a, A: AirportDirectory, S: LinkSource> {
    /// `None` when files are not copied.
    relocator: Option<FileRelocator<'a, A>>,
    /// `None` on a dry run.
    retriever: Option<LinkRetriever<S>>,
    budget: ErrorBudget,
}

impl<'a, A: AirportDirectory, S: LinkSource> BatchDriver<'a, A, S> {
    pub fn new(
        relocator: Option<FileRelocator<'a, A>>,
        retriever: Option<LinkRetriever<S>>,
        budget: ErrorBudget,
    ) -> Self {
        Self { relocator, retriever, budget }
    }

    pub fn into_retriever(self) -> Option<LinkRetriever<S>> {
        self.retriever
    }

    pub fn errors(&self) -> u32 {
        self.budget.count()
    }

    /// Walks `source_dir` one file at a time. Only a failed workbook save stops the walk early,
    /// apart from the error budget running out.
    pub async fn run(
        &mut self,
        source_dir: &Path,
        store: &mut dyn TrackingStore,
    ) -> Result<RunSummary, PipelineError> {
        info!("Starting batch over {}", source_dir.display());
        let mut summary = RunSummary::default();

        let walker = WalkDir::new(source_dir).sort_by_file_name().into_iter();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot read directory entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() || is_hidden(entry.path()) {
                continue;
            }

            summary.files_seen += 1;
            if self.process(entry.path(), store, &mut summary).await? {
                error!("Error budget exhausted after {} errors, stopping", self.budget.count());
                summary.aborted = true;
                break;
            }
        }

        summary.log();
        Ok(summary)
    }

    /// Handles one file. Returns true when the error budget ran out.
    async fn process(
        &mut self,
        path: &Path,
        store: &mut dyn TrackingStore,
        summary: &mut RunSummary,
    ) -> Result<bool, PipelineError> {
        let record = match AudioRecord::from_path(path) {
            Ok(record) => record,
            Err(e) => {
                error!("{}", e);
                summary.invalid_names += 1;
                return Ok(self.budget.spend());
            }
        };
        debug!(identifier = record.identifier, "Processing {}", record.filename);

        let mut exhausted = false;

        match &self.relocator {
            Some(relocator) => match relocator.relocate(&record, &*store).await {
                Relocation::Skipped(SkipReason::AlreadyTracked) => {
                    summary.already_tracked += 1;
                    return Ok(false);
                }
                Relocation::Skipped(SkipReason::AlreadyPresent) => {
                    info!("{} already in destination", record.filename);
                    summary.already_present += 1;
                }
                Relocation::Copied(target) => {
                    warn!(identifier = record.identifier, "{}", target.display());
                    summary.copied += 1;
                }
                Relocation::Planned(target) => {
                    info!("[dry run] would copy {} to {}", record.filename, target.display());
                }
                Relocation::Failed(reason) => {
                    error!(identifier = record.identifier, "Relocation failed: {}", reason);
                    summary.relocation_failed += 1;
                    exhausted = self.budget.spend();
                }
            },
            None if store.contains(record.identifier) => {
                summary.already_tracked += 1;
                return Ok(false);
            }
            None => {}
        }

        let Some(retriever) = self.retriever.as_mut() else {
            info!("[dry run] would look up link for {}", record.filename);
            return Ok(exhausted);
        };

        match retriever.retrieve(&record, store).await? {
            Some(LinkResult::Found(_)) => summary.links_found += 1,
            Some(LinkResult::NotFound(_)) => summary.links_missing += 1,
            Some(LinkResult::Error(_)) => {
                summary.lookup_errors += 1;
                exhausted = self.budget.spend() || exhausted;
            }
            None => summary.already_tracked += 1,
        }

        Ok(exhausted || self.budget.exhausted())
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tests::{sbsp_fixture, StaticAirports};
    use crate::metadata::{MetadataResolver, RecordSet};
    use crate::retrieve::tests::ScriptedSource;
    use crate::workbook::CsvWorkbook;
    use chrono::Locale;
    use std::path::PathBuf;
    use std::time::Duration;

    struct Fixture {
        source: tempfile::TempDir,
        destination: tempfile::TempDir,
        tracking: PathBuf,
        records: RecordSet,
        airports: StaticAirports,
    }

    impl Fixture {
        fn new(files: &[&str]) -> Self {
            let source = tempfile::tempdir().unwrap();
            let destination = tempfile::tempdir().unwrap();
            let nested = source.path().join("lote 1");
            std::fs::create_dir_all(&nested).unwrap();
            for name in files {
                std::fs::write(nested.join(name), name.as_bytes()).unwrap();
            }
            let tracking = destination.path().join("tracking.csv");
            let (records, airports) = sbsp_fixture();
            Self { source, destination, tracking, records, airports }
        }

        fn store(&self) -> CsvWorkbook {
            CsvWorkbook::open(self.tracking.to_str().unwrap(), "ID").unwrap()
        }

        fn driver(&self, source: ScriptedSource, budget: u32) -> BatchDriver<'_, StaticAirports, ScriptedSource> {
            let relocator = FileRelocator::new(
                self.destination.path().join("organized"),
                MetadataResolver::new(&self.records, &self.airports, Locale::pt_BR),
                false,
            );
            let retriever = LinkRetriever::new(source, 3, Duration::ZERO);
            BatchDriver::new(Some(relocator), Some(retriever), ErrorBudget::new(budget))
        }

        fn tracked_rows(&self) -> usize {
            std::fs::read_to_string(&self.tracking)
                .map(|c| c.lines().count().saturating_sub(1))
                .unwrap_or(0)
        }
    }

    #[tokio::test]
    async fn second_run_over_same_tree_changes_nothing() {
        let fx = Fixture::new(&["1023 fieldrecording.wav", "1024 sem cadastro.wav"]);

        let mut store = fx.store();
        let source = ScriptedSource::new([LinkResult::Found("https://drive.google.com/file/d/a".into())]);
        let mut driver = fx.driver(source, 50);
        let first = driver.run(fx.source.path(), &mut store).await.unwrap();

        assert_eq!(first.files_seen, 2);
        assert_eq!(first.copied, 1);
        assert_eq!(first.relocation_failed, 1);
        assert_eq!(first.links_found, 1);
        assert_eq!(first.links_missing, 1);
        assert_eq!(fx.tracked_rows(), 2);
        assert!(fx
            .destination
            .path()
            .join("organized/SBSP/2024/Março/1023 fieldrecording.wav")
            .exists());

        let mut store = fx.store();
        let mut driver = fx.driver(ScriptedSource::default(), 50);
        let second = driver.run(fx.source.path(), &mut store).await.unwrap();

        assert_eq!(second.already_tracked, 2);
        assert_eq!(second.copied, 0);
        assert_eq!(fx.tracked_rows(), 2);
        let source = driver.into_retriever().unwrap().into_source();
        assert!(source.calls.is_empty());
    }

    #[tokio::test]
    async fn missing_link_appends_exactly_one_row() {
        let fx = Fixture::new(&["1023 fieldrecording.wav"]);
        let mut store = fx.store();
        let mut driver = fx.driver(ScriptedSource::default(), 50);

        let summary = driver.run(fx.source.path(), &mut store).await.unwrap();

        assert_eq!(summary.links_missing, 1);
        assert_eq!(fx.tracked_rows(), 1);
        let source = driver.into_retriever().unwrap().into_source();
        assert_eq!(source.calls.len(), 3);
    }

    #[tokio::test]
    async fn budget_stops_an_error_prone_run() {
        let fx = Fixture::new(&["a.wav", "b.wav", "c.wav", "d.wav"]);
        let mut store = fx.store();
        let mut driver = fx.driver(ScriptedSource::default(), 2);

        let summary = driver.run(fx.source.path(), &mut store).await.unwrap();

        assert!(summary.aborted);
        assert_eq!(summary.invalid_names, 2);
        assert_eq!(summary.files_seen, 2);
        assert_eq!(driver.errors(), 2);
    }

    #[tokio::test]
    async fn zero_budget_never_aborts() {
        let fx = Fixture::new(&["a.wav", "b.wav", "c.wav"]);
        let mut store = fx.store();
        let mut driver = fx.driver(ScriptedSource::default(), 0);

        let summary = driver.run(fx.source.path(), &mut store).await.unwrap();

        assert!(!summary.aborted);
        assert_eq!(summary.invalid_names, 3);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let fx = Fixture::new(&["1023 fieldrecording.wav"]);
        let mut store = fx.store();
        let relocator = FileRelocator::new(
            fx.destination.path().join("organized"),
            MetadataResolver::new(&fx.records, &fx.airports, Locale::pt_BR),
            true,
        );
        let mut driver: BatchDriver<'_, _, ScriptedSource> =
            BatchDriver::new(Some(relocator), None, ErrorBudget::new(50));

        let summary = driver.run(fx.source.path(), &mut store).await.unwrap();

        assert_eq!(summary.files_seen, 1);
        assert_eq!(summary.copied, 0);
        assert!(!fx.destination.path().join("organized").exists());
        assert_eq!(fx.tracked_rows(), 0);
    }
}
