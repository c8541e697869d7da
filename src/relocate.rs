use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, debug};
use crate::error::PipelineError;
use crate::metadata::{AirportDirectory, MetadataResolver};
use crate::record::AudioRecord;
use crate::workbook::TrackingStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyTracked,
    AlreadyPresent,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Relocation {
    Skipped(SkipReason),
    Copied(PathBuf),
    /// Dry run: where the copy would have gone.
    Planned(PathBuf),
    Failed(String),
}

/// Copies recordings into `<root>/<airport>/<year>/<month>/`. Sources are never touched.
pub struct FileRelocator<'a, A: AirportDirectory> {
    destination_root: PathBuf,
    resolver: MetadataResolver<'a, A>,
    dry_run: bool,
}

impl<'a, A: AirportDirectory> FileRelocator<'a, A> {
    pub fn new(destination_root: impl Into<PathBuf>, resolver: MetadataResolver<'a, A>, dry_run: bool) -> Self {
        Self {
            destination_root: destination_root.into(),
            resolver,
            dry_run,
        }
    }

    pub async fn relocate(&self, record: &AudioRecord, tracked: &dyn TrackingStore) -> Relocation {
        if tracked.contains(record.identifier) {
            debug!("{} already in tracking table", record.identifier);
            return Relocation::Skipped(SkipReason::AlreadyTracked);
        }

        match self.copy_into_place(record).await {
            Ok(outcome) => outcome,
            Err(e) => Relocation::Failed(e.to_string()),
        }
    }

    async fn copy_into_place(&self, record: &AudioRecord) -> Result<Relocation, PipelineError> {
        let dir = self.resolver.resolve(record.identifier).await?.under(&self.destination_root);
        let target = dir.join(&record.filename);

        if self.dry_run {
            return Ok(Relocation::Planned(target));
        }

        fs::create_dir_all(&dir).await?;

        if fs::try_exists(&target).await? {
            debug!("Already in place: {}", target.display());
            return Ok(Relocation::Skipped(SkipReason::AlreadyPresent));
        }

        fs::copy(&record.source_path, &target).await?;
        verify_copy(&record.source_path, &target).await?;

        info!("Copied {} to {}", record.filename, dir.display());
        Ok(Relocation::Copied(target))
    }
}

async fn verify_copy(source: &Path, target: &Path) -> Result<(), PipelineError> {
    let copied = match fs::metadata(target).await {
        Ok(meta) => meta,
        Err(_) => return Err(PipelineError::Copy(target.to_path_buf())),
    };
    let original = fs::metadata(source).await?;
    if copied.len() != original.len() {
        return Err(PipelineError::Copy(target.to_path_buf()));
    }
    Ok(())
}
