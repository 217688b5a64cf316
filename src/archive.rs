// src/archive.rs

use anyhow::{Context, Result};
use arrow::compute::concat_batches;
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::{BrotliLevel, Compression},
    file::properties::WriterProperties,
};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::snapshot::Snapshot;

const READ_BATCH_SIZE: usize = 8192;

/// A single append-only Parquet file holding every row ever ingested for one family.
pub struct Archive {
    path: PathBuf,
}

impl Archive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the whole archive, or `None` if the file does not exist yet.
    pub fn load(&self) -> Result<Option<Snapshot>> {
        if !self.exists() {
            return Ok(None);
        }

        let file = File::open(&self.path)
            .with_context(|| format!("opening archive `{}`", self.path.display()))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("reading parquet metadata of `{}`", self.path.display()))?;
        let schema = builder.schema().clone();
        let reader = builder
            .with_batch_size(READ_BATCH_SIZE)
            .build()
            .with_context(|| format!("building reader for `{}`", self.path.display()))?;

        let batches = reader
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("reading batches from `{}`", self.path.display()))?;
        let batch = concat_batches(&schema, &batches)
            .with_context(|| format!("joining batches of `{}`", self.path.display()))?;

        debug!(
            path = %self.path.display(),
            rows = batch.num_rows(),
            "loaded archive"
        );
        Snapshot::from_batch(batch).map(Some)
    }

    /// Replace the archive with `snapshot`, atomically.
    ///
    /// Writes `.<name>.tmp` next to the target, syncs it, then renames it over
    /// the archive so readers never see a half-written file.
    pub fn persist(&self, snapshot: &Snapshot) -> Result<u64> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating archive directory `{}`", dir.display()))?;

        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("archive path `{}` has no file name", self.path.display()))?;
        let tmp_path = dir.join(format!(".{}.tmp", file_name));

        if let Err(e) = write_parquet(&tmp_path, snapshot) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e).with_context(|| {
                format!(
                    "renaming `{}` → `{}`",
                    tmp_path.display(),
                    self.path.display()
                )
            });
        }

        let size = fs::metadata(&self.path)
            .context("getting archive metadata")?
            .len();
        debug!(path = %self.path.display(), bytes = size, "persisted archive");
        Ok(size)
    }
}

/// Write `snapshot` to `path` as Brotli-compressed Parquet and fsync it.
fn write_parquet(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let props = WriterProperties::builder()
        .set_compression(Compression::BROTLI(BrotliLevel::try_new(5)?))
        .build();

    let file = File::create(path).with_context(|| format!("creating `{}`", path.display()))?;
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), snapshot.schema(), Some(props))
        .context("creating parquet writer")?;
    writer
        .write(snapshot.batch())
        .context("writing archive batch")?;
    let buf = writer.into_inner().context("finishing parquet file")?;
    let file = buf
        .into_inner()
        .map_err(|e| e.into_error())
        .context("flushing archive")?;
    file.sync_all().context("syncing archive")?;
    Ok(())
}
