use anyhow::{Context, Result};
use arrow::{array::ArrayRef, datatypes::Schema as ArrowSchema, record_batch::RecordBatch};
use chrono::{NaiveDate, Utc};
use glob::glob;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use std::{
    collections::HashSet,
    fs::{self, File},
    io::BufWriter,
    marker::PhantomData,
    path::PathBuf,
    sync::Arc,
};
use tracing::debug;

const CONSOLIDATED: &str = "consolidated.parquet";

/// Trait representing a row in the history table.
/// - Defines schema, to_arrays, unique_key for writes.
/// - Provides a key extractor for scanning existing files.
pub trait HistoryRow: Sized {
    /// Partition date (UTC naive) for hive partitioning
    fn partition_date(&self) -> NaiveDate;
    /// Arrow schema for this row type
    fn schema() -> ArrowSchema;
    /// Convert this row into column arrays matching the schema
    fn to_arrays(&self) -> Vec<ArrayRef>;
    /// Unique dedupe key for this row (used when writing)
    fn unique_key(&self) -> String;
    /// Extract unique key from an existing batch row (for scanning)
    fn extract_key(batch: &RecordBatch, row: usize) -> Result<String>;
}

/// Generic hive-partitioned history table.
///
/// Layout: `<base>/<table>/date=YYYYMMDD/<key>---<ts>.parquet`.
pub struct TableHistory<R: HistoryRow> {
    base_dir: PathBuf,
    table: String,
    schema: Arc<ArrowSchema>,
    seen: HashSet<String>,
    _marker: PhantomData<R>,
}

impl<R: HistoryRow> TableHistory<R> {
    /// Scan existing data into `seen`. Nothing is created on disk until the first `add`.
    pub fn new(base_dir: impl Into<PathBuf>, table: &str) -> Result<Self> {
        let base_dir = base_dir.into();
        let table_dir = base_dir.join(table);
        let schema = Arc::new(R::schema());
        let mut seen = HashSet::new();

        if table_dir.is_dir() {
            for part in fs::read_dir(&table_dir)
                .with_context(|| format!("listing `{}`", table_dir.display()))?
            {
                let part = part?;
                if !part.file_type()?.is_dir() {
                    continue;
                }
                let part_dir = part.path();
                for entry in glob(&format!("{}/*.parquet", part_dir.display()))? {
                    let path = entry?;
                    let file = File::open(&path)
                        .with_context(|| format!("failed to open `{}`", path.display()))?;
                    let mut reader = ParquetRecordBatchReaderBuilder::try_new(file)?
                        .with_batch_size(1024)
                        .build()?;
                    while let Some(batch) = reader.next().transpose()? {
                        for i in 0..batch.num_rows() {
                            seen.insert(R::extract_key(&batch, i)?);
                        }
                    }
                }
            }
        }

        debug!(table, keys = seen.len(), "loaded history");
        Ok(Self {
            base_dir,
            table: table.to_string(),
            schema,
            seen,
            _marker: PhantomData,
        })
    }

    /// Add a new row of type R. Returns `false` if its key was already recorded.
    pub fn add(&mut self, row: &R) -> Result<bool> {
        let key = row.unique_key();
        if self.seen.contains(&key) {
            return Ok(false);
        }

        let date = row.partition_date();
        let arrays = row.to_arrays();
        let partition = format!("date={}", date.format("%Y%m%d"));
        let dir = self.base_dir.join(&self.table).join(partition);
        fs::create_dir_all(&dir)
            .with_context(|| format!("could not create `{}`", dir.display()))?;

        let ts = Utc::now().timestamp_micros();
        let fname = format!("{}---{}.parquet", key, ts);
        let tmp = dir.join(format!("{}.tmp", fname));
        let final_path = dir.join(&fname);

        let file = File::create(&tmp)?;
        let mut writer = ArrowWriter::try_new(BufWriter::new(file), self.schema.clone(), None)?;
        let batch = RecordBatch::try_new(self.schema.clone(), arrays)?;
        writer.write(&batch)?;
        writer.close()?;
        fs::rename(&tmp, &final_path)?;

        self.seen.insert(key);
        Ok(true)
    }

    /// Check if a row exists by its dedupe key
    pub fn get(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    /// Vacuum each partition into one consolidated file
    pub fn vacuum(&self) -> Result<()> {
        let table_dir = self.base_dir.join(&self.table);
        if !table_dir.is_dir() {
            return Ok(());
        }
        for part in fs::read_dir(&table_dir)? {
            let part = part?;
            if !part.file_type()?.is_dir() {
                continue;
            }
            let dir = part.path();

            let files = glob(&format!("{}/*.parquet", dir.display()))?
                .filter_map(Result::ok)
                .collect::<Vec<_>>();
            let already_compact = files.len() == 1
                && files[0].file_name().and_then(|n| n.to_str()) == Some(CONSOLIDATED);
            if files.is_empty() || already_compact {
                continue;
            }

            let tmp = dir.join(format!("{}.tmp", CONSOLIDATED));
            let file = File::create(&tmp)?;
            let mut writer = ArrowWriter::try_new(BufWriter::new(file), self.schema.clone(), None)?;

            for p in &files {
                let f = File::open(p)?;
                let mut reader = ParquetRecordBatchReaderBuilder::try_new(f)?
                    .with_batch_size(1024)
                    .build()?;
                while let Some(batch) = reader.next().transpose()? {
                    writer.write(&batch)?;
                }
            }
            writer.close()?;
            fs::rename(&tmp, dir.join(CONSOLIDATED))?;

            for p in files {
                if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
                    if name != CONSOLIDATED {
                        fs::remove_file(&p)?;
                    }
                }
            }
            debug!(partition = %dir.display(), "vacuumed history partition");
        }
        Ok(())
    }
}
