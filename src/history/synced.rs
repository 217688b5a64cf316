use anyhow::{anyhow, Result};
use arrow::{
    array::{Array, ArrayRef, Date32Array, StringArray, TimestampMicrosecondArray, UInt64Array},
    datatypes::{DataType as ArrowDataType, Date32Type, Field, Schema as ArrowSchema, TimeUnit},
    record_batch::RecordBatch,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::{path::PathBuf, sync::Arc};

use crate::family::Family;
use crate::history::table_history::{HistoryRow, TableHistory};

/// How one family's sync ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncOutcome {
    Appended,
    Unchanged,
    DownloadFailed,
    Failed,
}

impl SyncOutcome {
    pub const ALL: [SyncOutcome; 4] = [
        SyncOutcome::Appended,
        SyncOutcome::Unchanged,
        SyncOutcome::DownloadFailed,
        SyncOutcome::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Appended => "appended",
            SyncOutcome::Unchanged => "unchanged",
            SyncOutcome::DownloadFailed => "download-failed",
            SyncOutcome::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "appended" => Some(SyncOutcome::Appended),
            "unchanged" => Some(SyncOutcome::Unchanged),
            "download-failed" => Some(SyncOutcome::DownloadFailed),
            "failed" => Some(SyncOutcome::Failed),
            _ => None,
        }
    }

    /// Appended and unchanged both leave the archive current.
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Appended | SyncOutcome::Unchanged)
    }
}

pub struct SyncRow {
    pub family: Family,
    pub run_date: NaiveDate,
    pub outcome: SyncOutcome,
    pub rows_fetched: u64,
    pub archive_rows: u64,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
}

fn sync_key(family: &str, run_date: NaiveDate, outcome: &str) -> String {
    format!("{}--{}--{}", family, run_date.format("%Y%m%d"), outcome)
}

impl HistoryRow for SyncRow {
    fn partition_date(&self) -> NaiveDate {
        self.run_date
    }

    fn schema() -> ArrowSchema {
        ArrowSchema::new(vec![
            Field::new("family", ArrowDataType::Utf8, false),
            Field::new("run_date", ArrowDataType::Date32, false),
            Field::new("outcome", ArrowDataType::Utf8, false),
            Field::new("rows_fetched", ArrowDataType::UInt64, false),
            Field::new("archive_rows", ArrowDataType::UInt64, false),
            Field::new(
                "started",
                ArrowDataType::Timestamp(TimeUnit::Microsecond, None),
                false,
            ),
            Field::new(
                "finished",
                ArrowDataType::Timestamp(TimeUnit::Microsecond, None),
                false,
            ),
        ])
    }

    fn to_arrays(&self) -> Vec<ArrayRef> {
        vec![
            Arc::new(StringArray::from(vec![self.family.as_str()])),
            Arc::new(Date32Array::from(vec![Date32Type::from_naive_date(self.run_date)])),
            Arc::new(StringArray::from(vec![self.outcome.as_str()])),
            Arc::new(UInt64Array::from(vec![self.rows_fetched])),
            Arc::new(UInt64Array::from(vec![self.archive_rows])),
            Arc::new(TimestampMicrosecondArray::from(vec![self
                .started
                .timestamp_micros()])),
            Arc::new(TimestampMicrosecondArray::from(vec![self
                .finished
                .timestamp_micros()])),
        ]
    }

    fn unique_key(&self) -> String {
        sync_key(self.family.as_str(), self.run_date, self.outcome.as_str())
    }

    fn extract_key(batch: &RecordBatch, row: usize) -> Result<String> {
        let family = batch
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| anyhow!("history column `family` is not Utf8"))?;
        let run_date = batch
            .column(1)
            .as_any()
            .downcast_ref::<Date32Array>()
            .ok_or_else(|| anyhow!("history column `run_date` is not Date32"))?;
        let outcome = batch
            .column(2)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| anyhow!("history column `outcome` is not Utf8"))?;

        if run_date.is_null(row) {
            return Err(anyhow!("history row {} has no run_date", row));
        }
        let date = run_date
            .value_as_date(row)
            .ok_or_else(|| anyhow!("history row {} has an invalid run_date", row))?;
        let family = Family::from_str(family.value(row))
            .ok_or_else(|| anyhow!("history row {} has unknown family `{}`", row, family.value(row)))?;
        let outcome = SyncOutcome::from_str(outcome.value(row))
            .ok_or_else(|| anyhow!("history row {} has unknown outcome `{}`", row, outcome.value(row)))?;
        Ok(sync_key(family.as_str(), date, outcome.as_str()))
    }
}

impl TableHistory<SyncRow> {
    pub fn new_synced(base: impl Into<PathBuf>) -> Result<Self> {
        TableHistory::new(base, "synced")
    }

    /// True if `family` ended appended or unchanged on `date`.
    pub fn synced_on(&self, family: Family, date: NaiveDate) -> bool {
        SyncOutcome::ALL
            .iter()
            .filter(|o| o.is_success())
            .any(|o| self.get(&sync_key(family.as_str(), date, o.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_round_trip() {
        for o in SyncOutcome::ALL {
            assert_eq!(SyncOutcome::from_str(o.as_str()), Some(o));
        }
        assert!(SyncOutcome::Unchanged.is_success());
        assert!(!SyncOutcome::DownloadFailed.is_success());
    }

    #[test]
    fn test_key_survives_arrow_encoding() {
        let now = Utc::now();
        let row = SyncRow {
            family: Family::DieselCng,
            run_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            outcome: SyncOutcome::Unchanged,
            rows_fetched: 12,
            archive_rows: 40,
            started: now,
            finished: now,
        };
        let batch = RecordBatch::try_new(Arc::new(SyncRow::schema()), row.to_arrays()).unwrap();
        assert_eq!(SyncRow::extract_key(&batch, 0).unwrap(), row.unique_key());
        assert_eq!(row.unique_key(), "diesel-cng--20240310--unchanged");
    }

    #[test]
    fn test_unknown_outcome_is_rejected() {
        let now = Utc::now();
        let row = SyncRow {
            family: Family::Lpg,
            run_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            outcome: SyncOutcome::Appended,
            rows_fetched: 1,
            archive_rows: 1,
            started: now,
            finished: now,
        };
        let mut arrays = row.to_arrays();
        arrays[2] = Arc::new(StringArray::from(vec!["exploded"]));
        let batch = RecordBatch::try_new(Arc::new(SyncRow::schema()), arrays).unwrap();
        let err = SyncRow::extract_key(&batch, 0).unwrap_err();
        assert!(err.to_string().contains("unknown outcome"));
    }
}
