// src/snapshot.rs

use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    array::ArrayRef,
    compute::{cast, concat_batches},
    csv::{reader::Format, ReaderBuilder},
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use std::{io::Cursor, sync::Arc};
use tracing::debug;

/// Delimiter used by every ANP price survey.
pub const ANP_DELIMITER: u8 = b';';

const CSV_BATCH_SIZE: usize = 8192;

/// An in-memory table of opaque text rows.
///
/// Every column is a nullable `Utf8` column named after the CSV header, so
/// snapshots from different cycles always share a type layout and can be
/// compared and concatenated cell by cell.
#[derive(Clone, Debug)]
pub struct Snapshot {
    batch: RecordBatch,
}

impl Snapshot {
    /// Parse a delimited UTF-8 CSV body with a header row.
    pub fn from_csv(body: &[u8], delimiter: u8) -> Result<Self> {
        let text = std::str::from_utf8(body).context("CSV body is not valid UTF-8")?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        if text.trim().is_empty() {
            bail!("CSV body is empty");
        }

        let format = Format::default()
            .with_header(true)
            .with_delimiter(delimiter)
            .with_quote(b'"');

        // Only the header is read here; types are forced to Utf8 below.
        let (inferred, _) = format
            .infer_schema(Cursor::new(text.as_bytes()), Some(0))
            .context("reading CSV header")?;
        let fields: Vec<Field> = inferred
            .fields()
            .iter()
            .map(|f| Field::new(f.name().trim(), DataType::Utf8, true))
            .collect();
        if fields.is_empty() || fields.iter().all(|f| f.name().is_empty()) {
            bail!("CSV header has no columns");
        }
        let schema: SchemaRef = Arc::new(Schema::new(fields));

        let reader = ReaderBuilder::new(schema.clone())
            .with_header(true)
            .with_delimiter(delimiter)
            .with_quote(b'"')
            .with_batch_size(CSV_BATCH_SIZE)
            .build(Cursor::new(text.as_bytes()))
            .context("creating CSV reader")?;

        let batches = reader
            .collect::<Result<Vec<_>, _>>()
            .context("reading CSV rows")?;
        let batch = concat_batches(&schema, &batches).context("joining CSV batches")?;

        debug!(
            columns = batch.num_columns(),
            rows = batch.num_rows(),
            "parsed CSV snapshot"
        );
        Ok(Self { batch })
    }

    /// Wrap an existing batch, casting every column to nullable `Utf8`.
    pub fn from_batch(batch: RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let already_text = schema
            .fields()
            .iter()
            .all(|f| f.data_type() == &DataType::Utf8 && f.is_nullable());
        if already_text && schema.metadata().is_empty() {
            return Ok(Self { batch });
        }

        let fields: Vec<Field> = schema
            .fields()
            .iter()
            .map(|f| Field::new(f.name(), DataType::Utf8, true))
            .collect();
        let columns = batch
            .columns()
            .iter()
            .zip(schema.fields())
            .map(|(col, field)| {
                cast(col, &DataType::Utf8)
                    .with_context(|| format!("casting column `{}` to Utf8", field.name()))
            })
            .collect::<Result<Vec<ArrayRef>>>()?;

        debug!("normalised batch columns to Utf8");
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
            .context("rebuilding batch as text columns")?;
        Ok(Self { batch })
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Same columns (name and type, in order) and the same cells in the same order.
    pub fn same_content(&self, other: &Snapshot) -> bool {
        let (a, b) = (self.batch.schema(), other.batch.schema());
        a.fields().len() == b.fields().len()
            && a
                .fields()
                .iter()
                .zip(b.fields())
                .all(|(x, y)| x.name() == y.name() && x.data_type() == y.data_type())
            && self.batch.num_rows() == other.batch.num_rows()
            && self
                .batch
                .columns()
                .iter()
                .zip(other.batch.columns())
                .all(|(x, y)| x.to_data() == y.to_data())
    }

    /// Rows of `self` followed by rows of `tail`. Column names must match.
    pub fn concat(&self, tail: &Snapshot) -> Result<Snapshot> {
        let head_cols = self.column_names();
        let tail_cols = tail.column_names();
        if head_cols != tail_cols {
            return Err(anyhow!(
                "schema drift: archive columns {:?} do not match snapshot columns {:?}",
                head_cols,
                tail_cols
            ));
        }

        let schema = self.batch.schema();
        let batch = concat_batches(&schema, [&self.batch, &tail.batch])
            .context("concatenating archive and snapshot")?;
        Ok(Snapshot { batch })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};

    const SAMPLE: &str = "Regiao - Sigla;Estado - Sigla;Municipio;Produto;Valor de Venda\n\
                          SE;SP;CAMPINAS;GLP;\"105,00\"\n\
                          N;PA;BELEM;GLP;110,50\n";

    fn column(snapshot: &Snapshot, idx: usize) -> Vec<Option<String>> {
        let arr = snapshot
            .batch()
            .column(idx)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        arr.iter().map(|v| v.map(str::to_string)).collect()
    }

    #[test]
    fn test_parse_semicolon_csv() {
        let snap = Snapshot::from_csv(SAMPLE.as_bytes(), ANP_DELIMITER).unwrap();
        assert_eq!(snap.num_rows(), 2);
        assert_eq!(
            snap.column_names(),
            vec![
                "Regiao - Sigla",
                "Estado - Sigla",
                "Municipio",
                "Produto",
                "Valor de Venda"
            ]
        );
        assert!(snap
            .schema()
            .fields()
            .iter()
            .all(|f| f.data_type() == &DataType::Utf8));
        assert_eq!(
            column(&snap, 4),
            vec![Some("105,00".to_string()), Some("110,50".to_string())]
        );
    }

    #[test]
    fn test_parse_bom_quotes_and_empty_cells() {
        let body = "\u{feff}Revenda;Complemento;Bandeira\n\"POSTO A; LTDA\";;BRANCA\n";
        let snap = Snapshot::from_csv(body.as_bytes(), ANP_DELIMITER).unwrap();
        assert_eq!(snap.column_names(), vec!["Revenda", "Complemento", "Bandeira"]);
        assert_eq!(column(&snap, 0), vec![Some("POSTO A; LTDA".to_string())]);
        assert_eq!(snap.num_rows(), 1);
    }

    #[test]
    fn test_header_only_is_empty_snapshot() {
        let snap = Snapshot::from_csv(b"a;b;c\n", ANP_DELIMITER).unwrap();
        assert_eq!(snap.num_rows(), 0);
        assert_eq!(snap.column_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_malformed_bodies_fail() {
        assert!(Snapshot::from_csv(b"", ANP_DELIMITER).is_err());
        assert!(Snapshot::from_csv(b"  \n", ANP_DELIMITER).is_err());
        assert!(Snapshot::from_csv(&[0xff, 0xfe, b';'], ANP_DELIMITER).is_err());
        // ragged row
        assert!(Snapshot::from_csv(b"a;b\n1;2;3\n", ANP_DELIMITER).is_err());
    }

    #[test]
    fn test_same_content_is_order_sensitive() {
        let a = Snapshot::from_csv(b"k;v\n1;x\n2;y\n", ANP_DELIMITER).unwrap();
        let same = Snapshot::from_csv(b"k;v\n1;x\n2;y\n", ANP_DELIMITER).unwrap();
        let reordered = Snapshot::from_csv(b"k;v\n2;y\n1;x\n", ANP_DELIMITER).unwrap();
        let renamed = Snapshot::from_csv(b"k;w\n1;x\n2;y\n", ANP_DELIMITER).unwrap();
        let shorter = Snapshot::from_csv(b"k;v\n1;x\n", ANP_DELIMITER).unwrap();

        assert!(a.same_content(&same));
        assert!(!a.same_content(&reordered));
        assert!(!a.same_content(&renamed));
        assert!(!a.same_content(&shorter));
    }

    #[test]
    fn test_concat_keeps_order_and_duplicates() {
        let head = Snapshot::from_csv(b"k;v\n1;x\n2;y\n", ANP_DELIMITER).unwrap();
        let tail = Snapshot::from_csv(b"k;v\n2;y\n3;z\n", ANP_DELIMITER).unwrap();
        let merged = head.concat(&tail).unwrap();
        assert_eq!(merged.num_rows(), 4);
        assert_eq!(
            column(&merged, 0),
            vec![
                Some("1".to_string()),
                Some("2".to_string()),
                Some("2".to_string()),
                Some("3".to_string())
            ]
        );
    }

    #[test]
    fn test_concat_rejects_schema_drift() {
        let head = Snapshot::from_csv(b"k;v\n1;x\n", ANP_DELIMITER).unwrap();
        let tail = Snapshot::from_csv(b"k;v;extra\n1;x;!\n", ANP_DELIMITER).unwrap();
        let err = head.concat(&tail).unwrap_err();
        assert!(err.to_string().contains("schema drift"));
    }

    #[test]
    fn test_from_batch_casts_to_text() {
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, false)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![7, 8]))]).unwrap();
        let snap = Snapshot::from_batch(batch).unwrap();
        assert_eq!(snap.schema().field(0).data_type(), &DataType::Utf8);
        assert!(snap.schema().field(0).is_nullable());
        assert_eq!(
            column(&snap, 0),
            vec![Some("7".to_string()), Some("8".to_string())]
        );
    }
}
