//! The audit ledger: one row per visited folder, rewritten in full after
//! every update so an interrupted run leaves a readable table behind.

use arrow::array::{Array, ArrayRef, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReader;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::ledger::{ArrowSnafu, CsvSnafu, IOSnafu, ParquetSnafu};
use crate::errors::LedgerError;
use crate::layout::SegmentKind;

const BATCH_SIZE: usize = 1024;

pub const COLUMNS: [&str; 13] = [
    "index",
    "f1",
    "f2",
    "f3",
    "Exception",
    "ct_name",
    "ct",
    "seg",
    "AAO",
    "BCT",
    "DAO",
    "LCCA",
    "LSA",
];

/// Outcome labels recorded in the `Exception` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exception {
    #[serde(rename = "Folder Error")]
    FolderError,
    #[serde(rename = "No Expected CT")]
    NoExpectedCt,
    #[serde(rename = "Too many Seg")]
    TooManySeg,
    #[serde(rename = "Miss Seg")]
    MissSeg,
    #[serde(rename = "Load Data Error")]
    LoadDataError,
    #[serde(rename = "Load Data Error 2")]
    LoadDataError2,
    #[serde(rename = "Folder Error solved")]
    FolderErrorSolved,
    #[serde(rename = "Folder Error to No expected CT")]
    FolderErrorToNoExpectedCt,
    #[serde(rename = "Folder Error to load error")]
    FolderErrorToLoadError,
    #[serde(rename = "No Expected CT solved")]
    NoExpectedCtSolved,
    #[serde(rename = "No Expected CT to load error")]
    NoExpectedCtToLoadError,
}

impl Exception {
    pub const ALL: [Exception; 11] = [
        Exception::FolderError,
        Exception::NoExpectedCt,
        Exception::TooManySeg,
        Exception::MissSeg,
        Exception::LoadDataError,
        Exception::LoadDataError2,
        Exception::FolderErrorSolved,
        Exception::FolderErrorToNoExpectedCt,
        Exception::FolderErrorToLoadError,
        Exception::NoExpectedCtSolved,
        Exception::NoExpectedCtToLoadError,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Exception::FolderError => "Folder Error",
            Exception::NoExpectedCt => "No Expected CT",
            Exception::TooManySeg => "Too many Seg",
            Exception::MissSeg => "Miss Seg",
            Exception::LoadDataError => "Load Data Error",
            Exception::LoadDataError2 => "Load Data Error 2",
            Exception::FolderErrorSolved => "Folder Error solved",
            Exception::FolderErrorToNoExpectedCt => "Folder Error to No expected CT",
            Exception::FolderErrorToLoadError => "Folder Error to load error",
            Exception::NoExpectedCtSolved => "No Expected CT solved",
            Exception::NoExpectedCtToLoadError => "No Expected CT to load error",
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Exception {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Exception::ALL
            .into_iter()
            .find(|e| e.label() == s)
            .ok_or_else(|| LedgerError::UnknownException {
                label: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub index: u64,
    pub f1: String,
    pub f2: Option<String>,
    pub f3: Option<String>,
    #[serde(rename = "Exception")]
    pub exception: Option<Exception>,
    pub ct_name: Option<String>,
    pub ct: Option<String>,
    pub seg: Option<String>,
    #[serde(rename = "AAO")]
    pub aao: Option<String>,
    #[serde(rename = "BCT")]
    pub bct: Option<String>,
    #[serde(rename = "DAO")]
    pub dao: Option<String>,
    #[serde(rename = "LCCA")]
    pub lcca: Option<String>,
    #[serde(rename = "LSA")]
    pub lsa: Option<String>,
}

impl LedgerRow {
    pub fn new<S: Into<String>>(f1: S, f2: Option<S>, f3: Option<S>) -> Self {
        Self {
            f1: f1.into(),
            f2: f2.map(Into::into),
            f3: f3.map(Into::into),
            ..Default::default()
        }
    }

    pub fn with_exception(self, exception: Exception) -> Self {
        Self {
            exception: Some(exception),
            ..self
        }
    }

    pub fn key(&self) -> (&str, Option<&str>, Option<&str>) {
        (self.f1.as_str(), self.f2.as_deref(), self.f3.as_deref())
    }

    pub fn segment(&self, kind: SegmentKind) -> Option<&str> {
        match kind {
            SegmentKind::Seg => self.seg.as_deref(),
            SegmentKind::Aao => self.aao.as_deref(),
            SegmentKind::Bct => self.bct.as_deref(),
            SegmentKind::Dao => self.dao.as_deref(),
            SegmentKind::Lcca => self.lcca.as_deref(),
            SegmentKind::Lsa => self.lsa.as_deref(),
        }
    }

    pub fn set_segment(&mut self, kind: SegmentKind, counts: Option<String>) {
        let field = match kind {
            SegmentKind::Seg => &mut self.seg,
            SegmentKind::Aao => &mut self.aao,
            SegmentKind::Bct => &mut self.bct,
            SegmentKind::Dao => &mut self.dao,
            SegmentKind::Lcca => &mut self.lcca,
            SegmentKind::Lsa => &mut self.lsa,
        };
        *field = counts;
    }

    /// Drop everything but the index and folder components.
    pub fn clear_results(&mut self) {
        *self = Self {
            index: self.index,
            f1: std::mem::take(&mut self.f1),
            f2: self.f2.take(),
            f3: self.f3.take(),
            ..Default::default()
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerFormat {
    Csv,
    Parquet,
}

impl LedgerFormat {
    pub fn from_extension(path: &Path) -> Result<Self, LedgerError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("csv") => Ok(LedgerFormat::Csv),
            Some("parquet") => Ok(LedgerFormat::Parquet),
            _ => Err(LedgerError::InvalidExtension {
                path: path.to_path_buf(),
                supported: vec!["csv", "parquet"],
            }),
        }
    }
}

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    format: LedgerFormat,
    rows: Vec<LedgerRow>,
}

impl Ledger {
    /// Start an empty ledger, writing the header immediately.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let format = LedgerFormat::from_extension(&path)?;
        let ledger = Self {
            path,
            format,
            rows: Vec::new(),
        };
        ledger.persist()?;
        Ok(ledger)
    }

    /// Load an existing ledger.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let format = LedgerFormat::from_extension(&path)?;
        let rows = match format {
            LedgerFormat::Csv => read_csv(&path)?,
            LedgerFormat::Parquet => read_parquet(&path)?,
        };
        tracing::debug!("Opened ledger {} with {} rows", path.display(), rows.len());
        Ok(Self { path, format, rows })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row, assigning the next index. Returns the row position.
    pub fn push(&mut self, mut row: LedgerRow) -> usize {
        row.index = self.rows.len() as u64;
        self.rows.push(row);
        self.rows.len() - 1
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut LedgerRow> {
        self.rows.get_mut(position)
    }

    /// Positions of all rows carrying the given exception.
    pub fn rows_with(&self, exception: Exception) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.exception == Some(exception))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn contains(&self, f1: &str, f2: Option<&str>, f3: Option<&str>) -> bool {
        self.rows.iter().any(|row| row.key() == (f1, f2, f3))
    }

    /// Rewrite the whole table through a temporary sibling file.
    pub fn persist(&self) -> Result<(), LedgerError> {
        let tmp = self.temporary_path();
        match self.format {
            LedgerFormat::Csv => write_csv(&self.rows, &tmp)?,
            LedgerFormat::Parquet => write_parquet(&self.rows, &tmp)?,
        }
        std::fs::rename(&tmp, &self.path).context(IOSnafu { path: &self.path })?;
        Ok(())
    }

    fn temporary_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path.with_file_name(format!(".{name}.tmp"))
    }
}

fn write_csv(rows: &[LedgerRow], dest: &Path) -> Result<(), LedgerError> {
    // Header is written by hand so an empty ledger still has one
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(dest)
        .context(CsvSnafu { path: dest })?;
    writer
        .write_record(COLUMNS)
        .context(CsvSnafu { path: dest })?;
    for row in rows {
        writer.serialize(row).context(CsvSnafu { path: dest })?;
    }
    writer.flush().context(IOSnafu { path: dest })?;
    Ok(())
}

fn read_csv(path: &Path) -> Result<Vec<LedgerRow>, LedgerError> {
    let mut reader = csv::Reader::from_path(path).context(CsvSnafu { path })?;
    reader
        .deserialize::<LedgerRow>()
        .map(|result| result.context(CsvSnafu { path }))
        .collect()
}

fn string_column<'a, F>(rows: &'a [LedgerRow], f: F) -> ArrayRef
where
    F: Fn(&'a LedgerRow) -> Option<&'a str>,
{
    Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<_>>()))
}

fn write_parquet(rows: &[LedgerRow], dest: &Path) -> Result<(), LedgerError> {
    let mut fields = vec![
        Field::new("index", DataType::UInt64, false),
        Field::new("f1", DataType::Utf8, false),
    ];
    fields.extend(
        COLUMNS[2..]
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, true)),
    );
    let schema = Arc::new(Schema::new(fields));

    let index: ArrayRef = Arc::new(UInt64Array::from(
        rows.iter().map(|r| r.index).collect::<Vec<_>>(),
    ));
    let f1: ArrayRef = Arc::new(StringArray::from(
        rows.iter().map(|r| r.f1.as_str()).collect::<Vec<_>>(),
    ));
    let mut columns = vec![
        index,
        f1,
        string_column(rows, |r| r.f2.as_deref()),
        string_column(rows, |r| r.f3.as_deref()),
        string_column(rows, |r| r.exception.map(|e| e.label())),
        string_column(rows, |r| r.ct_name.as_deref()),
        string_column(rows, |r| r.ct.as_deref()),
    ];
    for kind in SegmentKind::ALL {
        columns.push(string_column(rows, move |r| r.segment(kind)));
    }

    let batch = RecordBatch::try_new(schema, columns).context(ArrowSnafu)?;
    let file = File::create(dest).context(IOSnafu { path: dest })?;
    let props = WriterProperties::builder().build();
    let mut writer =
        ArrowWriter::try_new(file, batch.schema(), Some(props)).context(ParquetSnafu)?;
    writer.write(&batch).context(ParquetSnafu)?;
    writer.close().context(ParquetSnafu)?;
    Ok(())
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &'static str) -> Result<&'a T, LedgerError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or(LedgerError::MissingColumn { name })
}

fn optional(array: &StringArray, i: usize) -> Option<String> {
    if array.is_null(i) {
        None
    } else {
        Some(array.value(i).to_string())
    }
}

fn read_parquet(path: &Path) -> Result<Vec<LedgerRow>, LedgerError> {
    let file = File::open(path).context(IOSnafu { path })?;
    let reader = ParquetRecordBatchReader::try_new(file, BATCH_SIZE).context(ParquetSnafu)?;
    let mut rows = Vec::new();

    for result in reader {
        let batch = result.context(ArrowSnafu)?;
        let index = column::<UInt64Array>(&batch, "index")?;
        let f1 = column::<StringArray>(&batch, "f1")?;
        let f2 = column::<StringArray>(&batch, "f2")?;
        let f3 = column::<StringArray>(&batch, "f3")?;
        let exception = column::<StringArray>(&batch, "Exception")?;
        let ct_name = column::<StringArray>(&batch, "ct_name")?;
        let ct = column::<StringArray>(&batch, "ct")?;
        let segments = SegmentKind::ALL
            .iter()
            .map(|kind| Ok((*kind, column::<StringArray>(&batch, kind.name())?)))
            .collect::<Result<Vec<_>, LedgerError>>()?;

        for i in 0..batch.num_rows() {
            let mut row = LedgerRow {
                index: index.value(i),
                f1: f1.value(i).to_string(),
                f2: optional(f2, i),
                f3: optional(f3, i),
                exception: optional(exception, i)
                    .map(|label| label.parse::<Exception>())
                    .transpose()?,
                ct_name: optional(ct_name, i),
                ct: optional(ct, i),
                ..Default::default()
            };
            for (kind, array) in segments.iter() {
                row.set_segment(*kind, optional(array, i));
            }
            rows.push(row);
        }
    }
    Ok(rows)
}
