use arrow::error::ArrowError;
use parquet::errors::ParquetError;
pub use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LedgerError {
    #[snafu(display("IO error on ledger {}: {:?}", path.display(), source))]
    IOError {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("CSV error on ledger {}: {:?}", path.display(), source))]
    Csv {
        path: PathBuf,
        #[snafu(source(from(csv::Error, Box::new)))]
        source: Box<csv::Error>,
    },

    #[snafu(display("Arrow error: {:?}", source))]
    Arrow {
        #[snafu(source(from(ArrowError, Box::new)))]
        source: Box<ArrowError>,
    },

    #[snafu(display("Parquet error: {:?}", source))]
    Parquet {
        #[snafu(source(from(ParquetError, Box::new)))]
        source: Box<ParquetError>,
    },

    #[snafu(display("Invalid ledger extension for {}, supported extensions: {}", path.display(), supported.join(", ")))]
    InvalidExtension {
        path: PathBuf,
        supported: Vec<&'static str>,
    },

    #[snafu(display("Ledger column '{}' is missing or has the wrong type", name))]
    MissingColumn { name: &'static str },

    #[snafu(display("Unknown exception label '{}'", label))]
    UnknownException { label: String },
}
