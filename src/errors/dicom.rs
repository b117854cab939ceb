use dicom::core::value::{CastValueError, ConvertValueError};
use dicom::object::ReadError;
pub use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DicomError {
    #[snafu(display("error reading DICOM file {}: {:?}", path.display(), source))]
    ReadError {
        path: PathBuf,
        #[snafu(source(from(ReadError, Box::new)))]
        source: Box<ReadError>,
    },

    #[snafu(display("IO error on {}", path.display()))]
    IOError {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("missing DICOM property: {}", name))]
    MissingPropertyError { name: &'static str },

    #[snafu(display("unable to cast DICOM property value '{}': {:?}", name, source))]
    CastValueError {
        name: &'static str,
        #[snafu(source(from(CastValueError, Box::new)))]
        source: Box<CastValueError>,
    },

    #[snafu(display("unable to convert DICOM property value '{}': {:?}", name, source))]
    ConvertValueError {
        name: &'static str,
        #[snafu(source(from(ConvertValueError, Box::new)))]
        source: Box<ConvertValueError>,
    },

    #[snafu(display("invalid DICOM property value '{}': {}", name, value))]
    InvalidValueError { name: &'static str, value: String },

    #[snafu(display("error processing DICOM pixel data: {:?}", source))]
    PixelDataError {
        #[snafu(source(from(dicom::pixeldata::Error, Box::new)))]
        source: Box<dicom::pixeldata::Error>,
    },

    #[snafu(display("no DICOM series found in {}", path.display()))]
    NoSeries { path: PathBuf },

    #[snafu(display(
        "slice {} has shape {}x{}, expected {}x{}",
        path.display(),
        rows,
        columns,
        expected_rows,
        expected_columns
    ))]
    InconsistentSlices {
        path: PathBuf,
        rows: usize,
        columns: usize,
        expected_rows: usize,
        expected_columns: usize,
    },

    #[snafu(display(
        "{} has {} frames of {} samples per pixel, expected a single monochrome frame",
        path.display(),
        frames,
        samples
    ))]
    UnsupportedPixelLayout {
        path: PathBuf,
        frames: u32,
        samples: u16,
    },

    #[snafu(display("{}", message))]
    Other { message: String },
}

