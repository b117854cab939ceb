use nifti::error::NiftiError as BaseNiftiError;
pub use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum NiftiError {
    #[snafu(display("IO error on NIfTI file {}", path.display()))]
    IOError {
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
        path: PathBuf,
    },

    #[snafu(display("error reading NIfTI file {}", path.display()))]
    ReadError {
        path: PathBuf,
        #[snafu(source(from(BaseNiftiError, Box::new)))]
        source: Box<BaseNiftiError>,
    },

    #[snafu(display("error writing NIfTI file {}", path.display()))]
    WriteError {
        path: PathBuf,
        #[snafu(source(from(BaseNiftiError, Box::new)))]
        source: Box<BaseNiftiError>,
    },

    #[snafu(display("NIfTI file {} has unsupported datatype {}", path.display(), datatype))]
    UnsupportedDataType { path: PathBuf, datatype: i16 },

    #[snafu(display("NIfTI file {} has {} dimensions, expected 3", path.display(), ndim))]
    DimensionError { path: PathBuf, ndim: usize },
}
