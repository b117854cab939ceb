pub mod dicom;
pub mod ledger;
pub mod nifti;

pub use self::dicom::DicomError;
pub use self::ledger::LedgerError;
pub use self::nifti::NiftiError;
