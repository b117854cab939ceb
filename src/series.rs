use dicom::dictionary_std::tags;
use dicom::object::OpenFileOptions;
use itertools::Itertools;
use rayon::prelude::*;
use snafu::ResultExt;
use std::path::{Path, PathBuf};

use crate::errors::dicom::{IOSnafu, ReadSnafu};
use crate::errors::DicomError;
use crate::file::DicomFileOperations;
use crate::metadata::SliceMetadata;

/// Files of one DICOM series inside a folder.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesInfo {
    pub series_instance_uid: String,
    pub files: Vec<PathBuf>,
}

impl SeriesInfo {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// All series found directly inside a folder, sorted by Series Instance UID.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesScan {
    pub folder: PathBuf,
    pub series: Vec<SeriesInfo>,
}

/// Read the header of a DICOM file, stopping before the pixel data.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<SliceMetadata, DicomError> {
    let path = path.as_ref();
    let file = OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .context(ReadSnafu { path })?;
    SliceMetadata::try_from(&file)
}

impl SeriesScan {
    /// Group the DICOM files of a folder by series. Files that cannot be parsed are
    /// skipped with a warning. Fails if no series at all is found.
    pub fn scan<P: AsRef<Path>>(folder: P) -> Result<Self, DicomError> {
        let folder = folder.as_ref();
        let files = folder.find_dicoms().context(IOSnafu { path: folder })?;

        let headers = files
            .into_par_iter()
            .filter_map(|path| match read_header(&path) {
                Ok(header) => Some((header.series_instance_uid, path)),
                Err(e) => {
                    tracing::warn!("Skipping unreadable DICOM file {}: {}", path.display(), e);
                    None
                }
            })
            .collect::<Vec<_>>();

        let series = headers
            .into_iter()
            .into_group_map()
            .into_iter()
            .map(|(series_instance_uid, mut files)| {
                files.sort();
                SeriesInfo {
                    series_instance_uid,
                    files,
                }
            })
            .sorted_by(|a, b| a.series_instance_uid.cmp(&b.series_instance_uid))
            .collect::<Vec<_>>();

        if series.is_empty() {
            return Err(DicomError::NoSeries {
                path: folder.to_path_buf(),
            });
        }
        tracing::debug!(
            "Found {} series in {}: {:?}",
            series.len(),
            folder.display(),
            series.iter().map(|s| s.len()).collect::<Vec<_>>()
        );

        Ok(Self {
            folder: folder.to_path_buf(),
            series,
        })
    }

    /// Number of files in each series.
    pub fn file_counts(&self) -> Vec<usize> {
        self.series.iter().map(|s| s.len()).collect()
    }

    /// The series with the most files. Ties go to the lowest UID.
    pub fn primary(&self) -> Result<&SeriesInfo, DicomError> {
        self.series
            .iter()
            .rev()
            .max_by_key(|s| s.len())
            .ok_or_else(|| DicomError::NoSeries {
                path: self.folder.clone(),
            })
    }
}

/// Formats file counts the way they are recorded in the ledger, e.g. `"241, 1"`.
pub fn format_counts(counts: &[usize]) -> String {
    counts.iter().map(|n| n.to_string()).join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::write_series;
    use rstest::rstest;
    use tempfile::TempDir;

    #[test]
    fn test_scan_groups_series() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write_series(dir, "1.2.840.2", (4, 4, 3), (1.0, 1.0, 1.0), [0.0; 3], |_, _, _| 0);
        write_series(dir, "1.2.840.1", (4, 4, 5), (1.0, 1.0, 1.0), [0.0; 3], |_, _, _| 0);
        std::fs::write(dir.join("DIRFILE.txt"), b"not dicom").unwrap();

        let scan = SeriesScan::scan(dir).unwrap();
        assert_eq!(scan.series.len(), 2);
        assert_eq!(scan.series[0].series_instance_uid, "1.2.840.1");
        assert_eq!(scan.file_counts(), vec![5, 3]);
        assert_eq!(scan.primary().unwrap().series_instance_uid, "1.2.840.1");
        assert_eq!(format_counts(&scan.file_counts()), "5, 3");
    }

    #[test]
    fn test_primary_tie_goes_to_lowest_uid() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write_series(dir, "1.9", (2, 2, 2), (1.0, 1.0, 1.0), [0.0; 3], |_, _, _| 0);
        write_series(dir, "1.1", (2, 2, 2), (1.0, 1.0, 1.0), [0.0; 3], |_, _, _| 0);

        let scan = SeriesScan::scan(dir).unwrap();
        assert_eq!(scan.primary().unwrap().series_instance_uid, "1.1");
    }

    #[test]
    fn test_scan_empty_folder() {
        let temp_dir = TempDir::new().unwrap();
        let result = SeriesScan::scan(temp_dir.path());
        assert!(matches!(result, Err(DicomError::NoSeries { .. })));
    }

    #[test]
    fn test_scan_missing_folder() {
        let temp_dir = TempDir::new().unwrap();
        let result = SeriesScan::scan(temp_dir.path().join("missing"));
        assert!(matches!(result, Err(DicomError::IOError { .. })));
    }

    #[rstest]
    #[case(&[], "")]
    #[case(&[241], "241")]
    #[case(&[241, 1], "241, 1")]
    fn test_format_counts(#[case] counts: &[usize], #[case] expected: &str) {
        assert_eq!(format_counts(counts), expected);
    }
}
