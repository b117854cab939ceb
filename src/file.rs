use dicom::object::open_file;
use dicom::object::DefaultDicomObject;
use dicom::object::ReadError;
use itertools::Itertools;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use rust_search::SearchBuilder;
use std::path::Path;

pub const DICM_PREFIX: &[u8; 4] = b"DICM";
pub const DICM_PREFIX_LOCATION: u64 = 128;

type IOResult<T> = Result<T, std::io::Error>;

pub fn default_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta} @ {per_sec})",
            )
            .unwrap(),
    );
    pb
}

pub fn default_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.blue} {msg}")
            .unwrap(),
    );
    spinner
}

pub trait FolderOperations
where
    Self: AsRef<Path>,
{
    /// Names of the immediate sub-directories, sorted.
    fn sub_folders(&self) -> IOResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(self.as_ref())? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

impl<P: AsRef<Path>> FolderOperations for P {}

pub trait DicomFileOperations
where
    Self: AsRef<Path>,
{
    /// Check if a file has a DICM prefix.
    /// This will only return an error if the file cannot be opened.
    /// Any other errors mapped to `false`.
    fn has_dicm_prefix(&self) -> IOResult<bool> {
        let mut reader = File::open(self.as_ref())?;
        let mut buffer = [0; DICM_PREFIX.len()];
        reader
            .seek(SeekFrom::Start(DICM_PREFIX_LOCATION))
            .and_then(|_| reader.read_exact(&mut buffer))
            .map_or(Ok(false), |_| Ok(&buffer == DICM_PREFIX))
    }

    /// Check if a file has a DICOM extension.
    fn has_dicom_extension(&self) -> bool {
        let path = self.as_ref();
        if let Some(ext) = path.extension() {
            return ext == "dcm" || ext == "dicom" || ext == "DCM" || ext == "DICOM";
        }
        false
    }

    /// Check if a path is a DICOM file as efficiently as possible.
    /// The function will use the file extension if available, otherwise it will check the DICM prefix.
    /// Scanner exports often name slices like `IM0001.1`, so unknown extensions are sniffed too.
    fn is_dicom_file(&self) -> IOResult<bool> {
        let path = self.as_ref();
        if self.has_dicom_extension() {
            Ok(path.is_file())
        } else if path.is_dir() {
            Ok(false)
        } else {
            self.has_dicm_prefix()
        }
    }

    /// Similar to `is_dicom_file`, but returns a default value if an error occurs.
    fn is_dicom_file_or(&self, default: bool) -> bool {
        self.is_dicom_file().unwrap_or(default)
    }

    /// Find the DICOM files directly inside a directory, sorted by path.
    fn find_dicoms(&self) -> IOResult<Vec<PathBuf>> {
        let dir = self.as_ref();
        if !dir.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Not a directory",
            ));
        }
        let result = SearchBuilder::default()
            .location(dir)
            .depth(1)
            .build()
            .map(PathBuf::from)
            .filter(|file| file.as_path() != dir && file.is_dicom_file_or(false))
            .sorted()
            .collect();
        Ok(result)
    }

    /// Read the DICOM file.
    fn dcmread(&self) -> Result<DefaultDicomObject, ReadError> {
        open_file(self.as_ref())
    }
}

impl<P: AsRef<Path>> DicomFileOperations for P {}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_with_prefix(path: &Path) -> IOResult<()> {
        let mut file = File::create(path)?;
        file.seek(SeekFrom::Start(DICM_PREFIX_LOCATION))?;
        file.write_all(DICM_PREFIX)?;
        Ok(())
    }

    #[rstest]
    #[case("slice.dcm", true)]
    #[case("slice.DICOM", true)]
    #[case("slice.txt", false)]
    #[case("slice", false)]
    fn test_has_dicom_extension(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(PathBuf::from(name).has_dicom_extension(), expected);
    }

    #[test]
    fn test_is_dicom_file_sniffs_prefix() -> IOResult<()> {
        let temp_dir = TempDir::new()?;
        let with_prefix = temp_dir.path().join("IM0001");
        let without_prefix = temp_dir.path().join("notes.txt");
        write_with_prefix(&with_prefix)?;
        std::fs::write(&without_prefix, b"not a dicom")?;

        assert!(with_prefix.is_dicom_file()?);
        assert!(!without_prefix.is_dicom_file()?);
        assert!(!temp_dir.path().is_dicom_file()?);
        Ok(())
    }

    #[test]
    fn test_find_dicoms_is_shallow() -> IOResult<()> {
        let temp_dir = TempDir::new()?;
        let nested = temp_dir.path().join("nested");
        std::fs::create_dir(&nested)?;
        write_with_prefix(&temp_dir.path().join("b"))?;
        write_with_prefix(&temp_dir.path().join("a.dcm"))?;
        write_with_prefix(&nested.join("c.dcm"))?;
        std::fs::write(temp_dir.path().join("readme.txt"), b"hello")?;

        let found = temp_dir.path().find_dicoms()?;
        assert_eq!(
            found,
            vec![temp_dir.path().join("a.dcm"), temp_dir.path().join("b")]
        );
        Ok(())
    }

    #[test]
    fn test_sub_folders_sorted() -> IOResult<()> {
        let temp_dir = TempDir::new()?;
        for name in ["LSA", "CTA 1.0 CE", "AAO"] {
            std::fs::create_dir(temp_dir.path().join(name))?;
        }
        std::fs::write(temp_dir.path().join("file.txt"), b"")?;

        let folders = temp_dir.path().sub_folders()?;
        assert_eq!(folders, vec!["AAO", "CTA 1.0 CE", "LSA"]);
        Ok(())
    }
}
