use snafu::{ResultExt, Snafu};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::errors::{DicomError, NiftiError};
use crate::file::FolderOperations;
use crate::layout::{
    CtRule, CtSelector, SegmentKind, StudyKey, COMPLETE_SEGMENTATION_COUNTS, CT_FILENAME,
    EXPECTED_SEGMENTATION_SERIES,
};
use crate::ledger::{Exception, LedgerRow};
use crate::save::NiftiSaver;
use crate::series::{format_counts, SeriesScan};
use crate::transform::{Clip, Interpolator, Resample, Transform, DEFAULT_LABEL_FILL};
use crate::volume::{PixelType, Volume};

#[derive(Debug, Snafu)]
pub enum PatientError {
    #[snafu(display("{} is not a <date>/<patient>/<study> folder", path.display()))]
    InvalidStudyFolder { path: PathBuf },

    #[snafu(display("IO error on {}: {:?}", path.display(), source))]
    IOError {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("error reading series in {}: {}", path.display(), source))]
    Dicom {
        path: PathBuf,
        #[snafu(source(from(DicomError, Box::new)))]
        source: Box<DicomError>,
    },

    #[snafu(display("error writing volume: {}", source))]
    Nifti {
        #[snafu(source(from(NiftiError, Box::new)))]
        source: Box<NiftiError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessingOptions {
    /// Overwrite volumes that already exist in the output folder
    pub resave: bool,
    pub ct_clip: Clip,
    pub label_clip: Clip,
    /// Fill value for label voxels outside the source grid
    pub label_default: f32,
    pub ct_pixel_type: PixelType,
    /// Values are rounded and saturated when the type is an integer
    pub label_pixel_type: PixelType,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            resave: false,
            ct_clip: Clip::ct(),
            label_clip: Clip::label(),
            label_default: DEFAULT_LABEL_FILL,
            ct_pixel_type: PixelType::Int16,
            label_pixel_type: PixelType::Uint8,
        }
    }
}

/// What happened to one study folder. File counts are per series.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientReport {
    pub exception: Option<Exception>,
    pub ct_name: Option<String>,
    pub ct: Option<Vec<usize>>,
    pub segments: BTreeMap<SegmentKind, Vec<usize>>,
}

impl PatientReport {
    pub fn no_expected_ct() -> Self {
        Self {
            exception: Some(Exception::NoExpectedCt),
            ..Default::default()
        }
    }

    /// Copy the results into a ledger row, keeping its folder components.
    pub fn apply_to(&self, row: &mut LedgerRow) {
        row.clear_results();
        row.exception = self.exception;
        row.ct_name = self.ct_name.clone();
        row.ct = self.ct.as_deref().map(format_counts);
        for (kind, counts) in self.segments.iter() {
            row.set_segment(*kind, Some(format_counts(counts)));
        }
    }

    /// Tab-separated counts of every converted volume, CT first.
    pub fn counts_line(&self) -> String {
        self.ct
            .iter()
            .chain(self.segments.values())
            .map(|counts| format_counts(counts))
            .collect::<Vec<_>>()
            .join("\t")
    }
}

/// Converts the series of one study folder into `<output>/<date>_<patient>/`.
#[derive(Debug)]
pub struct PatientProcessor {
    study_folder: PathBuf,
    output_folder: PathBuf,
    options: ProcessingOptions,
    saver: NiftiSaver,
}

impl PatientProcessor {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        study_folder: P,
        output_root: Q,
        options: ProcessingOptions,
    ) -> Result<Self, PatientError> {
        let study_folder = study_folder.as_ref().to_path_buf();
        let key = StudyKey::from_study_path(&study_folder).ok_or_else(|| {
            PatientError::InvalidStudyFolder {
                path: study_folder.clone(),
            }
        })?;
        let output_folder = output_root.as_ref().join(key.output_name());
        std::fs::create_dir_all(&output_folder).context(IOSnafu {
            path: &output_folder,
        })?;
        Ok(Self {
            study_folder,
            output_folder,
            options,
            saver: NiftiSaver::new(),
        })
    }

    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }

    /// Names of the series folders inside the study folder.
    pub fn series_folders(&self) -> Result<Vec<String>, PatientError> {
        self.study_folder.sub_folders().context(IOSnafu {
            path: &self.study_folder,
        })
    }

    /// Select the CT folder with `rule` and convert the study.
    pub fn execute(&self, rule: CtRule) -> Result<PatientReport, PatientError> {
        let folders = self.series_folders()?;
        let selector = CtSelector::new(rule);
        match selector.select(&folders) {
            Some(ct_folder) => self.convert(ct_folder, &folders, self.options.resave),
            None => {
                tracing::info!(
                    "No CT folder matching the {} rule in {}",
                    rule,
                    self.study_folder.display()
                );
                Ok(PatientReport::no_expected_ct())
            }
        }
    }

    /// Convert the study with a caller-chosen CT folder, overwriting existing output.
    pub fn execute_manually(&self, ct_folder: &str) -> Result<PatientReport, PatientError> {
        let folders = self.series_folders()?;
        self.convert(ct_folder, &folders, true)
    }

    fn convert(
        &self,
        ct_folder: &str,
        folders: &[String],
        resave: bool,
    ) -> Result<PatientReport, PatientError> {
        let mut report = PatientReport {
            ct_name: Some(ct_folder.to_string()),
            ..Default::default()
        };

        let ct_scan = self.scan(ct_folder)?;
        report.ct = Some(ct_scan.file_counts());

        let mut ct: Option<Volume> = None;
        let ct_path = self.output_folder.join(CT_FILENAME);
        if resave || !ct_path.is_file() {
            let volume = self.load_ct(&ct_scan)?;
            self.saver.save(&volume, &ct_path).context(NiftiSnafu)?;
            ct = Some(volume);
        }

        let mut present = 0;
        for kind in SegmentKind::ALL {
            let folder = kind.folder_name();
            if !folders.iter().any(|f| f == folder) {
                continue;
            }
            present += 1;

            let scan = self.scan(folder)?;
            let counts = scan.file_counts();
            if counts.len() != EXPECTED_SEGMENTATION_SERIES {
                tracing::warn!(
                    "{} has {} series in {}",
                    kind,
                    counts.len(),
                    self.study_folder.display()
                );
                report.exception = Some(Exception::TooManySeg);
            }

            let path = self.output_folder.join(kind.filename());
            if resave || !path.is_file() {
                if ct.is_none() {
                    ct = Some(self.load_ct(&ct_scan)?);
                }
                if let Some(reference) = ct.as_ref() {
                    let label = self.load_label(&scan, reference)?;
                    self.saver.save(&label, &path).context(NiftiSnafu)?;
                }
            }
            report.segments.insert(kind, counts);
        }

        if !COMPLETE_SEGMENTATION_COUNTS.contains(&present) {
            report.exception = Some(Exception::MissSeg);
        }
        Ok(report)
    }

    fn scan(&self, folder: &str) -> Result<SeriesScan, PatientError> {
        let path = self.study_folder.join(folder);
        SeriesScan::scan(&path).context(DicomSnafu { path })
    }

    fn load_ct(&self, scan: &SeriesScan) -> Result<Volume, PatientError> {
        let series = scan.primary().context(DicomSnafu { path: &scan.folder })?;
        let volume = Volume::load_series(series).context(DicomSnafu { path: &scan.folder })?;
        tracing::debug!("CT {}\n{}", scan.folder.display(), volume);
        Ok(self
            .options
            .ct_clip
            .apply(&volume)
            .with_pixel_type(self.options.ct_pixel_type))
    }

    fn load_label(&self, scan: &SeriesScan, reference: &Volume) -> Result<Volume, PatientError> {
        let series = scan.primary().context(DicomSnafu { path: &scan.folder })?;
        let label = Volume::load_series(series).context(DicomSnafu { path: &scan.folder })?;
        let resample = Resample::to_reference(
            &reference.geometry,
            Interpolator::for_label(true),
            self.options.label_default,
        );
        Ok(self
            .options
            .label_clip
            .apply(&resample.apply(&label))
            .with_pixel_type(self.options.label_pixel_type))
    }
}
