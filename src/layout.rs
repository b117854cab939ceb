//! Naming rules for the CTA data tree.
//!
//! Studies are stored as `<root>/<date>/<patient>/<study>/<series>`, for example
//! `20201030/ZS16093253_ZS0023607916_1/WholeBody CTA/CTA 1.0 CE`. Folder names are
//! typed by hand at the scanner console, so every rule here is a pattern match
//! rather than a lookup.

use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};

pub const DATE_FOLDER_PATTERN: &str = r"^202\d{5}$";
pub const PATIENT_FOLDER_PATTERN: &str = r"^ZS\d{8}_ZS\d{10}_?\d?";
pub const WHOLE_BODY_FOLDER: &str = "WholeBody CTA";
pub const DEFAULT_STUDY_FOLDERS: [&str; 4] =
    ["WholeBody CTA", "Aortic CTA", "CTA", "Aortic Dissection"];

/// Number of series expected inside a segmentation folder.
pub const EXPECTED_SEGMENTATION_SERIES: usize = 2;

/// Counts of present segmentation folders that are considered complete:
/// either only the combined segmentation, or all of them.
pub const COMPLETE_SEGMENTATION_COUNTS: [usize; 2] = [1, 6];

pub const CT_FILENAME: &str = "ct.nii";

/// Pattern set used to pick the CT series folder inside a study folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CtRule {
    /// The thin-slice contrast-enhanced reconstructions found in most studies
    #[default]
    Standard,
    /// Like `Standard`, but accepts any 0.75 mm B-kernel reconstruction
    Relaxed,
    /// Alternate reconstruction names used by older protocols
    Fallback,
}

impl CtRule {
    pub fn pattern(&self) -> &'static str {
        match self {
            CtRule::Standard => r"^CTA 1.0 CE$|0.75 *B2|^Recon 2_ CTA$",
            CtRule::Relaxed => r"^CTA 1.0 CE$|0.75 *B|^Recon 2_ CTA$",
            CtRule::Fallback => {
                r"Arterial Phase *1.0 *B31f|Body 2.0 CE|ThorAngio *1.0 *B20f|1.0 x 1.0|Body 1.0 CE"
            }
        }
    }
}

impl fmt::Display for CtRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule_str = match self {
            CtRule::Standard => "standard",
            CtRule::Relaxed => "relaxed",
            CtRule::Fallback => "fallback",
        };
        write!(f, "{rule_str}")
    }
}

/// The segmentation variants that may accompany a CT series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentKind {
    /// Combined segmentation of the whole aorta
    Seg,
    /// Ascending aorta
    Aao,
    /// Brachiocephalic trunk
    Bct,
    /// Descending aorta
    Dao,
    /// Left common carotid artery
    Lcca,
    /// Left subclavian artery
    Lsa,
}

impl SegmentKind {
    pub const ALL: [SegmentKind; 6] = [
        SegmentKind::Seg,
        SegmentKind::Aao,
        SegmentKind::Bct,
        SegmentKind::Dao,
        SegmentKind::Lcca,
        SegmentKind::Lsa,
    ];

    /// Name of the series folder holding this segmentation.
    pub fn folder_name(&self) -> &'static str {
        match self {
            SegmentKind::Seg => "Segmented axial",
            other => other.name(),
        }
    }

    /// Short name, used for the ledger column and the output file stem.
    pub fn name(&self) -> &'static str {
        match self {
            SegmentKind::Seg => "seg",
            SegmentKind::Aao => "AAO",
            SegmentKind::Bct => "BCT",
            SegmentKind::Dao => "DAO",
            SegmentKind::Lcca => "LCCA",
            SegmentKind::Lsa => "LSA",
        }
    }

    pub fn filename(&self) -> String {
        format!("{}.nii", self.name())
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Compiled folder-naming policy.
#[derive(Debug, Clone)]
pub struct FolderRules {
    date: Regex,
    patient: Regex,
    study_folders: Vec<String>,
}

impl Default for FolderRules {
    fn default() -> Self {
        Self {
            date: Regex::new(DATE_FOLDER_PATTERN).unwrap(),
            patient: Regex::new(PATIENT_FOLDER_PATTERN).unwrap(),
            study_folders: DEFAULT_STUDY_FOLDERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FolderRules {
    /// Accept additional study folder names besides the defaults.
    pub fn with_study_folders<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.study_folders.contains(&name) {
                self.study_folders.push(name);
            }
        }
        self
    }

    pub fn study_folders(&self) -> &[String] {
        &self.study_folders
    }

    pub fn is_date_folder(&self, name: &str) -> bool {
        self.date.is_match(name)
    }

    pub fn is_patient_folder(&self, name: &str) -> bool {
        self.patient.is_match(name)
    }

    pub fn is_study_folder(&self, name: &str) -> bool {
        self.study_folders.iter().any(|s| s == name)
    }
}

/// Picks the CT series folder among the series folders of a study.
pub struct CtSelector {
    rule: CtRule,
    pattern: Regex,
}

impl CtSelector {
    pub fn new(rule: CtRule) -> Self {
        Self {
            rule,
            pattern: Regex::new(rule.pattern()).unwrap(),
        }
    }

    pub fn rule(&self) -> CtRule {
        self.rule
    }

    /// When several folders match, the last one in listing order wins.
    pub fn select<'a, S: AsRef<str>>(&self, folders: &'a [S]) -> Option<&'a str> {
        folders
            .iter()
            .map(|f| f.as_ref())
            .filter(|f| self.pattern.is_match(f))
            .last()
    }
}

impl From<CtRule> for CtSelector {
    fn from(rule: CtRule) -> Self {
        Self::new(rule)
    }
}

/// Location of a study folder within the data tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StudyKey {
    pub f1: String,
    pub f2: String,
    pub f3: String,
}

impl StudyKey {
    pub fn new<S: Into<String>>(f1: S, f2: S, f3: S) -> Self {
        Self {
            f1: f1.into(),
            f2: f2.into(),
            f3: f3.into(),
        }
    }

    /// Recover the key from the last three components of a study folder path.
    pub fn from_study_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        let name = |p: &Path| p.file_name().map(|n| n.to_string_lossy().into_owned());
        let f3 = name(path)?;
        let patient = path.parent()?;
        let f2 = name(patient)?;
        let f1 = name(patient.parent()?)?;
        Some(Self { f1, f2, f3 })
    }

    pub fn study_path<P: AsRef<Path>>(&self, root: P) -> PathBuf {
        root.as_ref().join(&self.f1).join(&self.f2).join(&self.f3)
    }

    /// Output folder name: `<date>_<patient>`.
    pub fn output_name(&self) -> String {
        format!("{}_{}", self.f1, self.f2)
    }
}

impl fmt::Display for StudyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.f1, self.f2, self.f3)
    }
}
