use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::file::FolderOperations;
use crate::layout::{FolderRules, StudyKey, WHOLE_BODY_FOLDER};

type IOResult<T> = Result<T, std::io::Error>;

/// One unit of work found while walking the data tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A folder that does not follow the naming rules. Only the components up to
    /// and including the offending one are set.
    FolderError {
        f1: String,
        f2: Option<String>,
        f3: Option<String>,
    },
    /// A study folder ready for conversion.
    Patient { key: StudyKey, path: PathBuf },
}

impl Entry {
    pub fn components(&self) -> (&str, Option<&str>, Option<&str>) {
        match self {
            Entry::FolderError { f1, f2, f3 } => (f1.as_str(), f2.as_deref(), f3.as_deref()),
            Entry::Patient { key, .. } => (
                key.f1.as_str(),
                Some(key.f2.as_str()),
                Some(key.f3.as_str()),
            ),
        }
    }
}

/// Walks `<root>/<date>/<patient>/<study>` in sorted order. Anything that is not a
/// directory is ignored, as is `exclude` (typically the output directory when it
/// lives inside the root).
pub fn walk<P: AsRef<Path>>(
    root: P,
    rules: &FolderRules,
    exclude: Option<&Path>,
) -> IOResult<Vec<Entry>> {
    let root = root.as_ref();
    let excluded = |p: &Path| exclude.is_some_and(|e| same_path(p, e));
    let mut entries = Vec::new();

    for f1 in root.sub_folders()? {
        let f1_path = root.join(&f1);
        if excluded(&f1_path) {
            tracing::debug!("Skipping excluded folder {}", f1_path.display());
            continue;
        }
        if !rules.is_date_folder(&f1) {
            entries.push(Entry::FolderError {
                f1,
                f2: None,
                f3: None,
            });
            continue;
        }
        for f2 in f1_path.sub_folders()? {
            let f2_path = f1_path.join(&f2);
            if !rules.is_patient_folder(&f2) {
                entries.push(Entry::FolderError {
                    f1: f1.clone(),
                    f2: Some(f2),
                    f3: None,
                });
                continue;
            }
            for f3 in f2_path.sub_folders()? {
                if rules.is_study_folder(&f3) {
                    let path = f2_path.join(&f3);
                    entries.push(Entry::Patient {
                        key: StudyKey::new(f1.clone(), f2.clone(), f3),
                        path,
                    });
                } else {
                    entries.push(Entry::FolderError {
                        f1: f1.clone(),
                        f2: Some(f2.clone()),
                        f3: Some(f3),
                    });
                }
            }
        }
    }
    Ok(entries)
}

/// Lists every path that deviates from the expected layout. Unlike [`walk`], only
/// whole-body studies are considered regular at the study level.
pub fn special_cases<P: AsRef<Path>>(root: P, rules: &FolderRules) -> IOResult<Vec<PathBuf>> {
    let root = root.as_ref();
    let mut cases = Vec::new();
    for f1 in root.sub_folders()? {
        let f1_path = root.join(&f1);
        if !rules.is_date_folder(&f1) {
            cases.push(f1_path);
            continue;
        }
        for f2 in f1_path.sub_folders()? {
            let f2_path = f1_path.join(&f2);
            if !rules.is_patient_folder(&f2) {
                cases.push(f2_path);
                continue;
            }
            for f3 in f2_path.sub_folders()? {
                if !f3.starts_with(WHOLE_BODY_FOLDER) {
                    cases.push(f2_path.join(f3));
                }
            }
        }
    }
    Ok(cases)
}

/// Recursively finds `<dir>/WholeBody CTA` for every directory whose only
/// sub-directory is the whole-body study. Unreadable directories are skipped.
pub fn whole_body_folders<P: AsRef<Path>>(root: P) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| only_child_is_whole_body(entry.path()))
        .map(|entry| entry.path().join(WHOLE_BODY_FOLDER))
        .collect();
    found.sort();
    found
}

fn only_child_is_whole_body(dir: &Path) -> bool {
    let children: Vec<_> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .collect();
    matches!(children.as_slice(), [only] if only.file_name() == OsStr::new(WHOLE_BODY_FOLDER))
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn mkdirs(root: &Path, paths: &[&str]) -> IOResult<()> {
        for p in paths {
            fs::create_dir_all(root.join(p))?;
        }
        Ok(())
    }

    fn setup_tree() -> IOResult<TempDir> {
        let temp_dir = TempDir::new()?;
        mkdirs(
            temp_dir.path(),
            &[
                "20201030/ZS16093253_ZS0023607916_1/WholeBody CTA/CTA 1.0 CE",
                "20201030/ZS16093253_ZS0023607916_1/AKA",
                "20201030/bad patient/WholeBody CTA",
                "20201215/ZS10074901_ZS0000733599/Aortic CTA",
                "misc",
                "output/20201030_ZS16093253_ZS0023607916_1",
            ],
        )?;
        fs::write(temp_dir.path().join("notes.txt"), b"ignored")?;
        Ok(temp_dir)
    }

    #[test]
    fn test_walk() -> IOResult<()> {
        let temp_dir = setup_tree()?;
        let root = temp_dir.path();
        let output = root.join("output");
        let entries = walk(root, &FolderRules::default(), Some(&output))?;

        let components: Vec<_> = entries.iter().map(|e| e.components()).collect();
        assert_eq!(
            components,
            vec![
                ("20201030", Some("ZS16093253_ZS0023607916_1"), Some("AKA")),
                (
                    "20201030",
                    Some("ZS16093253_ZS0023607916_1"),
                    Some("WholeBody CTA")
                ),
                ("20201030", Some("bad patient"), None),
                ("20201215", Some("ZS10074901_ZS0000733599"), Some("Aortic CTA")),
                ("misc", None, None),
            ]
        );
        assert!(matches!(entries[0], Entry::FolderError { .. }));
        match &entries[1] {
            Entry::Patient { path, .. } => assert_eq!(
                path,
                &root.join("20201030/ZS16093253_ZS0023607916_1/WholeBody CTA")
            ),
            other => panic!("unexpected entry {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_walk_reports_output_when_not_excluded() -> IOResult<()> {
        let temp_dir = setup_tree()?;
        let entries = walk(temp_dir.path(), &FolderRules::default(), None)?;
        assert!(entries
            .iter()
            .any(|e| e.components() == ("output", None, None)));
        Ok(())
    }

    #[test]
    fn test_walk_with_extra_study_folder() -> IOResult<()> {
        let temp_dir = setup_tree()?;
        let rules = FolderRules::default().with_study_folders(["AKA"]);
        let entries = walk(temp_dir.path(), &rules, Some(&temp_dir.path().join("output")))?;
        assert!(matches!(&entries[0], Entry::Patient { key, .. } if key.f3 == "AKA"));
        Ok(())
    }

    #[test]
    fn test_special_cases() -> IOResult<()> {
        let temp_dir = setup_tree()?;
        let root = temp_dir.path();
        let cases = special_cases(root, &FolderRules::default())?;
        assert_eq!(
            cases,
            vec![
                root.join("20201030/ZS16093253_ZS0023607916_1/AKA"),
                root.join("20201030/bad patient"),
                root.join("20201215/ZS10074901_ZS0000733599/Aortic CTA"),
                root.join("misc"),
                root.join("output"),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_whole_body_folders() -> IOResult<()> {
        let temp_dir = setup_tree()?;
        let root = temp_dir.path();
        let found = whole_body_folders(root);
        // The first patient also has an `AKA` study, so only the second qualifies
        assert_eq!(found, vec![root.join("20201030/bad patient/WholeBody CTA")]);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_whole_body_folders_skips_unreadable() -> IOResult<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = setup_tree()?;
        let root = temp_dir.path();
        let locked = root.join("20201215/ZS10074901_ZS0000733599");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000))?;
        let found = whole_body_folders(root);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))?;

        assert_eq!(found, vec![root.join("20201030/bad patient/WholeBody CTA")]);
        Ok(())
    }

    #[test]
    fn test_whole_body_folders_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        assert!(whole_body_folders(temp_dir.path().join("missing")).is_empty());
    }
}
