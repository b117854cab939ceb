//! Whole-tree conversion and the follow-up repair passes over the ledger.

use indicatif::ProgressBar;
use snafu::Report;
use std::path::{Path, PathBuf};

use crate::discover::Entry;
use crate::errors::LedgerError;
use crate::layout::{CtRule, CtSelector, StudyKey};
use crate::ledger::{Exception, Ledger, LedgerRow};
use crate::patient::{PatientError, PatientProcessor, PatientReport, ProcessingOptions};

/// Tally of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Entries already in the ledger when resuming
    pub skipped: usize,
    pub folder_errors: usize,
    /// Studies converted without any exception
    pub converted: usize,
    /// Studies recorded with an exception other than a load error
    pub flagged: usize,
    pub load_errors: usize,
}

/// Tally of one repair pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairSummary {
    pub attempted: usize,
    pub solved: usize,
    pub failed: usize,
}

fn convert_study(
    path: &Path,
    output: &Path,
    options: &ProcessingOptions,
    rule: CtRule,
) -> Result<PatientReport, PatientError> {
    PatientProcessor::new(path, output, *options)?.execute(rule)
}

/// Record every entry in the ledger, converting studies along the way. Entries
/// whose folders are already recorded are skipped. The ledger is persisted after
/// every entry.
pub fn convert_all(
    ledger: &mut Ledger,
    entries: &[Entry],
    output: &Path,
    options: &ProcessingOptions,
    pb: &ProgressBar,
) -> Result<BatchSummary, LedgerError> {
    let mut summary = BatchSummary::default();
    for entry in entries {
        let (f1, f2, f3) = entry.components();
        if ledger.contains(f1, f2, f3) {
            tracing::debug!("Already recorded: {:?}", entry.components());
            summary.skipped += 1;
            pb.inc(1);
            continue;
        }

        let mut row = LedgerRow::new(f1, f2, f3);
        match entry {
            Entry::FolderError { .. } => {
                tracing::info!("Folder error: {:?}", entry.components());
                row.exception = Some(Exception::FolderError);
                summary.folder_errors += 1;
            }
            Entry::Patient { key, path } => {
                pb.set_message(key.to_string());
                match convert_study(path, output, options, CtRule::Standard) {
                    Ok(report) => {
                        report.apply_to(&mut row);
                        match report.exception {
                            None => summary.converted += 1,
                            Some(_) => summary.flagged += 1,
                        }
                    }
                    Err(e) => {
                        tracing::error!("Error processing {}: {}", key, Report::from_error(&e));
                        row.exception = Some(Exception::LoadDataError);
                        summary.load_errors += 1;
                    }
                }
            }
        }
        ledger.push(row);
        ledger.persist()?;
        pb.inc(1);
    }
    Ok(summary)
}

/// Study folder of a ledger row, if the row names all three components.
fn row_study_path(root: &Path, row: &LedgerRow) -> Option<PathBuf> {
    match (row.f2.as_deref(), row.f3.as_deref()) {
        (Some(f2), Some(f3)) => Some(StudyKey::new(row.f1.as_str(), f2, f3).study_path(root)),
        _ => None,
    }
}

/// Re-run rows recorded as `Load Data Error`. A successful run replaces the row
/// contents, another failure marks it `Load Data Error 2`.
pub fn repair_load_errors(
    ledger: &mut Ledger,
    root: &Path,
    output: &Path,
    options: &ProcessingOptions,
) -> Result<RepairSummary, LedgerError> {
    let mut summary = RepairSummary::default();
    for position in ledger.rows_with(Exception::LoadDataError) {
        let Some(row) = ledger.get_mut(position) else {
            continue;
        };
        let Some(path) = row_study_path(root, row) else {
            continue;
        };
        summary.attempted += 1;
        tracing::info!("Retrying row {}: {}", row.index, path.display());
        match convert_study(&path, output, options, CtRule::Standard) {
            Ok(report) => {
                report.apply_to(row);
                summary.solved += 1;
            }
            Err(e) => {
                tracing::error!("Retry failed for {}: {}", path.display(), Report::from_error(&e));
                row.exception = Some(Exception::LoadDataError2);
                summary.failed += 1;
            }
        }
        ledger.persist()?;
    }
    Ok(summary)
}

/// Select a CT folder with `rule` and convert manually. `Ok(None)` when no
/// folder matches.
fn convert_with_rule(
    path: &Path,
    output: &Path,
    options: &ProcessingOptions,
    rule: CtRule,
) -> Result<Option<PatientReport>, PatientError> {
    let processor = PatientProcessor::new(path, output, *options)?;
    let folders = processor.series_folders()?;
    match CtSelector::new(rule).select(&folders) {
        Some(ct_folder) => {
            tracing::info!("Using CT folder {}", ct_folder);
            processor.execute_manually(ct_folder).map(Some)
        }
        None => Ok(None),
    }
}

/// Copy the counts of a manual conversion into a row under a new label.
fn record_manual(row: &mut LedgerRow, report: &PatientReport, exception: Exception) {
    report.apply_to(row);
    row.exception = Some(exception);
}

/// Retry `Folder Error` rows whose study folder is named `name`, treating the
/// folder as a study and selecting the CT with the relaxed rule.
pub fn repair_folder_errors(
    ledger: &mut Ledger,
    root: &Path,
    output: &Path,
    options: &ProcessingOptions,
    name: &str,
) -> Result<RepairSummary, LedgerError> {
    let mut summary = RepairSummary::default();
    for position in ledger.rows_with(Exception::FolderError) {
        let Some(row) = ledger.get_mut(position) else {
            continue;
        };
        if row.f3.as_deref() != Some(name) {
            continue;
        }
        let Some(path) = row_study_path(root, row) else {
            continue;
        };
        summary.attempted += 1;
        match convert_with_rule(&path, output, options, CtRule::Relaxed) {
            Ok(Some(report)) => {
                record_manual(row, &report, Exception::FolderErrorSolved);
                summary.solved += 1;
            }
            Ok(None) => {
                row.exception = Some(Exception::FolderErrorToNoExpectedCt);
            }
            Err(e) => {
                tracing::error!("Retry failed for {}: {}", path.display(), Report::from_error(&e));
                row.exception = Some(Exception::FolderErrorToLoadError);
                summary.failed += 1;
            }
        }
        ledger.persist()?;
    }
    Ok(summary)
}

/// Retry `No Expected CT` rows with the fallback CT rule. Rows where no folder
/// matches are left unchanged.
pub fn repair_no_ct(
    ledger: &mut Ledger,
    root: &Path,
    output: &Path,
    options: &ProcessingOptions,
) -> Result<RepairSummary, LedgerError> {
    let mut summary = RepairSummary::default();
    for position in ledger.rows_with(Exception::NoExpectedCt) {
        let Some(row) = ledger.get_mut(position) else {
            continue;
        };
        let Some(path) = row_study_path(root, row) else {
            continue;
        };
        summary.attempted += 1;
        match convert_with_rule(&path, output, options, CtRule::Fallback) {
            Ok(Some(report)) => {
                record_manual(row, &report, Exception::NoExpectedCtSolved);
                summary.solved += 1;
            }
            Ok(None) => {
                tracing::info!("Still no CT folder in {}", path.display());
            }
            Err(e) => {
                tracing::error!("Retry failed for {}: {}", path.display(), Report::from_error(&e));
                row.exception = Some(Exception::NoExpectedCtToLoadError);
                summary.failed += 1;
            }
        }
        ledger.persist()?;
    }
    Ok(summary)
}
