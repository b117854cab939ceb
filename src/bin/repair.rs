use clap::{Parser, Subcommand};
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::path::PathBuf;
use tracing::{error, Level};

use cta_convert::batch::{repair_folder_errors, repair_load_errors, repair_no_ct, RepairSummary};
use cta_convert::errors::LedgerError;
use cta_convert::ledger::Ledger;
use cta_convert::patient::ProcessingOptions;

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid source path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("Ledger error: {}", source))]
    Ledger {
        #[snafu(source(from(LedgerError, Box::new)))]
        source: Box<LedgerError>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Repair {
    /// Re-run studies recorded as `Load Data Error`
    LoadErrors,
    /// Treat folders recorded as `Folder Error` with the given name as studies
    FolderErrors {
        #[arg(help = "Study folder name, e.g. AKA", long = "name", short = 'n')]
        name: String,
    },
    /// Retry studies recorded as `No Expected CT` with alternate CT folder names
    NoCt,
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Retry failed rows of a conversion ledger", long_about = None)]
struct Args {
    #[arg(help = "Data root the ledger was created from")]
    root: PathBuf,

    #[arg(help = "Output directory")]
    output: PathBuf,

    #[arg(help = "Ledger to update in place (.csv or .parquet)")]
    ledger: PathBuf,

    #[command(subcommand)]
    repair: Repair,
}

fn main() {
    let args = Args::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(Level::INFO)
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    run(args).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-1);
    });
}

fn run(args: Args) -> Result<RepairSummary, Error> {
    if !args.root.is_dir() {
        return InvalidSourcePathSnafu { path: args.root }.fail();
    }
    let mut ledger = Ledger::open(&args.ledger).context(LedgerSnafu)?;
    // Retried studies always overwrite their output
    let options = ProcessingOptions {
        resave: true,
        ..Default::default()
    };

    let summary = match &args.repair {
        Repair::LoadErrors => repair_load_errors(&mut ledger, &args.root, &args.output, &options),
        Repair::FolderErrors { name } => {
            repair_folder_errors(&mut ledger, &args.root, &args.output, &options, name)
        }
        Repair::NoCt => repair_no_ct(&mut ledger, &args.root, &args.output, &options),
    }
    .context(LedgerSnafu)?;

    tracing::info!(
        "Attempted {}, solved {}, failed {}",
        summary.attempted,
        summary.solved,
        summary.failed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::{run, Args, Error, Repair};
    use cta_convert::ledger::{Exception, Ledger, LedgerRow};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup(root: &Path, ledger_path: &Path) {
        fs::create_dir_all(root.join("20201030/ZS16093253_ZS0023607916_1/AKA/Topogram")).unwrap();
        fs::create_dir_all(root.join("20201030/ZS16093253_ZS0023607916_1/CTA/Scout")).unwrap();
        let mut ledger = Ledger::create(ledger_path).unwrap();
        ledger.push(
            LedgerRow::new("20201030", Some("ZS16093253_ZS0023607916_1"), Some("AKA"))
                .with_exception(Exception::FolderError),
        );
        ledger.push(
            LedgerRow::new("20201030", Some("ZS16093253_ZS0023607916_1"), Some("CTA"))
                .with_exception(Exception::NoExpectedCt),
        );
        ledger.push(LedgerRow::new("misc", None, None).with_exception(Exception::FolderError));
        ledger.persist().unwrap();
    }

    fn args(root: &Path, ledger: &Path, repair: Repair) -> Args {
        Args {
            root: root.to_path_buf(),
            output: root.join("output"),
            ledger: ledger.to_path_buf(),
            repair,
        }
    }

    #[test]
    fn test_folder_errors_without_ct() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("data");
        let ledger_path = temp_dir.path().join("ledger.csv");
        setup(&root, &ledger_path);

        let repair = Repair::FolderErrors {
            name: "AKA".to_string(),
        };
        let summary = run(args(&root, &ledger_path, repair)).unwrap();
        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.solved, 0);

        let ledger = Ledger::open(&ledger_path).unwrap();
        assert_eq!(
            ledger.rows()[0].exception,
            Some(Exception::FolderErrorToNoExpectedCt)
        );
        assert_eq!(ledger.rows()[2].exception, Some(Exception::FolderError));
    }

    #[test]
    fn test_no_ct_left_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("data");
        let ledger_path = temp_dir.path().join("ledger.csv");
        setup(&root, &ledger_path);

        let summary = run(args(&root, &ledger_path, Repair::NoCt)).unwrap();
        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.solved, 0);
        let ledger = Ledger::open(&ledger_path).unwrap();
        assert_eq!(ledger.rows()[1].exception, Some(Exception::NoExpectedCt));
    }

    #[test]
    fn test_load_errors_none_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("data");
        let ledger_path = temp_dir.path().join("ledger.csv");
        setup(&root, &ledger_path);

        let summary = run(args(&root, &ledger_path, Repair::LoadErrors)).unwrap();
        assert_eq!(summary.attempted, 0);
    }

    #[test]
    fn test_missing_ledger() {
        let temp_dir = TempDir::new().unwrap();
        let result = run(args(
            temp_dir.path(),
            &temp_dir.path().join("ledger.csv"),
            Repair::NoCt,
        ));
        assert!(matches!(result, Err(Error::Ledger { .. })));
    }
}
