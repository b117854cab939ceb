use clap::Parser;
use indicatif::ProgressFinish;
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::path::PathBuf;
use tracing::{error, Level};

use cta_convert::batch::{convert_all, BatchSummary};
use cta_convert::discover::walk;
use cta_convert::errors::LedgerError;
use cta_convert::file::{default_bar, default_spinner};
use cta_convert::layout::FolderRules;
use cta_convert::ledger::Ledger;
use cta_convert::patient::ProcessingOptions;
use cta_convert::transform::{Clip, DEFAULT_CT_RANGE, DEFAULT_LABEL_RANGE};
use cta_convert::volume::PixelType;

const DEFAULT_LEDGER_FILENAME: &str = "ledger.csv";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Invalid source path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("Failed to create directory: {}", path.display()))]
    CreateDir {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("Failed to walk {}: {:?}", path.display(), source))]
    Walk {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("Ledger error: {}", source))]
    Ledger {
        #[snafu(source(from(LedgerError, Box::new)))]
        source: Box<LedgerError>,
    },

    #[snafu(display("Invalid clip range [{}, {}]", min, max))]
    InvalidClipRange { min: f32, max: f32 },
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Convert a tree of CTA DICOM studies into NIfTI volumes", long_about = None)]
struct Args {
    #[arg(help = "Data root laid out as <date>/<patient>/<study>/<series>")]
    root: PathBuf,

    #[arg(help = "Output directory, one <date>_<patient> folder per patient")]
    output: PathBuf,

    #[arg(
        help = format!("Ledger path, extension determines format: .csv or .parquet (default: <output>/{DEFAULT_LEDGER_FILENAME})"),
        long = "ledger",
        short = 'l'
    )]
    ledger: Option<PathBuf>,

    #[arg(
        help = "Continue an existing ledger, skipping folders that are already recorded",
        long = "resume",
        short = 'r',
        default_value_t = false
    )]
    resume: bool,

    #[arg(
        help = "Additional study folder name to accept (repeatable)",
        long = "patient-folder",
        short = 'p'
    )]
    patient_folders: Vec<String>,

    #[arg(help = "Lower CT clip bound (HU)", long = "ct-min", default_value_t = DEFAULT_CT_RANGE.0, allow_negative_numbers = true)]
    ct_min: f32,

    #[arg(help = "Upper CT clip bound (HU)", long = "ct-max", default_value_t = DEFAULT_CT_RANGE.1, allow_negative_numbers = true)]
    ct_max: f32,

    #[arg(help = "Lower label clip bound", long = "label-min", default_value_t = DEFAULT_LABEL_RANGE.0, allow_negative_numbers = true)]
    label_min: f32,

    #[arg(help = "Upper label clip bound", long = "label-max", default_value_t = DEFAULT_LABEL_RANGE.1, allow_negative_numbers = true)]
    label_max: f32,

    #[arg(
        help = "Voxel type of the written CT volumes",
        long = "ct-type",
        value_enum,
        default_value_t = PixelType::Int16
    )]
    ct_type: PixelType,

    #[arg(
        help = "Voxel type of the written segmentation volumes",
        long = "label-type",
        value_enum,
        default_value_t = PixelType::Uint8
    )]
    label_type: PixelType,

    #[arg(
        help = "Overwrite volumes that already exist in the output directory",
        long = "resave",
        default_value_t = false
    )]
    resave: bool,

    #[arg(
        help = "Log every study and series",
        long = "verbose",
        short = 'v',
        default_value_t = false
    )]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if args.verbose {
                Level::DEBUG
            } else {
                Level::INFO
            })
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

fn clip(min: f32, max: f32) -> Result<Clip, Error> {
    if min <= max {
        Ok(Clip::new(min, max))
    } else {
        InvalidClipRangeSnafu { min, max }.fail()
    }
}

fn run(args: Args) -> Result<BatchSummary, Error> {
    if !args.root.is_dir() {
        return InvalidSourcePathSnafu { path: args.root }.fail();
    }
    let options = ProcessingOptions {
        resave: args.resave,
        ct_clip: clip(args.ct_min, args.ct_max)?,
        label_clip: clip(args.label_min, args.label_max)?,
        ct_pixel_type: args.ct_type,
        label_pixel_type: args.label_type,
        ..Default::default()
    };
    let rules = FolderRules::default().with_study_folders(args.patient_folders);

    std::fs::create_dir_all(&args.output).context(CreateDirSnafu {
        path: args.output.clone(),
    })?;
    let ledger_path = args
        .ledger
        .unwrap_or_else(|| args.output.join(DEFAULT_LEDGER_FILENAME));
    let mut ledger = if args.resume && ledger_path.is_file() {
        Ledger::open(&ledger_path).context(LedgerSnafu)?
    } else {
        Ledger::create(&ledger_path).context(LedgerSnafu)?
    };

    let spinner = default_spinner();
    spinner.set_message(format!("Walking {}", args.root.display()));
    let entries = walk(&args.root, &rules, Some(&args.output)).context(WalkSnafu {
        path: args.root.clone(),
    })?;
    spinner.finish();
    tracing::info!("Number of entries found: {}", entries.len());

    let pb = default_bar(entries.len() as u64).with_finish(ProgressFinish::AndLeave);
    pb.set_message("Converting studies");
    let summary =
        convert_all(&mut ledger, &entries, &args.output, &options, &pb).context(LedgerSnafu)?;
    tracing::info!(
        "Converted {}, flagged {}, load errors {}, folder errors {}, skipped {}",
        summary.converted,
        summary.flagged,
        summary.load_errors,
        summary.folder_errors,
        summary.skipped
    );
    tracing::info!("Ledger written to {}", ledger_path.display());
    Ok(summary)
}
