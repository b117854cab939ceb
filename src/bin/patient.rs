use clap::Parser;
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::path::PathBuf;
use tracing::{error, Level};

use cta_convert::patient::{PatientError, PatientProcessor, PatientReport, ProcessingOptions};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid study path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("CT folder {} not found in {}", name, path.display()))]
    MissingCtFolder { name: String, path: PathBuf },

    #[snafu(display("Error processing {}: {}", path.display(), source))]
    Patient {
        path: PathBuf,
        #[snafu(source(from(PatientError, Box::new)))]
        source: Box<PatientError>,
    },
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Convert one study folder with a chosen CT series folder", long_about = None)]
struct Args {
    #[arg(help = "Study folder laid out as <date>/<patient>/<study>")]
    study: PathBuf,

    #[arg(help = "Output directory")]
    output: PathBuf,

    #[arg(help = "Name of the CT series folder inside the study", long = "ct", short = 'c')]
    ct: String,
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

    match run(args) {
        Ok(report) => println!("{}", report.counts_line()),
        Err(e) => {
            error!("{}", Report::from_error(e));
            std::process::exit(-1);
        }
    }
}

fn run(args: Args) -> Result<PatientReport, Error> {
    if !args.study.is_dir() {
        return InvalidSourcePathSnafu { path: args.study }.fail();
    }
    if !args.study.join(&args.ct).is_dir() {
        return MissingCtFolderSnafu {
            name: args.ct,
            path: args.study,
        }
        .fail();
    }
    let processor = PatientProcessor::new(&args.study, &args.output, ProcessingOptions::default())
        .context(PatientSnafu { path: &args.study })?;
    let report = processor
        .execute_manually(&args.ct)
        .context(PatientSnafu { path: &args.study })?;
    tracing::info!(
        "Converted {} into {}",
        args.study.display(),
        processor.output_folder().display()
    );
    Ok(report)
}
