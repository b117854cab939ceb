use clap::Parser;
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::path::PathBuf;
use tracing::{error, Level};

use cta_convert::errors::NiftiError;
use cta_convert::load::load_nifti;
use cta_convert::volume::Volume;

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid source path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("Error loading {}: {}", path.display(), source))]
    Load {
        path: PathBuf,
        #[snafu(source(from(NiftiError, Box::new)))]
        source: Box<NiftiError>,
    },
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Print the geometry of a NIfTI volume", long_about = None)]
struct Args {
    #[arg(help = "NIfTI file (.nii or .nii.gz)")]
    source: PathBuf,
}

fn main() {
    let args = Args::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(Level::WARN)
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    match run(args) {
        Ok(volume) => println!("{}", volume),
        Err(e) => {
            error!("{}", Report::from_error(e));
            std::process::exit(-1);
        }
    }
}

fn run(args: Args) -> Result<Volume, Error> {
    if !args.source.is_file() {
        return InvalidSourcePathSnafu { path: args.source }.fail();
    }
    load_nifti(&args.source).context(LoadSnafu { path: &args.source })
}
