use clap::Parser;
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{error, Level};

use cta_convert::discover::{special_cases, whole_body_folders};
use cta_convert::layout::FolderRules;

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid source path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("Failed to walk {}: {:?}", path.display(), source))]
    Walk {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("Failed to write {}: {:?}", path.display(), source))]
    WriteList {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "List folders of a CTA data tree that deviate from the expected layout", long_about = None)]
struct Args {
    #[arg(help = "Data root laid out as <date>/<patient>/<study>/<series>")]
    root: PathBuf,

    #[arg(
        help = "Write every irregular date, patient or non whole-body study folder to this file, one per line",
        long = "special-cases",
        short = 's'
    )]
    special_cases: Option<PathBuf>,

    #[arg(
        help = "Print every whole-body study folder that is the only study of its patient",
        long = "whole-body",
        short = 'w',
        default_value_t = false
    )]
    whole_body: bool,
}

/// Paths found by the audit.
#[derive(Debug, Default, PartialEq)]
struct Audit {
    special_cases: Vec<PathBuf>,
    whole_body: Vec<PathBuf>,
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
        Ok(audit) => {
            for path in audit.whole_body {
                println!("{}", path.display());
            }
        }
        Err(e) => {
            error!("{}", Report::from_error(e));
            std::process::exit(-1);
        }
    }
}

fn run(args: Args) -> Result<Audit, Error> {
    if !args.root.is_dir() {
        return InvalidSourcePathSnafu { path: args.root }.fail();
    }
    let mut audit = Audit::default();

    if let Some(dest) = args.special_cases.as_ref() {
        audit.special_cases = special_cases(&args.root, &FolderRules::default())
            .context(WalkSnafu { path: &args.root })?;
        let mut file = BufWriter::new(File::create(dest).context(WriteListSnafu { path: dest })?);
        for case in audit.special_cases.iter() {
            writeln!(file, "{}", case.display()).context(WriteListSnafu { path: dest })?;
        }
        file.flush().context(WriteListSnafu { path: dest })?;
        tracing::info!(
            "Wrote {} special cases to {}",
            audit.special_cases.len(),
            dest.display()
        );
    }

    if args.whole_body {
        audit.whole_body = whole_body_folders(&args.root);
        tracing::info!("Found {} whole-body studies", audit.whole_body.len());
    }
    Ok(audit)
}
