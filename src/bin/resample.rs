use clap::Parser;
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::path::PathBuf;
use tracing::{error, Level};

use cta_convert::errors::NiftiError;
use cta_convert::load::load_nifti;
use cta_convert::save::NiftiSaver;
use cta_convert::transform::{
    Interpolator, Resample, Transform, DEFAULT_CT_FILL, DEFAULT_LABEL_FILL,
};
use cta_convert::volume::{PixelType, Volume};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Invalid source path: {}", path.display()))]
    InvalidSourcePath { path: PathBuf },

    #[snafu(display("Invalid spacing {:?}, expected three positive values", spacing))]
    InvalidSpacing { spacing: Vec<f64> },

    #[snafu(display("Error loading {}: {}", path.display(), source))]
    Load {
        path: PathBuf,
        #[snafu(source(from(NiftiError, Box::new)))]
        source: Box<NiftiError>,
    },

    #[snafu(display("Error saving {}: {}", path.display(), source))]
    Save {
        path: PathBuf,
        #[snafu(source(from(NiftiError, Box::new)))]
        source: Box<NiftiError>,
    },
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Resample a NIfTI volume to a new voxel spacing", long_about = None)]
struct Args {
    #[arg(help = "Source NIfTI file")]
    source: PathBuf,

    #[arg(help = "Output NIfTI file")]
    output: PathBuf,

    #[arg(
        help = "Target spacing in mm as x,y,z",
        long = "spacing",
        short = 's',
        value_delimiter = ',',
        required = true
    )]
    spacing: Vec<f64>,

    #[arg(
        help = "Treat the volume as a label map (nearest neighbor interpolation)",
        long = "label",
        default_value_t = false
    )]
    label: bool,

    #[arg(
        help = "Interpolation method, overriding the one implied by --label",
        long = "interpolator",
        short = 'i',
        value_enum
    )]
    interpolator: Option<Interpolator>,

    #[arg(
        help = "Voxel type of the output (default: same as the source)",
        long = "pixel-type",
        short = 't',
        value_enum
    )]
    pixel_type: Option<PixelType>,

    #[arg(
        help = format!("Value for voxels outside the source (default: {DEFAULT_CT_FILL}, or {DEFAULT_LABEL_FILL} for labels)"),
        long = "default",
        short = 'd',
        allow_negative_numbers = true
    )]
    default_value: Option<f32>,
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

fn run(args: Args) -> Result<Volume, Error> {
    if !args.source.is_file() {
        return InvalidSourcePathSnafu { path: args.source }.fail();
    }
    let spacing: [f64; 3] = match args.spacing.as_slice() {
        &[x, y, z] if [x, y, z].iter().all(|s| s.is_finite() && *s > 0.0) => [x, y, z],
        _ => {
            return InvalidSpacingSnafu {
                spacing: args.spacing.clone(),
            }
            .fail()
        }
    };
    let default_value = args.default_value.unwrap_or(if args.label {
        DEFAULT_LABEL_FILL
    } else {
        DEFAULT_CT_FILL
    });

    let volume = load_nifti(&args.source).context(LoadSnafu { path: &args.source })?;
    let interpolator = args
        .interpolator
        .unwrap_or_else(|| Interpolator::for_label(args.label));
    let resample = Resample::to_spacing(&volume.geometry, spacing, interpolator, default_value);
    tracing::info!(
        "Resampling {} with {} interpolation",
        args.source.display(),
        resample.interpolator
    );
    let output = resample.apply(&volume);
    let output = match args.pixel_type {
        Some(pixel_type) => output.with_pixel_type(pixel_type),
        None => output,
    };
    NiftiSaver::new()
        .save(&output, &args.output)
        .context(SaveSnafu { path: &args.output })?;
    tracing::info!("Wrote {}\n{}", args.output.display(), output);
    Ok(output)
}
