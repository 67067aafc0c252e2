#![allow(non_snake_case)]

use std::path::PathBuf;

use clap::{AppSettings, Parser};
use log::{debug, info};

use ugmrt_ds::{params::MakeDsArgs, pipeline::Pipeline, setup_logging, DsError};

/// Make a dynamic spectrum from uGMRT beamformer data.
#[derive(Parser)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_long_args = true)]
#[clap(version)]
struct Args {
    /// A toml or json file of arguments. Arguments given on the command line
    /// take precedence.
    #[clap(long, parse(from_os_str))]
    args_file: Option<PathBuf>,

    #[clap(flatten)]
    ds_args: MakeDsArgs,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv). The default is to print only high-level information.
    #[clap(short, long, parse(from_occurrences))]
    verbosity: u8,

    /// Disable progress bars.
    #[clap(long)]
    no_progress_bars: bool,
}

fn main() {
    if let Err(e) = try_main() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), DsError> {
    let Args {
        args_file,
        ds_args,
        verbosity,
        no_progress_bars,
    } = Args::parse();
    setup_logging(verbosity);
    info!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let ds_args = match args_file {
        Some(args_file) => {
            debug!("Merging arguments from {}", args_file.display());
            ds_args.merge(args_file)?
        }
        None => ds_args,
    };
    let params = ds_args.into_params()?;
    info!("Input: {} ({:?})", params.data.display(), params.input_type);
    info!(
        "Observation {}: {} channels, {}s time bins",
        params.obs_context.obs_id, params.obs_context.num_chans, params.time_res
    );

    let reader = params.open_reader(!no_progress_bars)?;
    let mut pipeline = Pipeline::from_params(&params)?;
    let ds = pipeline.run(reader, &params)?;
    info!(
        "Finished: {} time bins x {} channels",
        ds.num_times(),
        ds.num_chans()
    );
    Ok(())
}
