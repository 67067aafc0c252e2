#![allow(non_snake_case)]

use std::path::PathBuf;

use clap::{AppSettings, Parser};

use ugmrt_ds::{setup_logging, DsError};

/// Plot dynamic spectra written by make_uGMRT_ds.
#[derive(Parser)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
#[clap(infer_long_args = true)]
#[clap(version)]
struct Args {
    /// Dynamic spectrum files (.fits or .json) to plot.
    #[clap(name = "DYNSPEC_FILES", parse(from_os_str))]
    files: Vec<PathBuf>,

    /// The PNG to write. Only allowed with a single input; by default each
    /// plot is written next to its input with a .png extension.
    #[clap(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// The minimum of the colour scale.
    #[clap(long)]
    min_power: Option<f64>,

    /// The maximum of the colour scale.
    #[clap(long)]
    max_power: Option<f64>,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv).
    #[clap(short, long, parse(from_occurrences))]
    verbosity: u8,
}

fn main() {
    if let Err(e) = try_main() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(not(feature = "plotting"))]
fn try_main() -> Result<(), DsError> {
    let args = Args::parse();
    setup_logging(args.verbosity);
    // Plotting is an optional feature, because its C dependencies can't be
    // statically compiled everywhere.
    Err(DsError::NoPlottingFeature)
}

#[cfg(feature = "plotting")]
fn try_main() -> Result<(), DsError> {
    use log::{debug, info};
    use ugmrt_ds::{
        plot::{plot_dynamic_spectrum, PowerRange},
        spectrum::DynamicSpectrum,
    };

    let Args {
        files,
        output,
        min_power,
        max_power,
        verbosity,
    } = Args::parse();
    setup_logging(verbosity);

    if files.is_empty() {
        return Err(DsError::NoInputs);
    }
    if output.is_some() && files.len() > 1 {
        return Err(DsError::AmbiguousOutput(files.len()));
    }

    let range = PowerRange {
        min: min_power,
        max: max_power,
    };
    for file in &files {
        debug!("Plotting {}", file.display());
        let ds = DynamicSpectrum::read(file)?;
        let png = output
            .clone()
            .unwrap_or_else(|| file.with_extension("png"));
        let title = format!(
            "{}{}",
            ds.obs_id(),
            if ds.calibrated().iter().any(|&c| c) {
                " (calibrated)"
            } else {
                ""
            }
        );
        plot_dynamic_spectrum(&ds, &png, &title, range)?;
        info!("Wrote {}", png.display());
    }
    Ok(())
}
