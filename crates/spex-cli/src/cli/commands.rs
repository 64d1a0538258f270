use super::helpers::{ensure_extension, open_store, read_arf, read_pha, read_rmf, save_store};
use super::CliError;
use spex_core::convert::{convert_region, ConversionInput};
use spex_core::data::{clean_region, plan_model_grid, ResolutionProfile};
use spex_core::ogip::Pha;
use spex_core::spex::{Region, ResponseMatrix, Spectrum};
use spex_core::table::JsonTabularStore;
use std::path::PathBuf;
use tracing::info;

#[derive(clap::Args)]
pub(super) struct ConvertArgs {
    /// Input PHA source spectrum
    #[arg(long)]
    pha: PathBuf,

    /// Input RMF/RSP response matrix
    #[arg(long)]
    rmf: PathBuf,

    /// Input ARF effective area (optional)
    #[arg(long)]
    arf: Option<PathBuf>,

    /// Input background PHA spectrum (optional)
    #[arg(long)]
    bkg: Option<PathBuf>,

    /// Input correction PHA spectrum (optional)
    #[arg(long)]
    corr: Option<PathBuf>,

    /// Keep the OGIP grouping information
    #[arg(long)]
    keep_grouping: bool,

    #[command(flatten)]
    output: OutputFlags,
}

#[derive(clap::Args)]
pub(super) struct SimulateArgs {
    /// Input RMF/RSP response matrix
    #[arg(long)]
    rmf: PathBuf,

    /// Input ARF effective area (optional)
    #[arg(long)]
    arf: Option<PathBuf>,

    /// Input background PHA spectrum (optional)
    #[arg(long)]
    bkg: Option<PathBuf>,

    /// Divide the background backscale values by this factor
    #[arg(long, default_value_t = 1.0)]
    backscale: f64,

    #[command(flatten)]
    output: OutputFlags,
}

#[derive(clap::Args)]
pub(super) struct ResolutionArgs {
    /// Input spo spectrum file
    #[arg(long)]
    spo: PathBuf,

    /// Input res response file
    #[arg(long)]
    res: PathBuf,

    /// Sector number to analyse
    #[arg(long, default_value_t = 1)]
    sector: usize,

    /// Region number to analyse
    #[arg(long, default_value_t = 1)]
    region: usize,

    /// Emit the profile as JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(serde::Serialize)]
struct ResolutionReport<'a> {
    sector: usize,
    region: usize,
    profile: &'a spex_core::data::ResolutionProfile,
    proposed_grid: &'a [f64],
}

#[derive(clap::Args, Default)]
pub(super) struct OutputFlags {
    /// Output spo spectrum file
    #[arg(long)]
    spo: PathBuf,

    /// Output res response file
    #[arg(long)]
    res: PathBuf,

    /// Overwrite existing output files
    #[arg(long)]
    overwrite: bool,

    /// Keep bad channels instead of removing them
    #[arg(long)]
    no_clean: bool,

    /// Write the Exp_Rate backscale-ratio column
    #[arg(long)]
    exp_rate: bool,
}

pub(super) fn run_convert_command(args: ConvertArgs) -> Result<i32, CliError> {
    info!(pha = %args.pha.display(), rmf = %args.rmf.display(), "reading OGIP files");

    let source = read_pha(&args.pha)?;
    let rmf = read_rmf(&args.rmf)?;
    let mut input = ConversionInput::new(source, rmf);
    if let Some(path) = &args.bkg {
        input.background = Some(read_pha(path)?);
    }
    if let Some(path) = &args.corr {
        input.correction = Some(read_pha(path)?);
    }
    if let Some(path) = &args.arf {
        input.area = Some(read_arf(path)?);
    }
    input.keep_grouping = args.keep_grouping;

    let region = convert_region(&input)?;
    write_region(&region, &args.output)
}

pub(super) fn run_simulate_command(args: SimulateArgs) -> Result<i32, CliError> {
    info!(rmf = %args.rmf.display(), "reading response files");

    let rmf = read_rmf(&args.rmf)?;
    let source = Pha::create_dummy(&rmf);
    let mut input = ConversionInput::new(source, rmf);
    if let Some(path) = &args.bkg {
        let mut background = read_pha(path)?;
        for scaling in &mut background.back_scaling {
            *scaling /= args.backscale;
        }
        input.background = Some(background);
    }
    if let Some(path) = &args.arf {
        input.area = Some(read_arf(path)?);
    }

    let region = convert_region(&input)?;
    write_region(&region, &args.output)
}

pub(super) fn run_resolution_command(args: ResolutionArgs) -> Result<i32, CliError> {
    let spo_store = open_store(&args.spo)?;
    let res_store = open_store(&args.res)?;
    let spectrum = Spectrum::read_from(&spo_store).map_err(CliError::from)?;
    let response = ResponseMatrix::read_from(&res_store).map_err(CliError::from)?;

    let region = Region::new(
        spectrum.extract_region(args.region)?,
        response.extract_region(args.sector, args.region)?,
    );
    let profile = ResolutionProfile::compute(&region)?;
    let grid = plan_model_grid(&profile);

    if args.json {
        let report = ResolutionReport {
            sector: args.sector,
            region: args.region,
            profile: &profile,
            proposed_grid: &grid,
        };
        let payload = serde_json::to_string_pretty(&report)
            .map_err(|error| CliError::Internal(error.into()))?;
        println!("{payload}");
        return Ok(0);
    }

    println!("Resolution of sector {} region {}:", args.sector, args.region);
    println!(
        "{:>4} {:>10} {:>10} {:>10} {:>10} {:>12} {:>12}",
        "comp", "E_lo", "E_hi", "centroid", "FWHM", "counts", "bin width"
    );
    for element in &profile.elements {
        if element.degenerate {
            println!(
                "{:>4} {:>10.5} {:>10.5} {:>10} {:>10} {:>12} {:>12}",
                element.component, element.energy_low, element.energy_high, "-", "-", "-", "-"
            );
        } else {
            println!(
                "{:>4} {:>10.5} {:>10.5} {:>10.5} {:>10.5} {:>12.1} {:>12.6}",
                element.component,
                element.energy_low,
                element.energy_high,
                element.centroid,
                element.resolution,
                element.expected_counts,
                element.optimal_width
            );
        }
    }
    println!("Resolution elements spanned by the grid: R = {:.3}", profile.resolving_sum);

    if grid.len() >= 2 {
        println!(
            "Proposed optimal model grid: {} bins over {:.5} - {:.5} keV",
            grid.len() - 1,
            grid[0],
            grid.last().expect("non-empty grid")
        );
    }
    Ok(0)
}

fn write_region(region: &Region, output: &OutputFlags) -> Result<i32, CliError> {
    let region = if output.no_clean {
        region.clone()
    } else {
        clean_region(region)?
    };

    let spo_path = ensure_extension(&output.spo, "spo");
    let res_path = ensure_extension(&output.res, "res");

    let mut spo_store = JsonTabularStore::new();
    region
        .spectrum
        .write_to(&mut spo_store, output.exp_rate)
        .map_err(CliError::from)?;
    save_store(&spo_store, &spo_path, output.overwrite)?;

    let mut res_store = JsonTabularStore::new();
    region.response.write_to(&mut res_store).map_err(CliError::from)?;
    save_store(&res_store, &res_path, output.overwrite)?;

    info!(
        spo = %spo_path.display(),
        res = %res_path.display(),
        "conversion finished"
    );
    Ok(0)
}
