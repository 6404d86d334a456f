//! `fix-pixels`: repair defective pixels in a 16-bit RGB raster and
//! write a correction report. Georeferencing tags are carried over when
//! the input has them.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use georeg_cli::defect::{correct_defects, write_report, DEFAULT_DEVIATION_THRESHOLD};
use georeg_cli::raster::read_geo_metadata;
use georeg_cli::writers::write_rgb16_geotiff;

#[derive(Parser)]
#[command(name = "fix-pixels", about = "Detect and repair defective pixels in a 16-bit raster")]
struct Args {
    /// Input raster (16-bit RGB TIFF)
    input: PathBuf,

    /// Corrected output raster
    output: PathBuf,

    /// Correction report (one `row; col; channel; bad; corrected` line
    /// per repaired pixel)
    report: PathBuf,

    /// Deviation threshold above which a pixel counts as defective
    #[arg(long, default_value_t = DEFAULT_DEVIATION_THRESHOLD)]
    threshold: f64,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("pixel repair failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let img = image::open(&args.input)?.to_rgb16();

    let (fixed, records) = correct_defects(&img, args.threshold);

    // keep the input's georeferencing if it is a GeoTIFF
    let geo = read_geo_metadata(&args.input).ok();
    write_rgb16_geotiff(
        &args.output,
        &fixed,
        geo.as_ref().map(|(gt, epsg)| (gt, *epsg)),
    )?;
    write_report(&args.report, &records)?;

    println!(
        "repaired {} pixels, wrote {} and {}",
        records.len(),
        args.output.display(),
        args.report.display()
    );
    Ok(())
}
