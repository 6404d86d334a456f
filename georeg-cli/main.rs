//! `georeg`: align a crop raster onto a georeferenced layout and write
//! the footprint (GeoJSON) plus a georeferenced copy of the crop
//! (GeoTIFF).

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use georeg_cli::raster::{read_geo_metadata, Raster};
use georeg_cli::writers::{write_geojson, write_geotiff};
use georeg_cli::{Registrar, RegistrationConfig};

#[derive(Parser)]
#[command(name = "georeg", about = "Register a crop image onto a georeferenced layout raster")]
struct Args {
    /// Crop image (TIFF/PNG/JPEG)
    crop: PathBuf,

    /// Layout GeoTIFF carrying the geo-transform and CRS
    layout: PathBuf,

    /// Directory for the output GeoJSON and GeoTIFF
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Write a keypoint visualization of the crop to this path
    #[arg(long)]
    draw_keypoints: Option<PathBuf>,

    /// Worker thread count (defaults to the number of logical CPUs)
    #[arg(long)]
    threads: Option<usize>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let threads = args.threads.unwrap_or_else(georeg_core::default_threads);
    if let Err(e) = georeg_core::init_thread_pool(threads) {
        log::warn!("thread pool already initialized: {}", e);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();

    let crop = Raster::open(&args.crop)?;
    let layout = Raster::open(&args.layout)?;
    let (gt, epsg) = read_geo_metadata(&args.layout)?;
    log::info!(
        "loaded {} ({}x{}) and {} ({}x{}), EPSG:{}",
        crop.name,
        crop.width(),
        crop.height(),
        layout.name,
        layout.width(),
        layout.height(),
        epsg
    );

    if let Some(path) = &args.draw_keypoints {
        draw_keypoints(&crop, path)?;
    }

    let result = Registrar::new(RegistrationConfig::default())
        .register(&crop, &layout, &gt)
        .map_err(|e| format!("registration failed ({}): {}", e.stage(), e))?;

    let crop_stem = stem(&args.crop);
    let layout_stem = stem(&args.layout);
    std::fs::create_dir_all(&args.out_dir)?;

    let geojson_path = args
        .out_dir
        .join(format!("{}_to_{}.geojson", crop_stem, layout_stem));
    write_geojson(&geojson_path, &result, epsg)?;

    let geotiff_path = args.out_dir.join(format!("{}_aligned.tif", crop_stem));
    write_geotiff(&geotiff_path, &crop, &gt, epsg)?;

    println!(
        "registered {} onto {}: {} inliers, outputs {} and {} ({:.2}s)",
        result.crop_name,
        result.layout_name,
        result.inliers,
        geojson_path.display(),
        geotiff_path.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

fn draw_keypoints(raster: &Raster, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    use georeg_features::FeatureExtractor;
    use imageproc::drawing::draw_hollow_circle_mut;

    let ex = FeatureExtractor::new(Default::default(), raster.width(), raster.height())?;
    let (kps, _) = ex.extract(&raster.to_gray())?;

    let mut canvas = raster.image.to_rgb8();
    for kp in &kps {
        draw_hollow_circle_mut(
            &mut canvas,
            (kp.x as i32, kp.y as i32),
            4,
            image::Rgb([255, 0, 0]),
        );
    }
    canvas.save(path)?;
    log::info!("wrote {} keypoints to {}", kps.len(), path.display());
    Ok(())
}
