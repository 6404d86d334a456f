//! Defective ("hot"/"dead") pixel detection and repair for 16-bit RGB
//! rasters. A local statistical outlier test, unrelated to the
//! registration pipeline: a pixel whose Euclidean deviation from the mean
//! of its 8 neighbors exceeds a threshold is replaced by the 3x3
//! per-channel median.

use image::ImageBuffer;

pub type Rgb16Image = ImageBuffer<image::Rgb<u16>, Vec<u16>>;

/// Deviation above which a pixel is considered defective, in 16-bit
/// sample units across all three channels.
pub const DEFAULT_DEVIATION_THRESHOLD: f64 = 355.0;

/// One corrected pixel for the repair report. Channel is 1-based and
/// names the pixel's dominant channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefectRecord {
    pub row: u32,
    pub col: u32,
    pub channel: u8,
    pub bad_value: u16,
    pub corrected_value: u16,
}

/// Scan the interior of `img` (the one-pixel border is never touched)
/// and replace defective pixels. Returns the corrected image and the
/// report entries in scan order.
pub fn correct_defects(img: &Rgb16Image, threshold: f64) -> (Rgb16Image, Vec<DefectRecord>) {
    let (w, h) = img.dimensions();
    let mut corrected = img.clone();
    let mut report = Vec::new();

    if w < 3 || h < 3 {
        return (corrected, report);
    }

    let median = median_filter_3x3(img);

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let p = img.get_pixel(x, y);

            let mut mean = [0.0f64; 3];
            for (dx, dy) in NEIGHBORS {
                let q = img.get_pixel((x as i64 + dx) as u32, (y as i64 + dy) as u32);
                for c in 0..3 {
                    mean[c] += q[c] as f64;
                }
            }
            for m in mean.iter_mut() {
                *m /= 8.0;
            }

            let deviation = (0..3)
                .map(|c| (p[c] as f64 - mean[c]).powi(2))
                .sum::<f64>()
                .sqrt();

            if deviation > threshold {
                let fix = *median.get_pixel(x, y);
                corrected.put_pixel(x, y, fix);

                let dominant = (0..3).max_by_key(|&c| p[c]).unwrap_or(0);
                report.push(DefectRecord {
                    row: y,
                    col: x,
                    channel: dominant as u8 + 1,
                    bad_value: p[dominant],
                    corrected_value: fix[dominant],
                });
            }
        }
    }

    (corrected, report)
}

const NEIGHBORS: [(i64, i64); 8] = [
    (-1, -1), (0, -1), (1, -1),
    (-1, 0), (1, 0),
    (-1, 1), (0, 1), (1, 1),
];

/// Per-channel 3x3 median; border pixels keep their original values.
fn median_filter_3x3(img: &Rgb16Image) -> Rgb16Image {
    let (w, h) = img.dimensions();
    let mut out = img.clone();

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut px = [0u16; 3];
            for c in 0..3 {
                let mut window = [0u16; 9];
                let mut k = 0;
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        window[k] = img.get_pixel((x as i64 + dx) as u32, (y as i64 + dy) as u32)[c];
                        k += 1;
                    }
                }
                window.sort_unstable();
                px[c] = window[4];
            }
            out.put_pixel(x, y, image::Rgb(px));
        }
    }

    out
}

/// Write the repair report: one `row; col; channel; bad; corrected` line
/// per entry.
pub fn write_report(path: &std::path::Path, records: &[DefectRecord]) -> std::io::Result<()> {
    use std::io::Write;

    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    writeln!(file, "[row]; [column]; [channel]; [bad value]; [corrected value]")?;
    for r in records {
        writeln!(
            file,
            "{}; {}; {}; {}; {}",
            r.row, r.col, r.channel, r.bad_value, r.corrected_value
        )?;
    }
    Ok(())
}
