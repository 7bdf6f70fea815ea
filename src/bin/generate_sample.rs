use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Builder, Int64Array, ListBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use raman_review::config::Settings;
use raman_review::data::loader::RAMAN_SHIFT_COLUMN;

const NOISE_ID: &str = "stowed_arm";
const NOISE_MEASUREMENTS: usize = 5;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Instrument background shared by the noise table and every point.
fn dark_level(x: f64) -> f64 {
    25.0 + 8.0 * (-(x - 300.0) / 400.0).exp()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// One synthetic point: background, fluorescence slope, peaks and shot noise.
fn generate_point(
    raman_shift: &[f64],
    peaks: &[(f64, f64, f64)],
    slope: f64,
    rng: &mut SimpleRng,
) -> Vec<f64> {
    raman_shift
        .iter()
        .map(|&x| {
            let signal: f64 = peaks
                .iter()
                .map(|&(mu, sigma, amp)| gaussian(x, mu, sigma, amp))
                .sum();
            dark_level(x) + slope * (x - 200.0) + signal + rng.gauss(0.0, 1.5)
        })
        .collect()
}

fn write_scan(path: &Path, raman_shift: &[f64], points: &[Vec<f64>]) -> Result<()> {
    let mut x_builder = ListBuilder::new(Float64Builder::new());
    let mut y_builder = ListBuilder::new(Float64Builder::new());
    for row in points {
        x_builder.values().append_slice(raman_shift);
        x_builder.append(true);
        y_builder.values().append_slice(row);
        y_builder.append(true);
    }
    let point_ids = Int64Array::from_iter_values(0..points.len() as i64);

    let item = || Arc::new(Field::new("item", DataType::Float64, true));
    let schema = Arc::new(Schema::new(vec![
        Field::new("x", DataType::List(item()), false),
        Field::new("y", DataType::List(item()), false),
        Field::new("point", DataType::Int64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(x_builder.finish()),
            Arc::new(y_builder.finish()),
            Arc::new(point_ids),
        ],
    )
    .context("building record batch")?;

    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn write_noise_table(path: &Path, raman_shift: &[f64], rng: &mut SimpleRng) -> Result<()> {
    let measurements: Vec<Vec<f64>> = (0..NOISE_MEASUREMENTS)
        .map(|_| {
            raman_shift
                .iter()
                .map(|&x| dark_level(x) + rng.gauss(0.0, 1.5))
                .collect()
        })
        .collect();

    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    let mut header = vec!["CCD pixel".to_string(), RAMAN_SHIFT_COLUMN.to_string()];
    header.extend((1..=NOISE_MEASUREMENTS).map(|i| format!("{NOISE_ID}_{i}")));
    writer.write_record(&header)?;

    for (i, &x) in raman_shift.iter().enumerate() {
        let mut record = vec![i.to_string(), format!("{x:.3}")];
        record.extend(measurements.iter().map(|m| format!("{:.4}", m[i])));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_settings(path: &Path) -> Result<()> {
    let settings = Settings {
        snr_threshold: 5.0,
        r_squared_threshold: 0.8,
        fwhm_min: 5.0,
        fwhm_max: 30.0,
        center_range: 10.0,
        max_half_window: 40,
        smooth_half_window: 3,
        expected_center: 1085.0,
        mineral_name: "Carbonate".into(),
        noise_sample_id: NOISE_ID.into(),
        run_mode: Default::default(),
        fit_half_width: 150.0,
        reference_band: Default::default(),
    };
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    writer.serialize(&settings)?;
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let out_dir = std::env::args().nth(1).unwrap_or_else(|| "sample_data".into());
    let out_dir = Path::new(&out_dir);
    let noise_dir = out_dir.join("Noise");
    fs::create_dir_all(&noise_dir).with_context(|| format!("creating {}", noise_dir.display()))?;

    let mut rng = SimpleRng::new(42);

    // Raman shift: 200 → 2399.2 cm-1, step 0.8 (reaches the 2000-2100 silent band)
    let raman_shift: Vec<f64> = (0..2750).map(|i| 200.0 + i as f64 * 0.8).collect();

    // (carbonate amplitude, neighbour amplitude) per point; the neighbour sits at 1110.
    let layout: [(f64, f64); 12] = [
        (150.0, 0.0),
        (80.0, 0.0),
        (0.0, 0.0),
        (40.0, 0.0),
        (12.0, 0.0),
        (120.0, 70.0),
        (0.0, 60.0),
        (200.0, 0.0),
        (6.0, 0.0),
        (90.0, 40.0),
        (0.0, 0.0),
        (60.0, 0.0),
    ];

    let points: Vec<Vec<f64>> = layout
        .iter()
        .enumerate()
        .map(|(i, &(carbonate, neighbour))| {
            let mut peaks = vec![(465.0, 6.0, 30.0)];
            if carbonate > 0.0 {
                peaks.push((1085.0, 4.5, carbonate));
            }
            if neighbour > 0.0 {
                peaks.push((1110.0, 5.0, neighbour));
            }
            let slope = 0.01 + 0.002 * i as f64;
            generate_point(&raman_shift, &peaks, slope, &mut rng)
        })
        .collect();

    let scan_path = out_dir.join("sol_0100.parquet");
    write_scan(&scan_path, &raman_shift, &points)?;
    write_noise_table(&noise_dir.join(format!("{NOISE_ID}.csv")), &raman_shift, &mut rng)?;
    write_settings(&out_dir.join("Settings.csv"))?;

    println!(
        "Wrote {} points ({} samples each) to {}, noise and settings alongside",
        points.len(),
        raman_shift.len(),
        scan_path.display()
    );
    Ok(())
}
