use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::thread;

use raman_review::analysis::verdict::RunMode;
use raman_review::config::load_settings;
use raman_review::data::loader::{RAMAN_SHIFT_COLUMN, load_noise_table, load_scan};
use raman_review::review::ScriptedReviewer;
use raman_review::review::channel::{InlineGate, review_channel};
use raman_review::scan::orchestrator::ScanOrchestrator;
use raman_review::scan::results::{CsvResultStore, ResultRow};

// ---- Synthetic instrument files ----

fn axis() -> Vec<f64> {
    (0..3000).map(|i| 500.0 + i as f64 * 0.6).collect()
}

/// Stowed-arm pattern, ±1.
fn wiggle(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| if (i * 7919) % 13 < 6 { 1.0 } else { -1.0 })
        .collect()
}

/// Sloped background, the stowed-arm pattern, ±`own_noise` of point noise
/// and a Gaussian at 1085 cm-1.
fn trace(x: &[f64], amplitude: f64, own_noise: f64) -> Vec<f64> {
    let reference = wiggle(x.len());
    x.iter()
        .zip(&reference)
        .enumerate()
        .map(|(i, (&xi, &r))| {
            let own = if (i * 104729) % 11 < 5 { own_noise } else { -own_noise };
            40.0 + 0.005 * xi + r + own + amplitude * (-(xi - 1085.0).powi(2) / 32.0).exp()
        })
        .collect()
}

fn write_wide_csv(path: &Path, x: &[f64], columns: &[(&str, Vec<f64>)]) {
    let mut text = String::from(RAMAN_SHIFT_COLUMN);
    for (name, _) in columns {
        write!(text, ",{name}").unwrap();
    }
    text.push('\n');
    for (i, xi) in x.iter().enumerate() {
        write!(text, "{xi}").unwrap();
        for (_, values) in columns {
            write!(text, ",{}", values[i]).unwrap();
        }
        text.push('\n');
    }
    fs::write(path, text).unwrap();
}

/// Lays out `Settings.csv`, `Noise/stowed.csv` and `sol_0100.csv` (two points:
/// a strong carbonate peak, and a clean but weak one that only the
/// stowed-arm SNR rejects).
fn write_inputs(dir: &Path, mode: &str) {
    let x = axis();
    write_wide_csv(
        &dir.join("sol_0100.csv"),
        &x,
        &[("0", trace(&x, 120.0, 0.5)), ("1", trace(&x, 4.0, 0.05))],
    );

    fs::create_dir_all(dir.join("Noise")).unwrap();
    let w = wiggle(x.len());
    write_wide_csv(
        &dir.join("Noise").join("stowed.csv"),
        &x,
        &[("m1", w.clone()), ("m2", w.clone()), ("m3", w)],
    );

    fs::write(
        dir.join("Settings.csv"),
        format!(
            "SNR_THRESHOLD,R_SQUARED_THRESHOLD,FWHM_MIN,FWHM_MAX,CENTER_RANGE,SAMPLING,SMOOTHING,MINERAL_NAME,NOISE_SAMPLE,CENTER,RUN_MODE\n\
             5,0.8,5,30,10,20,3,Carbonate,stowed,1085,{mode}\n"
        ),
    )
    .unwrap();
}

fn read_rows(path: &Path) -> Vec<ResultRow> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader.deserialize().collect::<Result<_, _>>().unwrap()
}

#[test]
fn automatic_scan_from_files_to_result_tables() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path(), "automatic");

    let settings = load_settings(&dir.path().join("Settings.csv")).unwrap();
    assert_eq!(settings.run_mode, RunMode::Automatic);
    let thresholds = settings.thresholds();
    let scan = load_scan(&dir.path().join("sol_0100.csv")).unwrap();
    let reference = load_noise_table(&settings.noise_path(&dir.path().join("Noise"))).unwrap();
    assert_eq!(scan.name, "sol_0100");
    assert_eq!(scan.len(), 2);

    let results = dir.path().join("Results");
    let mut store = CsvResultStore::new(&results, settings.mineral_name.clone());
    let mut gate = InlineGate::new(ScriptedReviewer::new(Vec::<String>::new()));
    let mut orchestrator = ScanOrchestrator::new(settings);

    let outcome = orchestrator
        .run_scan(&scan, &reference, &mut gate, &mut store)
        .unwrap();

    assert_eq!(outcome.reviewed, 0);
    assert!(gate.into_inner().seen.is_empty());
    assert_eq!(outcome.output, results.join("Carbonate").join("sol_0100_1"));

    let approved = read_rows(&outcome.output.join("sol_0100_Approved.csv"));
    let denied = read_rows(&outcome.output.join("sol_0100_Denied.csv"));
    assert_eq!(approved.len(), 1);
    assert_eq!(denied.len(), 1);
    assert_eq!(approved[0].point, 0);
    assert!((approved[0].center - 1085.0).abs() < 1.0);
    assert!(approved[0].r_squared > 0.8);
    assert!(approved[0].other_center.is_none());

    // Everything but the SNR passes on the denied point.
    let weak = &denied[0];
    assert_eq!(weak.point, 1);
    assert!(weak.r_squared > thresholds.r_squared, "{weak:?}");
    assert!(thresholds.fwhm_in_range(weak.fwhm), "{weak:?}");
    assert!((weak.center - thresholds.expected_center).abs() < thresholds.center_range);
    assert!(weak.snr_reference < thresholds.snr, "{weak:?}");
    assert!(weak.snr_silent > thresholds.snr, "{weak:?}");
}

#[test]
fn manual_scan_reviewed_on_another_thread() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path(), "manual");

    let settings = load_settings(&dir.path().join("Settings.csv")).unwrap();
    let scan = load_scan(&dir.path().join("sol_0100.csv")).unwrap();
    let reference = load_noise_table(&settings.noise_path(&dir.path().join("Noise"))).unwrap();
    let mut store = CsvResultStore::new(dir.path().join("Results"), "Carbonate");

    let (mut gate, desk) = review_channel();
    let mut orchestrator = ScanOrchestrator::new(settings);
    let worker =
        thread::spawn(move || orchestrator.run_scan(&scan, &reference, &mut gate, &mut store));

    // Point 0: deny outright. Point 1: look at the baseline, then approve.
    let mut reviewer = ScriptedReviewer::new(["D", "B", "25", "3", "Y", "A"]);
    let resolved = desk.serve(&mut reviewer);
    let outcome = worker.join().unwrap().unwrap();

    assert_eq!(resolved, 2);
    assert_eq!(outcome.reviewed, 2);
    assert_eq!(outcome.denied.rows()[0].point, 0);
    assert_eq!(outcome.approved.rows()[0].point, 1);
    assert_eq!(reviewer.seen.len(), 6);
}
