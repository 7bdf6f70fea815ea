use std::thread;

use anyhow::{Context, Result, bail};

use raman_review::config::load_settings;
use raman_review::data::loader::{load_noise_table, load_scan};
use raman_review::error::ScanError;
use raman_review::review::channel::review_channel;
use raman_review::scan::orchestrator::ScanOrchestrator;
use raman_review::scan::results::CsvResultStore;
use raman_review::ui::terminal::TerminalReviewer;

use crate::Cli;

// ---------------------------------------------------------------------------
// Run glue: load inputs, scan on a worker thread, review on this one
// ---------------------------------------------------------------------------

pub fn run(cli: Cli) -> Result<()> {
    let mut settings = load_settings(&cli.settings)?;
    if let Some(mode) = cli.mode {
        log::info!("Run mode overridden to {mode}");
        settings.run_mode = mode;
    }

    let mut scan = load_scan(&cli.scan)?;
    if let Some(name) = cli.name {
        scan.name = name;
    }

    let noise_path = settings.noise_path(&cli.noise_dir);
    let reference = load_noise_table(&noise_path)?;
    if reference.len() != scan.raman_shift.len() {
        bail!(
            "noise table {} has {} samples but scan {} has {}",
            noise_path.display(),
            reference.len(),
            scan.name,
            scan.raman_shift.len()
        );
    }
    log::info!(
        "Loaded {} points of {} and noise reference {}",
        scan.len(),
        scan.name,
        noise_path.display()
    );

    let (mut gate, desk) = review_channel();
    let mut sink = CsvResultStore::new(&cli.results, settings.mineral_name.clone());
    let mut orchestrator = ScanOrchestrator::new(settings);

    // The orchestrator comes back with the thread so unsaved rows survive a
    // failed save.
    let worker = thread::Builder::new()
        .name("scan".into())
        .spawn(move || {
            let result = orchestrator.run_scan(&scan, &reference, &mut gate, &mut sink);
            (orchestrator, result)
        })
        .context("spawning scan thread")?;

    let mut terminal = TerminalReviewer::stdio();
    let reviewed = desk.serve(&mut terminal);

    let (mut orchestrator, result) = match worker.join() {
        Ok(joined) => joined,
        Err(_) => bail!("scan thread panicked"),
    };
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(ScanError::Persist(error)) => {
            let (approved, denied) = orchestrator.pending_rows();
            log::warn!("{approved} approved and {denied} denied rows are still unsaved");
            terminal
                .recover_results(&mut orchestrator, cli.results.clone(), error)
                .context("results were not saved")?
        }
        Err(e) => return Err(e.into()),
    };
    log::info!(
        "Finished: {} approved, {} denied, {} reviewed ({reviewed} by operator), saved to {}",
        outcome.approved.len(),
        outcome.denied.len(),
        outcome.reviewed,
        outcome.output.display()
    );
    println!(
        "{} approved, {} denied -> {}",
        outcome.approved.len(),
        outcome.denied.len(),
        outcome.output.display()
    );
    Ok(())
}
