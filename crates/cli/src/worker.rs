use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, Result};
use mvdose_core::{ProgressEvent, ReconstructOptions, Reconstruction, Reconstructor, Source};
use tracing::{debug, info, warn};

/// Runs reconstruction off the calling thread and relays its progress here.
///
/// The engine owns its sources for the whole run; the caller only observes
/// events and receives the finished index.
pub fn run_in_background(sources: Vec<Source>, options: ReconstructOptions) -> Result<Reconstruction> {
    let (tx, rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name("mvdose-reconstruct".to_string())
        .spawn(move || {
            Reconstructor::new(options).run(&sources, |event| {
                // The receiver only goes away once the run is over.
                let _ = tx.send(event);
            })
        })?;

    for event in rx {
        report(&event);
    }

    let outcome = handle
        .join()
        .map_err(|_| anyhow!("reconstruction worker panicked"))?;
    Ok(outcome?)
}

fn report(event: &ProgressEvent) {
    match event {
        ProgressEvent::SourceOpened { index, count, name } => {
            info!("reading source {}/{}: {}", index + 1, count, name);
        }
        ProgressEvent::SourceSkipped {
            index,
            count,
            name,
            reason,
        } => {
            warn!("skipped source {}/{}: {} ({})", index + 1, count, name, reason);
        }
        ProgressEvent::RecordAccepted {
            plan_count,
            record_count,
        } => {
            debug!(plans = plan_count, records = record_count, "beam accepted");
        }
        ProgressEvent::Finished { source_count } => {
            debug!(sources = source_count, "worker finished");
        }
    }
}
