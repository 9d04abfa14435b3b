use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use mvdose_core::{
    discover_all, parse_date, summarize_day, summarize_plan, PlanIndex, QaThresholds,
    ReconstructOptions, Source,
};
use mvdose_index::JsonlWriter;
use tracing::info;

use crate::worker::run_in_background;

pub fn sources(inputs: &[PathBuf], out: &mut impl Write) -> Result<()> {
    let sources = discover_all(inputs)?;
    for source in &sources {
        writeln!(out, "{}\t{}", source.kind().as_str(), source)?;
    }
    info!(count = sources.len(), "listed sources");
    Ok(())
}

pub fn plans(inputs: &[PathBuf], options: ReconstructOptions, out: &mut impl Write) -> Result<()> {
    let index = load_index(inputs, options)?;
    for plan in index.plan_names() {
        let days = index.dates_for_plan(&plan);
        writeln!(
            out,
            "{}\t{} beams\t{}",
            plan,
            index.records_for_plan(&plan).len(),
            days.join(",")
        )?;
    }
    Ok(())
}

pub fn entries(
    inputs: &[PathBuf],
    options: ReconstructOptions,
    plan: &str,
    date: &str,
    out: Option<&Path>,
) -> Result<usize> {
    let day = parse_date(date)?;
    let index = load_index(inputs, options)?;
    let mut writer = JsonlWriter::new(open_output(out)?);
    for record in index.entries_for_plan_and_date(plan, day) {
        writer.write_record(&record.to_row())?;
    }
    let written = writer.written();
    writer.finish()?;
    info!(plan, date, rows = written, "wrote entries");
    Ok(written)
}

pub fn summary(
    inputs: &[PathBuf],
    options: ReconstructOptions,
    thresholds: &QaThresholds,
    plan: &str,
    date: Option<&str>,
    out: &mut impl Write,
) -> Result<usize> {
    let index = load_index(inputs, options)?;
    if index.records_for_plan(plan).is_empty() {
        bail!("no treatment beams for plan {plan}");
    }
    let summaries = match date {
        Some(raw) => summarize_day(&index, plan, parse_date(raw)?, thresholds)
            .into_iter()
            .collect(),
        None => summarize_plan(&index, plan, thresholds),
    };
    let mut writer = JsonlWriter::new(out);
    for summary in &summaries {
        writer.write_record(summary)?;
    }
    let written = writer.written();
    writer.finish()?;
    Ok(written)
}

pub fn dump(inputs: &[PathBuf], options: ReconstructOptions, out: &Path) -> Result<usize> {
    let index = load_index(inputs, options)?;
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut writer = JsonlWriter::new(open_output(Some(out))?);
    for record in index.records() {
        writer.write_record(&record.to_row())?;
    }
    let written = writer.written();
    writer.finish()?;
    info!(rows = written, out = %out.display(), "dumped beam records");
    Ok(written)
}

fn load_index(inputs: &[PathBuf], options: ReconstructOptions) -> Result<PlanIndex> {
    let sources: Vec<Source> = discover_all(inputs)?;
    let run = run_in_background(sources, options)?;
    Ok(run.index)
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}
