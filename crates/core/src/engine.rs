use tracing::{debug, info, warn};

use crate::error::Result;
use crate::grammar::{classify_all, LineEvent};
use crate::query::{PlanIndex, PlanIndexBuilder};
use crate::record::{BeamRecord, PendingBeam};
use crate::source::{Source, SourceReader};

/// Side-channel notifications for a host UI. They never steer the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    SourceOpened {
        index: usize,
        count: usize,
        name: String,
    },
    SourceSkipped {
        index: usize,
        count: usize,
        name: String,
        reason: String,
    },
    RecordAccepted {
        plan_count: usize,
        record_count: usize,
    },
    Finished {
        source_count: usize,
    },
}

/// What to do when a source cannot be opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OpenFailurePolicy {
    /// Stop the run with [`crate::MvDoseError::SourceOpen`].
    #[default]
    Abort,
    /// Log, report [`ProgressEvent::SourceSkipped`] and continue with the next source.
    Skip,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconstructOptions {
    pub open_failure: OpenFailurePolicy,
}

/// Counters for one reconstruction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconstructionReport {
    pub sources_read: usize,
    pub sources_skipped: usize,
    pub lines: usize,
    pub committed: usize,
    pub accepted: usize,
    pub non_treatment: usize,
    pub dropped_incomplete: usize,
}

#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub index: PlanIndex,
    pub report: ReconstructionReport,
}

/// Presents an ordered list of sources as one continuous line sequence.
///
/// Exactly one source is open at a time; it is closed before the next opens.
struct LineStream<'a> {
    sources: &'a [Source],
    next: usize,
    current: Option<SourceReader>,
    policy: OpenFailurePolicy,
    finished: bool,
    report: ReconstructionReport,
}

impl<'a> LineStream<'a> {
    fn new(sources: &'a [Source], policy: OpenFailurePolicy) -> Self {
        Self {
            sources,
            next: 0,
            current: None,
            policy,
            finished: false,
            report: ReconstructionReport::default(),
        }
    }

    fn next_line(&mut self, progress: &mut impl FnMut(ProgressEvent)) -> Result<Option<String>> {
        loop {
            if let Some(reader) = self.current.as_mut() {
                if let Some(line) = reader.next_line()? {
                    self.report.lines += 1;
                    return Ok(Some(line));
                }
                if let Some(reader) = self.current.take() {
                    debug!(
                        source = reader.name(),
                        lines = reader.lines_read(),
                        "source exhausted"
                    );
                    reader.close();
                }
            }
            if self.next >= self.sources.len() {
                if !self.finished {
                    self.finished = true;
                    progress(ProgressEvent::Finished {
                        source_count: self.sources.len(),
                    });
                }
                return Ok(None);
            }
            let index = self.next;
            self.next += 1;
            let source = &self.sources[index];
            match source.open() {
                Ok(reader) => {
                    self.current = Some(reader);
                    self.report.sources_read += 1;
                    progress(ProgressEvent::SourceOpened {
                        index,
                        count: self.sources.len(),
                        name: source.name().to_string(),
                    });
                }
                Err(err) if self.policy == OpenFailurePolicy::Skip => {
                    warn!(source = %source, error = %err, "skipping unreadable source");
                    self.report.sources_skipped += 1;
                    progress(ProgressEvent::SourceSkipped {
                        index,
                        count: self.sources.len(),
                        name: source.name().to_string(),
                        reason: err.reason.to_string(),
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[derive(Debug, Default)]
enum AssemblyState {
    #[default]
    Scanning,
    Assembling(PendingBeam),
}

/// Block state machine: a measured-dose line opens a block, the system
/// delivery line closes it.
#[derive(Debug, Default)]
pub(crate) struct BlockAssembler {
    state: AssemblyState,
}

impl BlockAssembler {
    /// Feeds one line; returns the record the line completes, if any.
    pub(crate) fn feed(&mut self, line: &str) -> Option<BeamRecord> {
        let events = classify_all(line);
        if events.is_empty() {
            return None;
        }
        let mut pending = match std::mem::take(&mut self.state) {
            AssemblyState::Assembling(pending) => pending,
            AssemblyState::Scanning => {
                let opening = events.iter().find_map(|event| match event {
                    LineEvent::Measured(measured) => Some(measured),
                    _ => None,
                })?;
                PendingBeam::open(opening)
            }
        };
        for event in &events {
            if let LineEvent::SystemData(system) = event {
                return Some(pending.commit(system));
            }
            pending.apply(event);
        }
        self.state = AssemblyState::Assembling(pending);
        None
    }

    pub(crate) fn is_assembling(&self) -> bool {
        matches!(self.state, AssemblyState::Assembling(_))
    }
}

/// Rebuilds beam records from an ordered source list.
///
/// Each run starts from an empty index; nothing carries over between runs.
#[derive(Debug, Clone, Default)]
pub struct Reconstructor {
    options: ReconstructOptions,
}

impl Reconstructor {
    pub fn new(options: ReconstructOptions) -> Self {
        Self { options }
    }

    pub fn run<F>(&self, sources: &[Source], mut progress: F) -> Result<Reconstruction>
    where
        F: FnMut(ProgressEvent),
    {
        let mut builder = PlanIndexBuilder::default();
        let mut assembler = BlockAssembler::default();
        let mut stream = LineStream::new(sources, self.options.open_failure);
        let mut committed = 0;
        let mut non_treatment = 0;

        while let Some(line) = stream.next_line(&mut progress)? {
            let Some(record) = assembler.feed(&line) else {
                continue;
            };
            committed += 1;
            let plan = record.plan_name.clone();
            if builder.accept(record) {
                progress(ProgressEvent::RecordAccepted {
                    plan_count: builder.plan_count(),
                    record_count: builder.accepted(),
                });
            } else {
                non_treatment += 1;
                debug!(plan = %plan, "discarded non-treatment beam");
            }
        }

        let mut report = stream.report;
        report.committed = committed;
        report.accepted = builder.accepted();
        report.non_treatment = non_treatment;
        if assembler.is_assembling() {
            report.dropped_incomplete = 1;
            warn!("input ended inside a beam block; dropping it");
        }
        let index = builder.finish();
        info!(
            sources = report.sources_read,
            skipped = report.sources_skipped,
            lines = report.lines,
            plans = index.plan_count(),
            records = report.accepted,
            "reconstruction finished"
        );
        Ok(Reconstruction { index, report })
    }
}

/// Reconstructs with default options, aborting on the first unopenable source.
pub fn reconstruct<F>(sources: &[Source], progress: F) -> Result<PlanIndex>
where
    F: FnMut(ProgressEvent),
{
    Reconstructor::default()
        .run(sources, progress)
        .map(|run| run.index)
}
