mod discovery;
mod engine;
mod error;
mod grammar;
mod isocenter;
mod qa;
mod query;
mod record;
mod source;

pub use discovery::{
    collect_sources, dedup_sources, discover, discover_all, is_log_filename, is_zip_archive,
    parse_log_filename, sort_sources, LogFileKey,
};
pub use engine::{
    reconstruct, OpenFailurePolicy, ProgressEvent, Reconstruction, ReconstructionReport,
    ReconstructOptions, Reconstructor,
};
pub use error::{MvDoseError, Result, SourceOpenError, SourceOpenReason};
pub use grammar::{
    classify, classify_all, CumulativeDose, DoseCheck, LineEvent, MeasuredDose, SystemDelivery,
};
pub use isocenter::assign_isocenters;
pub use mvdose_index::BeamRow;
pub use qa::{
    assess_beams, summarize_day, summarize_plan, BeamAssessment, CumulativeStatus, DailySummary,
    QaThresholds, DEFAULT_MIN_PLANNED_MU, DEFAULT_PERCENT_LIMIT,
};
pub use query::{parse_date, PlanIndex, DATE_FORMAT};
pub use record::{relative_difference, BeamRecord};
pub use source::{Source, SourceKind, SourceReader};
