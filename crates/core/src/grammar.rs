use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::{Captures, Regex, RegexSet};

const TIMESTAMP: &str =
    r"(?P<month>\d{2}).(?P<day>\d{2}).(?P<year>\d{4})\s(?P<time>\d{2}:\d{2}:\d{2}\.\d{3})";

const MEASURED: &str = r".*TUIController.OnMVImagerDoseMeasured.*intensity:\s*(?P<intensity>\d*\.?\d*)\s*estDose:\s*(?P<est>\d*\.?\d*).*fieldSizeMm:\s*(?P<field>\d*\.?\d*).*id:\s*(?P<node>-?\d*).*isValid:\s*(?P<valid>\w*)";
const DOSE_CHECKER: &str = r".*MVImageDoseChecker:\s*node:\s*(?P<node>\d*).*beamDoseLIN:\s*(?P<lin>\d*\.?\d*).*beamDoseIMG:\s*(?P<img>\d*\.?\d*).*beamPercErr:\s*(?P<err>-?\d*\.?\d*).*FlaggedErroneous:\s*(?P<flagged>\w*)";
const CUMULATIVE: &str = r".*MVImageDoseChecker:\s*Cumulative\s*\(LIN IMG DIFF PCENT\)\s*(?P<lin>\d*\.?\d*)\s*(?P<img>\d*\.?\d*)\s*(?P<diff>-?\d*\.?\d*)\s*(?P<pcent>-?\d*\.?\d*)";
const SYSTEM_DATA: &str = r".*SystemDeliveryData\s*TreatmentType:>\s*(?P<kind>\w*),\s*isTreatment:>\s*(?P<treatment>\w*),\s*MV:>\s*(?P<mu>\d*\.?\d*)\s*MU,\s*Collimator:>\s*(?P<colli>\d*\.?\d*)\s*mm,\s*Axial:>\s*(?P<axial>\d*\.?\d*),\s*Oblique:>\s*(?P<oblique>\d*\.?\d*),\s*PlanName:>\s*(?P<plan>.*)";

static PATTERNS: Lazy<[String; 4]> = Lazy::new(|| {
    [MEASURED, DOSE_CHECKER, CUMULATIVE, SYSTEM_DATA].map(|body| format!("{TIMESTAMP}{body}"))
});

static GRAMMAR_SET: Lazy<RegexSet> =
    Lazy::new(|| RegexSet::new(PATTERNS.iter()).expect("valid regex set"));

static GRAMMARS: Lazy<Vec<Regex>> = Lazy::new(|| {
    PATTERNS
        .iter()
        .map(|pattern| Regex::new(pattern).expect("valid regex"))
        .collect()
});

/// `OnMVImagerDoseMeasured`: opens a beam block.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasuredDose {
    pub timestamp: NaiveDateTime,
    pub intensity: f64,
    pub field_size_mm: f64,
    pub node: i32,
    pub is_valid: bool,
}

/// Per-beam verdict of the dose checker.
#[derive(Debug, Clone, PartialEq)]
pub struct DoseCheck {
    /// The checker's node capture is unsigned, so negative ids leave it empty.
    pub node: Option<i32>,
    pub delivered_mu: f64,
    pub imager_mu: f64,
    pub is_flagged: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CumulativeDose {
    pub delivered_mu: f64,
    pub imager_mu: f64,
}

/// `SystemDeliveryData`: the terminal line of a beam block.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemDelivery {
    pub treatment_type: String,
    pub is_treatment: bool,
    pub planned_mu: f64,
    pub collimator_size: f64,
    pub axial: f64,
    pub oblique: f64,
    pub plan_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    Measured(MeasuredDose),
    DoseChecker(DoseCheck),
    Cumulative(CumulativeDose),
    SystemData(SystemDelivery),
    None,
}

impl LineEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LineEvent::SystemData(_))
    }
}

/// Classifies a line against the first grammar it satisfies.
pub fn classify(line: &str) -> LineEvent {
    classify_all(line)
        .into_iter()
        .next()
        .unwrap_or(LineEvent::None)
}

/// Every grammar the line satisfies, in the order measured, dose checker,
/// cumulative, system data. A line whose fields fail to parse counts as
/// unmatched for that grammar.
pub fn classify_all(line: &str) -> Vec<LineEvent> {
    let matched = GRAMMAR_SET.matches(line);
    if !matched.matched_any() {
        return Vec::new();
    }
    matched
        .into_iter()
        .filter_map(|idx| {
            let caps = GRAMMARS[idx].captures(line)?;
            match idx {
                0 => parse_measured(&caps).map(LineEvent::Measured),
                1 => parse_dose_check(&caps).map(LineEvent::DoseChecker),
                2 => parse_cumulative(&caps).map(LineEvent::Cumulative),
                _ => parse_system_data(&caps).map(LineEvent::SystemData),
            }
        })
        .collect()
}

fn parse_measured(caps: &Captures<'_>) -> Option<MeasuredDose> {
    Some(MeasuredDose {
        timestamp: parse_timestamp(caps)?,
        intensity: number(caps, "intensity")?,
        field_size_mm: number(caps, "field")?,
        node: caps.name("node")?.as_str().parse().ok()?,
        is_valid: flag(caps, "valid", "TRUE"),
    })
}

fn parse_dose_check(caps: &Captures<'_>) -> Option<DoseCheck> {
    Some(DoseCheck {
        node: caps.name("node").and_then(|m| m.as_str().parse().ok()),
        delivered_mu: number(caps, "lin")?,
        imager_mu: number(caps, "img")?,
        is_flagged: flag(caps, "flagged", "YES"),
    })
}

fn parse_cumulative(caps: &Captures<'_>) -> Option<CumulativeDose> {
    Some(CumulativeDose {
        delivered_mu: number(caps, "lin")?,
        imager_mu: number(caps, "img")?,
    })
}

fn parse_system_data(caps: &Captures<'_>) -> Option<SystemDelivery> {
    Some(SystemDelivery {
        treatment_type: caps.name("kind")?.as_str().to_string(),
        is_treatment: flag(caps, "treatment", "TRUE"),
        planned_mu: number(caps, "mu")?,
        collimator_size: number(caps, "colli")?,
        axial: number(caps, "axial")?,
        oblique: number(caps, "oblique")?,
        plan_name: caps.name("plan")?.as_str().to_string(),
    })
}

/// `MM.DD.YYYY HH:mm:ss.fff`
fn parse_timestamp(caps: &Captures<'_>) -> Option<NaiveDateTime> {
    let year = caps.name("year")?.as_str().parse().ok()?;
    let month = caps.name("month")?.as_str().parse().ok()?;
    let day = caps.name("day")?.as_str().parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::parse_from_str(caps.name("time")?.as_str(), "%H:%M:%S%.3f").ok()?;
    Some(date.and_time(time))
}

// Rust float parsing is locale independent: '.' is always the decimal point.
fn number(caps: &Captures<'_>, name: &str) -> Option<f64> {
    caps.name(name)?.as_str().parse().ok()
}

fn flag(caps: &Captures<'_>, name: &str, truthy: &str) -> bool {
    caps.name(name)
        .is_some_and(|m| m.as_str().eq_ignore_ascii_case(truthy))
}
