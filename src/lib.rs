pub mod age;
pub mod chart;
pub mod config;
mod load;
pub mod metrics;
pub mod narrative;
mod range;
pub mod report;
mod util;

pub use anyhow::{Context, Error};
use chrono::{Datelike, NaiveDate};
use noisy_float::prelude::*;
use qu::ick_use::*;
use serde::{Serialize, Serializer};
use std::{
    collections::BTreeMap,
    fmt,
    io::{Read, Seek},
    ops::Deref,
    path::Path,
    sync::Arc,
};

pub use crate::{
    age::AgeGroup,
    config::ReportConfig,
    load::LoadSummary,
    metrics::Metrics,
    range::{Range, RangeSet, RangeSetCountsWithMissing},
    util::{header, HtmlTable},
};

pub type ArcStr = Arc<str>;
pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
pub type PatientId = ArcStr;

/// A visit record as it appears in the spreadsheet, after type conversion but before any derived
/// columns are added.
#[derive(Debug, Clone)]
pub struct VisitRaw {
    pub patient_id: PatientId,
    pub service_date: NaiveDate,
    pub age: Option<R64>,
    pub sex: Sex,
    pub service_name: ArcStr,
}

/// A row in the visits dataset, with derived year, month and age group.
///
/// A row has no identity beyond its contents. A "visit" in the sense of the report is a unique
/// (patient, service date) pair, which may span several rows (one per service).
#[derive(Debug, Clone)]
pub struct Visit {
    pub patient_id: PatientId,
    pub service_date: NaiveDate,
    pub age: Option<R64>,
    pub sex: Sex,
    pub service_name: ArcStr,
    pub year: i32,
    pub month: YearMonth,
    /// `None` when the age is missing or outside the bucketed range.
    pub age_group: Option<AgeGroup>,
}

impl From<VisitRaw> for Visit {
    fn from(from: VisitRaw) -> Self {
        Self {
            year: from.service_date.year(),
            month: YearMonth::from(from.service_date),
            age_group: AgeGroup::of_opt(from.age),
            patient_id: from.patient_id,
            service_date: from.service_date,
            age: from.age,
            sex: from.sex,
            service_name: from.service_name,
        }
    }
}

/// The parsed list of visits, with a pre-built index for the patient ID.
#[derive(Clone)]
pub struct Visits {
    els: Arc<Vec<Visit>>,
    patient_idx: BTreeMap<PatientId, Vec<usize>>,
    summary: LoadSummary,
}

impl Visits {
    /// Load visits from a `.xlsx` workbook or a `.csv` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (raw, summary) = load::load_path(path)?;
        event!(
            Level::INFO,
            "loaded {} rows from \"{}\" ({} duplicates removed)",
            summary.rows_kept(),
            path.display(),
            summary.duplicates_dropped
        );
        Ok(Self::from_raw(raw, summary))
    }

    /// Load visits from the first worksheet of an `.xlsx` workbook held in memory or streamed in.
    pub fn from_xlsx_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let (raw, summary) = load::load_xlsx_reader(reader)?;
        event!(
            Level::INFO,
            "loaded {} rows from workbook ({} duplicates removed)",
            summary.rows_kept(),
            summary.duplicates_dropped
        );
        Ok(Self::from_raw(raw, summary))
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let (raw, summary) = load::load_csv_reader(reader)?;
        event!(
            Level::INFO,
            "loaded {} rows from CSV ({} duplicates removed)",
            summary.rows_kept(),
            summary.duplicates_dropped
        );
        Ok(Self::from_raw(raw, summary))
    }

    fn from_raw(raw: Vec<VisitRaw>, summary: LoadSummary) -> Self {
        let unbucketed = raw
            .iter()
            .filter(|visit| AgeGroup::of_opt(visit.age).is_none())
            .count();
        if unbucketed > 0 {
            event!(
                Level::WARN,
                "{} rows have a missing age or one outside 0-100; they are counted as unknown",
                unbucketed
            );
        }
        let mut this = Self::new(raw.into_iter().map(Visit::from).collect());
        this.summary = summary;
        this
    }

    pub fn load_summary(&self) -> &LoadSummary {
        &self.summary
    }

    /// The distinct patient IDs, in sorted order.
    pub fn patient_ids(&self) -> impl Iterator<Item = &PatientId> + '_ {
        self.patient_idx.keys()
    }

    /// The calendar years present in the data, ascending.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.els.iter().map(|v| v.year).collect();
        years.sort_unstable();
        years.dedup();
        years
    }

    fn new(els: Vec<Visit>) -> Self {
        let mut this = Visits {
            els: Arc::new(els),
            patient_idx: BTreeMap::new(),
            summary: LoadSummary::default(),
        };
        this.rebuild_patient_idx();
        this
    }

    fn rebuild_patient_idx(&mut self) {
        self.patient_idx.clear();
        for (idx, visit) in self.els.iter().enumerate() {
            self.patient_idx
                .entry(visit.patient_id.clone())
                .or_insert_with(Vec::new)
                .push(idx);
        }
    }
}

impl Deref for Visits {
    type Target = [Visit];
    fn deref(&self) -> &Self::Target {
        &*self.els
    }
}

impl<'a> IntoIterator for &'a Visits {
    type IntoIter = <&'a [Visit] as IntoIterator>::IntoIter;
    type Item = &'a Visit;
    fn into_iter(self) -> Self::IntoIter {
        self.els.iter()
    }
}

impl FromIterator<VisitRaw> for Visits {
    fn from_iter<T>(iter: T) -> Self
    where
        T: IntoIterator<Item = VisitRaw>,
    {
        let raw: Vec<VisitRaw> = iter.into_iter().collect();
        let summary = LoadSummary {
            rows_read: raw.len(),
            duplicates_dropped: 0,
        };
        Self::from_raw(raw, summary)
    }
}

// Sub-types

/// Sex is encoded 1 (male) or 2 (female). Other codes are kept as-is so they still show up in
/// the counts; an empty cell is `Missing`.
///
/// Ordering follows the code.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Sex {
    Missing,
    Male,
    Female,
    Other(i64),
}

impl Sex {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Sex::Male,
            2 => Sex::Female,
            other => Sex::Other(other),
        }
    }

    pub fn code(self) -> Option<i64> {
        match self {
            Sex::Missing => None,
            Sex::Male => Some(1),
            Sex::Female => Some(2),
            Sex::Other(code) => Some(code),
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Sex::Missing => f.write_str("Missing"),
            Sex::Male => f.write_str("Men"),
            Sex::Female => f.write_str("Women"),
            Sex::Other(code) => write!(f, "Code {}", code),
        }
    }
}

impl Serialize for Sex {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// A calendar month, ordered chronologically and displayed as `YYYY-MM`.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl From<NaiveDate> for YearMonth {
    fn from(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}
