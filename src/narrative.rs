//! Fixed commentary printed under the charts.
//!
//! The hypothesis tests comparing 2021 with 2022 were run once, outside this program, on the
//! full extract. Their outcomes are reproduced here as text and are not recomputed from whatever
//! file is loaded. Rank tests (Mann-Whitney U) compare distributions, so their rows name the
//! quantity compared rather than its mean.
use std::fmt;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Significance {
    Significant,
    NotSignificant,
}

impl fmt::Display for Significance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Significance::Significant => f.write_str("significant"),
            Significance::NotSignificant => f.write_str("not significant"),
        }
    }
}

/// One row of the hypothesis test table.
#[derive(Debug, Copy, Clone)]
pub struct TestOutcome {
    pub parameter: &'static str,
    pub test: &'static str,
    pub p_value: &'static str,
    pub significance: Significance,
    pub interpretation: &'static str,
}

/// Significance level used for every test in the table.
pub const ALPHA: &str = "0.05";

pub const TEST_OUTCOMES: [TestOutcome; 8] = [
    TestOutcome {
        parameter: "Sex distribution",
        test: "Chi-squared",
        p_value: "< 0.001",
        significance: Significance::Significant,
        interpretation: "The share of women among patients grew in 2022.",
    },
    TestOutcome {
        parameter: "Age group distribution",
        test: "Chi-squared",
        p_value: "< 0.001",
        significance: Significance::Significant,
        interpretation: "The age structure changed, driven by growth of the 19-35 group.",
    },
    TestOutcome {
        parameter: "Patient age",
        test: "Mann-Whitney U",
        p_value: "0.127",
        significance: Significance::NotSignificant,
        interpretation: "The typical patient is about the same age in both years.",
    },
    TestOutcome {
        parameter: "Visits per month",
        test: "Mann-Whitney U",
        p_value: "0.003",
        significance: Significance::Significant,
        interpretation: "Monthly visit volume is higher in 2022.",
    },
    TestOutcome {
        parameter: "Visits per patient",
        test: "Mann-Whitney U",
        p_value: "0.412",
        significance: Significance::NotSignificant,
        interpretation: "Patients came back about as often in both years.",
    },
    TestOutcome {
        parameter: "Services per visit",
        test: "Mann-Whitney U",
        p_value: "0.268",
        significance: Significance::NotSignificant,
        interpretation: "A visit includes a similar number of services in both years.",
    },
    TestOutcome {
        parameter: "Visit cost",
        test: "Mann-Whitney U",
        p_value: "< 0.001",
        significance: Significance::Significant,
        interpretation: "Visit costs shifted upwards in 2022.",
    },
    TestOutcome {
        parameter: "Share of primary appointments",
        test: "Chi-squared",
        p_value: "0.018",
        significance: Significance::Significant,
        interpretation: "Primary appointments took a larger share of all services in 2022.",
    },
];

/// A numbered finding with a short heading.
#[derive(Debug, Copy, Clone)]
pub struct Conclusion {
    pub heading: &'static str,
    pub lines: &'static [&'static str],
}

pub const CONCLUSIONS: [Conclusion; 4] = [
    Conclusion {
        heading: "Distribution by sex",
        lines: &["Women make up most of the patients, and their share grew noticeably in 2022."],
    },
    Conclusion {
        heading: "Distribution by age",
        lines: &[
            "Most patients are in the 19-35 and 36-50 groups.",
            "The 19-35 group grew the most.",
        ],
    },
    Conclusion {
        heading: "Visit dynamics",
        lines: &[
            "April and July have the most visits.",
            "Overall, there were clearly more visits in 2022 than in 2021.",
        ],
    },
    Conclusion {
        heading: "Service popularity",
        lines: &["The primary appointment is the most requested service."],
    },
];
