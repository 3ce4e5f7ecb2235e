//! Turning metrics into the finished report.
//!
//! The report exists in two forms. The HTML page holds the title, summary lines, four charts and
//! the narrative block. The terminal form holds the same numbers as text tables.
use crate::{
    chart::{BarChart, Orientation, Series},
    metrics::{ByYear, Metrics},
    narrative::{CONCLUSIONS, TEST_OUTCOMES},
    narrative::TestOutcome,
    util::{header, path_exists, HtmlTable},
    LoadSummary, ReportConfig,
};
use itertools::Itertools;
use qu::ick_use::*;
use serde::Serialize;
use std::{fmt::Write as _, fs, io, path::Path};
use term_data_table::{Cell, Row, Table};

/// Everything needed to render the report once.
pub struct Report<'a> {
    pub config: &'a ReportConfig,
    pub metrics: &'a Metrics,
    pub load_summary: &'a LoadSummary,
}

/// What ends up in the JSON summary file.
#[derive(Serialize)]
struct JsonSummary<'a> {
    load: &'a LoadSummary,
    metrics: &'a Metrics,
}

impl<'a> Report<'a> {
    pub fn new(config: &'a ReportConfig, metrics: &'a Metrics, load_summary: &'a LoadSummary) -> Self {
        Self {
            config,
            metrics,
            load_summary,
        }
    }

    fn years_label(&self) -> String {
        self.metrics.years.iter().join(" vs ")
    }

    /// Grouped bar chart of rows by sex, one bar per year.
    pub fn sex_chart(&self) -> BarChart {
        let chart = BarChart::new(
            format!("Patients by sex ({})", self.years_label()),
            Orientation::Vertical,
        )
        .with_labels("Sex", "Number of patients");
        self.grouped_by_year(chart, &self.metrics.sex_by_year, &self.config.year_palette)
    }

    /// Grouped bar chart of rows by age group, one bar per year.
    pub fn age_chart(&self) -> BarChart {
        let chart = BarChart::new(
            format!("Patients by age group ({})", self.years_label()),
            Orientation::Vertical,
        )
        .with_labels("Age group", "Number of patients")
        .with_rotated_labels();
        self.grouped_by_year(chart, &self.metrics.age_by_year, &self.config.age_palette)
    }

    /// Rows per month, in calendar order.
    pub fn monthly_chart(&self) -> BarChart {
        let months = &self.metrics.monthly_distribution;
        BarChart::new("Visits by month", Orientation::Vertical)
            .with_labels("Month", "Number of visits")
            .with_categories(months.keys())
            .with_series(Series::new(
                "",
                self.config.monthly_color.clone(),
                months.values().copied().collect(),
            ))
            .with_rotated_labels()
            .with_size(self.config.chart_width, self.config.chart_height)
            .with_opacity(self.config.bar_opacity)
    }

    /// The most requested services, most frequent at the top.
    pub fn top_services_chart(&self) -> BarChart {
        let top = &self.metrics.top_services;
        BarChart::new(
            format!("Top {} most requested services", top.len()),
            Orientation::Horizontal,
        )
        .with_labels("Services provided", "")
        .with_categories(top.iter().map(|s| &s.name))
        .with_series(Series {
            name: String::new(),
            colors: self.config.services_palette.clone(),
            values: top.iter().map(|s| s.count).collect(),
        })
        .with_size(self.config.chart_width, self.config.chart_height)
        .with_opacity(self.config.bar_opacity)
    }

    fn grouped_by_year<K>(&self, chart: BarChart, table: &ByYear<K>, palette: &[String]) -> BarChart
    where
        K: Ord + Copy + std::fmt::Display,
    {
        let mut chart = chart
            .with_legend("Year")
            .with_categories(table.categories.iter())
            .with_size(self.config.chart_width, self.config.chart_height)
            .with_opacity(self.config.bar_opacity);
        for (idx, &year) in table.years.iter().enumerate() {
            let color = palette
                .get(idx % palette.len().max(1))
                .cloned()
                .unwrap_or_else(|| "#808080".into());
            let values = table
                .categories
                .iter()
                .map(|&category| table.get(year, category))
                .collect();
            chart = chart.with_series(Series::new(year.to_string(), color, values));
        }
        chart
    }

    /// Render the whole page as a standalone HTML document.
    pub fn to_html(&self) -> Result<String> {
        let mut out = String::from("<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\"><title>");
        html_escape::encode_text_to_string(&self.config.title, &mut out);
        out.push_str("</title>");
        out.push_str(STYLE);
        out.push_str("</head><body>");

        out.push_str("<header");
        if let Some(image) = &self.config.header_image {
            out.push_str(" style=\"background-image:url('");
            html_escape::encode_double_quoted_attribute_to_string(
                html_escape::encode_single_quoted_attribute(image),
                &mut out,
            );
            out.push_str("')\"");
        }
        out.push_str("><h1>");
        html_escape::encode_text_to_string(&self.config.title, &mut out);
        out.push_str("</h1></header><main>");

        out.push_str("<p>");
        html_escape::encode_text_to_string(&self.config.intro, &mut out);
        out.push_str("</p>");

        out.push_str("<section class=\"summary\">");
        for line in self.summary_lines() {
            out.push_str("<p>");
            html_escape::encode_text_to_string(&line, &mut out);
            out.push_str("</p>");
        }
        out.push_str("</section>");

        for chart in [
            self.sex_chart(),
            self.age_chart(),
            self.monthly_chart(),
            self.top_services_chart(),
        ] {
            out.push_str("<figure>");
            out.push_str(
                &chart
                    .to_svg()
                    .with_context(|| format!("drawing \"{}\"", chart.title))?,
            );
            out.push_str("</figure>");
        }

        out.push_str("<h2>Hypothesis tests</h2>");
        let _ = write!(
            out,
            "<p>Comparison of the two years at a significance level of {}.</p>",
            crate::narrative::ALPHA
        );
        HtmlTable::new(TEST_OUTCOMES, |t: &TestOutcome, _| {
            (t.parameter, t.test, t.p_value, t.significance, t.interpretation)
        })
        .with_headers([
            "Parameter",
            "Test",
            "p-value",
            "Result",
            "Interpretation",
        ])
        .write_html(&mut out);

        out.push_str("<h2>Key findings</h2><ol>");
        for conclusion in CONCLUSIONS {
            out.push_str("<li><strong>");
            html_escape::encode_text_to_string(conclusion.heading, &mut out);
            out.push_str(":</strong>");
            for line in conclusion.lines {
                out.push_str("<br>");
                html_escape::encode_text_to_string(line, &mut out);
            }
            out.push_str("</li>");
        }
        out.push_str("</ol></main></body></html>\n");
        Ok(out)
    }

    /// The three headline numbers.
    pub fn summary_lines(&self) -> [String; 3] {
        [
            format!("Unique patients: {}", self.metrics.unique_patients),
            format!("Unique services: {}", self.metrics.unique_services),
            format!("Unique visits: {}", self.metrics.unique_visits),
        ]
    }

    /// Print the report as text tables.
    pub fn print_terminal(&self) {
        header(&self.config.title);
        println!(
            "{} rows loaded, {} duplicate rows removed",
            self.load_summary.rows_read, self.load_summary.duplicates_dropped
        );
        for line in self.summary_lines() {
            println!("{}", line);
        }
        print_demographics(self.metrics);

        header("Top services");
        let mut table = count_table("Service");
        for service in &self.metrics.top_services {
            add_count_row(&mut table, &service.name, service.count, self.metrics.total_rows);
        }
        println!("{}", table);

        header("Hypothesis tests");
        let mut table = Table::new().with_row(
            Row::new()
                .with_cell(Cell::from("Parameter"))
                .with_cell(Cell::from("p-value"))
                .with_cell(Cell::from("Result"))
                .with_cell(Cell::from("Interpretation")),
        );
        for t in TEST_OUTCOMES.iter() {
            table.add_row(
                Row::new()
                    .with_cell(Cell::from(t.parameter))
                    .with_cell(Cell::from(t.p_value))
                    .with_cell(Cell::from(t.significance.to_string()))
                    .with_cell(Cell::from(t.interpretation)),
            );
        }
        println!("{}", table);

        header("Key findings");
        for (idx, conclusion) in CONCLUSIONS.iter().enumerate() {
            println!("{}. {}:", idx + 1, conclusion.heading);
            for line in conclusion.lines {
                println!("   {}", line);
            }
        }
    }

    pub fn write_html(&self, path: impl AsRef<Path>) -> Result {
        let path = path.as_ref();
        write_file(path, self.to_html()?.as_bytes())
            .with_context(|| format!("unable to write report to \"{}\"", path.display()))?;
        event!(Level::INFO, "wrote report to \"{}\"", path.display());
        Ok(())
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result {
        let path = path.as_ref();
        let json = serde_json::to_vec_pretty(&JsonSummary {
            load: self.load_summary,
            metrics: self.metrics,
        })?;
        write_file(path, &json)
            .with_context(|| format!("unable to write summary to \"{}\"", path.display()))?;
        event!(Level::INFO, "wrote summary to \"{}\"", path.display());
        Ok(())
    }
}

/// Print the sex, age group and month tables.
pub fn print_demographics(metrics: &Metrics) {
    let total = metrics.total_rows;

    header("Sexes");
    let mut table = count_table("Sex");
    for (sex, count) in &metrics.sex_distribution {
        add_count_row(&mut table, sex, *count, total);
    }
    println!("{}", table);
    print_by_year("Sex by year", "Sex", &metrics.sex_by_year);

    header("Ages");
    let mut table = count_table("Age group");
    for c in &metrics.age_distribution {
        add_count_row(&mut table, c.age_group, c.count, total);
    }
    add_count_row(
        &mut table,
        crate::age::UNKNOWN_AGE_LABEL,
        metrics.unknown_age,
        total,
    );
    println!("{}", table);
    print_by_year("Age group by year", "Age group", &metrics.age_by_year);

    header("Months");
    let mut table = count_table("Month");
    for (month, count) in &metrics.monthly_distribution {
        add_count_row(&mut table, month, *count, total);
    }
    println!("{}", table);
}

fn print_by_year<K>(title: &str, label: &'static str, table: &ByYear<K>)
where
    K: Ord + Copy + std::fmt::Display,
{
    header(title);
    let head = table
        .years
        .iter()
        .fold(Row::new().with_cell(Cell::from(label)), |row, year| {
            row.with_cell(Cell::from(year.to_string()))
        });
    let mut out = Table::new().with_row(head);
    for &category in &table.categories {
        let row = table.years.iter().fold(
            Row::new().with_cell(Cell::from(category.to_string())),
            |row, &year| row.with_cell(Cell::from(table.get(year, category).to_string())),
        );
        out.add_row(row);
    }
    println!("{}", out);
}

fn count_table(label: &'static str) -> Table {
    Table::new().with_row(
        Row::new()
            .with_cell(Cell::from(label))
            .with_cell(Cell::from("Count"))
            .with_cell(Cell::from("Percentage")),
    )
}

fn add_count_row(table: &mut Table, label: impl std::fmt::Display, count: usize, total: usize) {
    table.add_row(
        Row::new()
            .with_cell(Cell::from(label.to_string()))
            .with_cell(Cell::from(count.to_string()))
            .with_cell(Cell::from(format!("{:.1}%", percent(count, total)))),
    );
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.
    } else {
        count as f64 / total as f64 * 100.
    }
}

fn write_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if path_exists(path)? {
        event!(
            Level::WARN,
            "overwriting existing file at \"{}\"",
            path.display()
        );
    }
    fs::write(path, contents)
}

const STYLE: &str = r#"<style>
body { font-family: sans-serif; margin: 0; color: #222; }
header { background-color: #2f4f6f; background-size: cover; background-position: center; color: white; padding: 2rem; text-align: center; min-height: 120px; }
header h1 { font-size: 24px; margin: 0; }
main { max-width: 960px; margin: 0 auto; padding: 1rem 2rem 3rem; }
figure { margin: 1.5rem 0; }
table { border-collapse: collapse; margin: 1rem 0; }
th, td { border: 1px solid #bbb; padding: 4px 8px; text-align: left; vertical-align: top; }
</style>"#;

/// Check that counts add up before rendering.
pub fn check_consistency(metrics: &Metrics) -> Result {
    let bucketed: usize = metrics.age_distribution.iter().map(|c| c.count).sum();
    ensure!(
        bucketed + metrics.unknown_age == metrics.total_rows,
        "age group counts ({} + {} unknown) do not add up to {} rows",
        bucketed,
        metrics.unknown_age,
        metrics.total_rows
    );
    let by_sex: usize = metrics.sex_distribution.values().sum();
    ensure!(
        by_sex == metrics.total_rows,
        "sex counts ({}) do not add up to {} rows",
        by_sex,
        metrics.total_rows
    );
    if metrics.years.len() != 2 {
        event!(
            Level::WARN,
            "expected two years of data, found {:?}",
            metrics.years
        );
    }
    Ok(())
}
