use clap::Parser;
use clinic_visit_report::{
    report::{check_consistency, Report},
    Metrics, ReportConfig, Visits,
};
use qu::ick_use::*;
use std::{
    io::{self, Cursor, Read},
    path::PathBuf,
};

#[derive(Parser)]
struct Opt {
    /// Visits workbook (`.xlsx`) or CSV export. Use `-` to read a workbook from stdin.
    #[clap(default_value = "data/visits.xlsx")]
    input: String,
    /// Where to write the HTML report.
    #[clap(long, short, default_value = "report.html")]
    output: PathBuf,
    /// Also write the computed numbers as JSON.
    #[clap(long)]
    json: Option<PathBuf>,
    /// TOML file overriding the page text and chart styling.
    #[clap(long, short)]
    config: Option<PathBuf>,
    /// Don't print the tables to the terminal.
    #[clap(long, short)]
    quiet: bool,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let config = match &opt.config {
        Some(path) => ReportConfig::load(path)?,
        None => ReportConfig::default(),
    };

    let visits = if opt.input == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("unable to read workbook from stdin")?;
        Visits::from_xlsx_reader(Cursor::new(buf)).context("in workbook from stdin")?
    } else {
        Visits::load(&opt.input)?
    };
    if visits.is_empty() {
        event!(Level::WARN, "no visits in \"{}\"; the charts will be empty", opt.input);
    }

    let metrics = Metrics::calculate(&visits);
    check_consistency(&metrics)?;

    let report = Report::new(&config, &metrics, visits.load_summary());
    report.write_html(&opt.output)?;
    if let Some(path) = &opt.json {
        report.write_json(path)?;
    }
    if !opt.quiet {
        report.print_terminal();
    }
    Ok(())
}
