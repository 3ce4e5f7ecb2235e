use clap::Parser;
use clinic_visit_report::{header, report::print_demographics, Metrics, Visits};
use qu::ick_use::*;

#[derive(Parser)]
struct Opt {
    /// Visits workbook (`.xlsx`) or CSV export.
    #[clap(default_value = "data/visits.xlsx")]
    input: String,
}

#[qu::ick]
pub fn main(opt: Opt) -> Result {
    let visits = Visits::load(&opt.input)?;
    let metrics = Metrics::calculate(&visits);

    header("Data stats");
    let summary = visits.load_summary();
    println!("rows read: {}", summary.rows_read);
    println!("duplicate rows removed: {}", summary.duplicates_dropped);
    if let Some(date) = visits.iter().map(|v| v.service_date).min() {
        println!("earliest visit: {}", date);
    }
    if let Some(date) = visits.iter().map(|v| v.service_date).max() {
        println!("latest visit: {}", date);
    }
    println!("unique patients: {}", metrics.unique_patients);
    println!("unique visits: {}", metrics.unique_visits);

    print_demographics(&metrics);
    Ok(())
}
