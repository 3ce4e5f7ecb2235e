//! Reading visit records from a workbook or CSV file.
//!
//! Both sources are first read into a [`Sheet`] of loosely typed cells. The service date column is
//! parsed in place, so the same day written two ways compares equal. Exact-duplicate rows are then
//! removed across every column in the file, not just the ones the report uses, and only then are
//! the required columns converted into [`VisitRaw`] records.
use crate::{Sex, VisitRaw};
use calamine::{DataType, Reader, Xlsx};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use noisy_float::prelude::*;
use qu::ick_use::*;
use serde::Serialize;
use std::{
    borrow::Cow,
    collections::HashSet,
    io::{Read, Seek},
    path::Path,
};

pub const COL_INSURED: &str = "insured";
pub const COL_SERVICE_DATE: &str = "service_date";
pub const COL_AGE: &str = "age_for_service_date";
pub const COL_SEX: &str = "sex_id";
pub const COL_SERVICE_NAME: &str = "service_name";

/// What happened while loading.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadSummary {
    /// Data rows in the file, excluding the header.
    pub rows_read: usize,
    pub duplicates_dropped: usize,
}

impl LoadSummary {
    pub fn rows_kept(&self) -> usize {
        self.rows_read - self.duplicates_dropped
    }
}

/// A single spreadsheet cell, independent of where it came from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cell {
    Empty,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    /// A workbook date: days since 1899-12-30, fraction is the time of day.
    DateTime(f64),
}

impl Cell {
    /// A canonical text form, used to compare rows for duplicates.
    ///
    /// Whole floats compare equal to the matching integer.
    fn key(&self) -> Cow<'_, str> {
        match self {
            Cell::Empty => Cow::Borrowed(""),
            Cell::Int(v) => Cow::Owned(v.to_string()),
            Cell::Float(v) if v.fract() == 0. && v.abs() < i64::MAX as f64 => {
                Cow::Owned((*v as i64).to_string())
            }
            Cell::Float(v) => Cow::Owned(v.to_string()),
            Cell::Text(s) => Cow::Borrowed(s.as_str()),
            Cell::Bool(b) => Cow::Owned(b.to_string()),
            Cell::DateTime(v) => Cow::Owned(format!("date:{}", v)),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&DataType> for Cell {
    fn from(from: &DataType) -> Self {
        match from {
            DataType::Empty => Cell::Empty,
            DataType::Int(v) => Cell::Int(*v),
            DataType::Float(v) => Cell::Float(*v),
            DataType::String(s) => Cell::Text(s.clone()),
            DataType::Bool(b) => Cell::Bool(*b),
            DataType::DateTime(v) => Cell::DateTime(*v),
            other => Cell::Text(other.to_string()),
        }
    }
}

/// A header row and the data rows under it.
#[derive(Debug, Clone)]
pub(crate) struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    fn from_range(range: &calamine::Range<DataType>) -> Result<Self> {
        let mut rows = range.rows();
        let headers = rows
            .next()
            .context("no data in workbook")?
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();
        let rows = rows
            .map(|row| row.iter().map(Cell::from).collect())
            .collect();
        Ok(Sheet { headers, rows })
    }

    fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let headers = rdr
            .headers()
            .context("reading CSV header")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let rows = rdr
            .records()
            .map(|record| -> Result<Vec<Cell>> {
                Ok(record?
                    .iter()
                    .map(|field| {
                        if field.is_empty() {
                            Cell::Empty
                        } else {
                            Cell::Text(field.to_string())
                        }
                    })
                    .collect())
            })
            .collect::<Result<Vec<_>>>()
            .context("reading CSV records")?;
        Ok(Sheet { headers, rows })
    }

    /// Remove rows that are identical across every column, keeping the first.
    ///
    /// Returns the number of rows removed.
    fn drop_duplicates(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen = HashSet::with_capacity(before);
        self.rows.retain(|row| {
            // flexible CSV rows may be short: trailing missing cells count as empty.
            let mut key: Vec<String> = row.iter().map(|cell| cell.key().into_owned()).collect();
            while matches!(key.last(), Some(last) if last.is_empty()) {
                key.pop();
            }
            seen.insert(key)
        });
        before - self.rows.len()
    }

    /// Replace every service date cell with the parsed date, written `YYYY-MM-DD`.
    fn normalise_dates(&mut self) -> Result {
        let col = self.column(COL_SERVICE_DATE)?;
        for (idx, row) in self.rows.iter_mut().enumerate() {
            let parsed = match row.get(col) {
                Some(cell) => parse_date(cell),
                None => parse_date(&Cell::Empty),
            }
            .with_context(|| format!("column `{}`", COL_SERVICE_DATE))
            .with_context(|| format!("in row {}", idx + 2))?;
            row[col] = Cell::Text(parsed.format("%Y-%m-%d").to_string());
        }
        Ok(())
    }

    fn column(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("required column `{}` is missing", name))
    }

    /// Convert the required columns into typed records.
    fn into_visits(self) -> Result<Vec<VisitRaw>> {
        let insured = self.column(COL_INSURED)?;
        let service_date = self.column(COL_SERVICE_DATE)?;
        let age = self.column(COL_AGE)?;
        let sex = self.column(COL_SEX)?;
        let service_name = self.column(COL_SERVICE_NAME)?;

        static EMPTY: Cell = Cell::Empty;
        self.rows
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let get = |col: usize| row.get(col).unwrap_or(&EMPTY);
                // +1 for the header, +1 because spreadsheets count from 1.
                let row_no = idx + 2;
                (|| -> Result<VisitRaw> {
                    Ok(VisitRaw {
                        patient_id: parse_text(get(insured))
                            .with_context(|| format!("column `{}`", COL_INSURED))?
                            .into(),
                        service_date: parse_date(get(service_date))
                            .with_context(|| format!("column `{}`", COL_SERVICE_DATE))?,
                        age: parse_age(get(age))
                            .with_context(|| format!("column `{}`", COL_AGE))?,
                        sex: parse_sex(get(sex)).with_context(|| format!("column `{}`", COL_SEX))?,
                        service_name: parse_text(get(service_name))
                            .with_context(|| format!("column `{}`", COL_SERVICE_NAME))?
                            .into(),
                    })
                })()
                .with_context(|| format!("in row {}", row_no))
            })
            .collect()
    }
}

/// Load a workbook or CSV file depending on the file extension.
pub(crate) fn load_path(path: &Path) -> Result<(Vec<VisitRaw>, LoadSummary)> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let sheet = match ext.as_deref() {
        Some("xlsx") => {
            let mut workbook: Xlsx<_> = calamine::open_workbook(path)
                .with_context(|| format!("unable to open workbook \"{}\"", path.display()))?;
            read_first_sheet(&mut workbook)
        }
        Some("csv") => std::fs::File::open(path)
            .map_err(Error::from)
            .and_then(|file| Sheet::from_csv(std::io::BufReader::new(file))),
        _ => bail!(
            "\"{}\": expected a file ending with `.xlsx` or `.csv`",
            path.display()
        ),
    }
    .with_context(|| format!("while loading \"{}\"", path.display()))?;
    finish(sheet).with_context(|| format!("while loading \"{}\"", path.display()))
}

pub(crate) fn load_xlsx_reader<R: Read + Seek>(reader: R) -> Result<(Vec<VisitRaw>, LoadSummary)> {
    let mut workbook = Xlsx::new(reader).context("not a valid .xlsx workbook")?;
    finish(read_first_sheet(&mut workbook)?)
}

pub(crate) fn load_csv_reader<R: Read>(reader: R) -> Result<(Vec<VisitRaw>, LoadSummary)> {
    finish(Sheet::from_csv(reader)?)
}

fn read_first_sheet<R: Read + Seek>(workbook: &mut Xlsx<R>) -> Result<Sheet> {
    let range = workbook
        .worksheet_range_at(0)
        .context("workbook has no worksheets")??;
    Sheet::from_range(&range)
}

fn finish(mut sheet: Sheet) -> Result<(Vec<VisitRaw>, LoadSummary)> {
    let rows_read = sheet.rows.len();
    sheet.normalise_dates()?;
    let duplicates_dropped = sheet.drop_duplicates();
    let visits = sheet.into_visits()?;
    Ok((
        visits,
        LoadSummary {
            rows_read,
            duplicates_dropped,
        },
    ))
}

// Cell conversions.

fn parse_text(cell: &Cell) -> Result<String> {
    let text = match cell {
        Cell::Text(s) => s.trim().to_string(),
        other => other.key().into_owned(),
    };
    ensure!(!text.is_empty(), "value is missing");
    Ok(text)
}

/// Serial of 9999-12-31, the last date a workbook can hold.
const LAST_SERIAL: f64 = 2_958_465.;

/// Days between the workbook epoch and the date. Serial 60 is the non-existent 1900-02-29,
/// which is why the epoch is 1899-12-30 rather than 1899-12-31.
fn excel_serial_to_date(serial: f64) -> Result<NaiveDate> {
    ensure!(
        serial.is_finite() && (1. ..LAST_SERIAL + 1.).contains(&serial),
        "`{}` is not a valid workbook date",
        serial
    );
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).context("invalid epoch")?;
    epoch
        .checked_add_signed(Duration::days(serial.floor() as i64))
        .with_context(|| format!("`{}` is out of range for a date", serial))
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y"];
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%d.%m.%Y %H:%M:%S",
];

pub(crate) fn parse_date(cell: &Cell) -> Result<NaiveDate> {
    match cell {
        Cell::DateTime(v) | Cell::Float(v) => excel_serial_to_date(*v),
        Cell::Int(v) => excel_serial_to_date(*v as f64),
        Cell::Text(s) => {
            let s = s.trim();
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .or_else(|| {
                    DATETIME_FORMATS
                        .iter()
                        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                        .map(|dt| dt.date())
                })
                .with_context(|| format!("could not parse `{}` as a date", s))
        }
        Cell::Empty => bail!("value is missing"),
        Cell::Bool(b) => bail!("`{}` is not a date", b),
    }
}

fn parse_age(cell: &Cell) -> Result<Option<R64>> {
    let value = match cell {
        Cell::Empty => return Ok(None),
        Cell::Int(v) => *v as f64,
        Cell::Float(v) => *v,
        Cell::Text(s) if s.trim().is_empty() => return Ok(None),
        Cell::Text(s) => s
            .trim()
            .parse::<f64>()
            .with_context(|| format!("`{}` is not a number", s.trim()))?,
        other => bail!("`{}` is not an age", other.key()),
    };
    // NaN is how some exports write a missing value.
    Ok(R64::try_new(value))
}

fn parse_sex(cell: &Cell) -> Result<Sex> {
    if cell.is_empty() {
        return Ok(Sex::Missing);
    }
    let code = match cell {
        Cell::Int(v) => *v,
        Cell::Float(v) if v.fract() == 0. => *v as i64,
        Cell::Text(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(v) => v,
                Err(_) => s
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.fract() == 0.)
                    .map(|v| v as i64)
                    .with_context(|| format!("`{}` is not a sex code", s))?,
            }
        }
        other => bail!("`{}` is not a sex code", other.key()),
    };
    let sex = Sex::from_code(code);
    if let Sex::Other(code) = sex {
        event!(Level::WARN, "unrecognised sex code {}", code);
    }
    Ok(sex)
}

#[cfg(test)]
mod test {
    use super::{finish, load_csv_reader, load_xlsx_reader, parse_date, Cell, Sheet};
    use crate::{Sex, Visits};
    use calamine::DataType;
    use chrono::NaiveDate;
    use std::io;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn workbook_range(rows: &[Vec<DataType>]) -> calamine::Range<DataType> {
        let width = rows.iter().map(Vec::len).max().unwrap() as u32;
        let mut range = calamine::Range::new((0, 0), (rows.len() as u32 - 1, width - 1));
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                range.set_value((r as u32, c as u32), cell.clone());
            }
        }
        range
    }

    fn header() -> Vec<DataType> {
        [
            "insured",
            "service_date",
            "age_for_service_date",
            "sex_id",
            "service_name",
            "cost",
        ]
        .iter()
        .map(|h| DataType::String(h.to_string()))
        .collect()
    }

    fn row(patient: i64, serial: f64, age: f64, sex: i64, service: &str, cost: f64) -> Vec<DataType> {
        vec![
            DataType::Int(patient),
            DataType::DateTime(serial),
            DataType::Float(age),
            DataType::Int(sex),
            DataType::String(service.into()),
            DataType::Float(cost),
        ]
    }

    #[test]
    fn workbook_cells() {
        // 44289 is 2021-04-03.
        let range = workbook_range(&[
            header(),
            row(101, 44289., 34., 2, "Primary appointment", 1500.),
            row(102, 44289.5, 61., 1, "Ultrasound", 2000.),
        ]);
        let mut sheet = Sheet::from_range(&range).unwrap();
        assert_eq!(sheet.drop_duplicates(), 0);
        let visits = sheet.into_visits().unwrap();
        assert_eq!(visits.len(), 2);
        assert_eq!(&*visits[0].patient_id, "101");
        assert_eq!(visits[0].service_date, date(2021, 4, 3));
        assert_eq!(visits[1].service_date, date(2021, 4, 3));
        assert_eq!(visits[1].sex, Sex::Male);
        assert_eq!(&*visits[1].service_name, "Ultrasound");
    }

    #[test]
    fn duplicates_use_every_column() {
        let range = workbook_range(&[
            header(),
            row(101, 44289., 34., 2, "Primary appointment", 1500.),
            row(101, 44289., 34., 2, "Primary appointment", 1500.),
            row(101, 44289., 34., 2, "Primary appointment", 1500.),
            // differs only in a column the report never reads
            row(101, 44289., 34., 2, "Primary appointment", 900.),
        ]);
        let mut sheet = Sheet::from_range(&range).unwrap();
        assert_eq!(sheet.drop_duplicates(), 2);
        assert_eq!(sheet.rows.len(), 2);
        // idempotent
        assert_eq!(sheet.drop_duplicates(), 0);
        assert_eq!(sheet.rows.len(), 2);
    }

    #[test]
    fn missing_column_is_an_error() {
        let range = workbook_range(&[
            vec![
                DataType::String("insured".into()),
                DataType::String("service_date".into()),
            ],
            vec![DataType::Int(1), DataType::DateTime(44289.)],
        ]);
        let sheet = Sheet::from_range(&range).unwrap();
        let err = sheet.into_visits().unwrap_err();
        assert!(format!("{:#}", err).contains("age_for_service_date"));
    }

    #[test]
    fn csv_three_identical_rows() {
        let input = "\
insured,service_date,age_for_service_date,sex_id,service_name
P1,2022-07-01,40,1,Primary appointment
P1,2022-07-01,40,1,Primary appointment
P1,2022-07-01,40,1,Primary appointment
";
        let (visits, summary) = load_csv_reader(io::Cursor::new(input)).unwrap();
        assert_eq!(summary.rows_read, 3);
        assert_eq!(summary.duplicates_dropped, 2);
        assert_eq!(summary.rows_kept(), 1);
        assert_eq!(visits.len(), 1);
    }

    #[test]
    fn csv_empty_age_and_sex() {
        let input = "\
service_name,insured,sex_id,service_date,age_for_service_date
Consultation, P7 ,,01.02.2022,
";
        let visits = Visits::from_csv_reader(io::Cursor::new(input)).unwrap();
        assert_eq!(&*visits[0].patient_id, "P7");
        assert_eq!(visits[0].sex, Sex::Missing);
        assert_eq!(visits[0].age, None);
        assert_eq!(visits[0].age_group, None);
        assert_eq!(visits[0].service_date, date(2022, 2, 1));
    }

    #[test]
    fn bad_date_names_the_row() {
        let input = "\
insured,service_date,age_for_service_date,sex_id,service_name
P1,2022-07-01,40,1,A
P2,not a date,40,1,A
";
        let err = load_csv_reader(io::Cursor::new(input)).unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("row 3"), "{}", msg);
        assert!(msg.contains("service_date"), "{}", msg);
    }

    #[test]
    fn date_formats() {
        let expected = date(2021, 12, 31);
        for text in [
            "2021-12-31",
            "31.12.2021",
            "31/12/2021",
            "2021-12-31 14:30:00",
            "2021-12-31T08:00:00",
        ] {
            assert_eq!(parse_date(&Cell::Text(text.into())).unwrap(), expected, "{}", text);
        }
        assert_eq!(parse_date(&Cell::DateTime(44561.75)).unwrap(), expected);
        assert!(parse_date(&Cell::Empty).is_err());
        assert!(parse_date(&Cell::DateTime(0.)).is_err());
        assert_eq!(parse_date(&Cell::Float(2_958_465.)).unwrap(), date(9999, 12, 31));
    }

    #[test]
    fn huge_serial_is_an_error() {
        assert!(parse_date(&Cell::Float(1e18)).is_err());
        assert!(parse_date(&Cell::Int(i64::MAX)).is_err());
        assert!(parse_date(&Cell::DateTime(2_958_466.)).is_err());

        let range = workbook_range(&[header(), row(101, 1e18, 34., 2, "ECG", 10.)]);
        let err = finish(Sheet::from_range(&range).unwrap()).unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("row 2"), "{}", msg);
        assert!(msg.contains("service_date"), "{}", msg);
    }

    #[test]
    fn same_day_written_differently_is_a_duplicate() {
        let input = "\
insured,service_date,age_for_service_date,sex_id,service_name
P1,2021-04-03,40,1,A
P1,03.04.2021,40,1,A
P1,2021-04-03 09:15:00,40,1,A
P1,2021-04-04,40,1,A
";
        let (visits, summary) = load_csv_reader(io::Cursor::new(input)).unwrap();
        assert_eq!(summary.rows_read, 4);
        assert_eq!(summary.duplicates_dropped, 2);
        assert_eq!(visits.len(), 2);
        assert_eq!(visits[0].service_date, date(2021, 4, 3));

        // a date cell and a text date for the same day
        let mut text_row = row(101, 44289., 34., 2, "ECG", 10.);
        text_row[1] = DataType::String("2021-04-03".into());
        let range = workbook_range(&[header(), row(101, 44289., 34., 2, "ECG", 10.), text_row]);
        let (visits, summary) = finish(Sheet::from_range(&range).unwrap()).unwrap();
        assert_eq!(summary.duplicates_dropped, 1);
        assert_eq!(visits.len(), 1);
    }

    #[test]
    fn invalid_workbook_bytes() {
        let err = load_xlsx_reader(io::Cursor::new(b"insured,service_date\n".to_vec())).unwrap_err();
        assert!(format!("{:#}", err).contains("not a valid .xlsx workbook"));
        let err = Visits::from_xlsx_reader(io::Cursor::new(Vec::new())).err().unwrap();
        assert!(format!("{:#}", err).contains("not a valid .xlsx workbook"));
    }

    #[test]
    fn unknown_extension() {
        let err = Visits::load("visits.txt").err().unwrap();
        assert!(format!("{:#}", err).contains(".xlsx"));
    }
}
