//! Summary counts over the visit table.
//!
//! Everything here is a plain count over rows. Nothing is weighted or normalised; percentages
//! are left to whoever displays the numbers.
use crate::{age::AGE_BUCKETS, AgeGroup, ArcStr, Sex, Visit, Visits, YearMonth};
use serde::Serialize;
use std::collections::{hash_map::Entry, BTreeMap, BTreeSet, HashMap};

/// How many services make it into the "top services" table.
pub const TOP_SERVICES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceCount {
    pub name: ArcStr,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeGroupCount {
    pub age_group: AgeGroup,
    pub count: usize,
}

/// One cell of a (year, category) table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearCount<K> {
    pub year: i32,
    pub category: K,
    pub count: usize,
}

/// Row counts grouped by year and some category, laid out for a grouped bar chart.
#[derive(Debug, Clone, Serialize)]
pub struct ByYear<K> {
    pub years: Vec<i32>,
    pub categories: Vec<K>,
    pub counts: Vec<YearCount<K>>,
}

impl<K> ByYear<K>
where
    K: Ord + Copy,
{
    /// Group rows by year and the category returned by `key`. Rows where `key` returns `None`
    /// are left out.
    ///
    /// `categories` fixes the category order; any category seen in the data that is not listed
    /// is appended in sorted order.
    pub fn count<'a>(
        visits: impl IntoIterator<Item = &'a Visit>,
        categories: impl IntoIterator<Item = K>,
        key: impl Fn(&Visit) -> Option<K>,
    ) -> Self {
        let mut map: BTreeMap<(i32, K), usize> = BTreeMap::new();
        let mut years = BTreeSet::new();
        for visit in visits {
            years.insert(visit.year);
            if let Some(category) = key(visit) {
                *map.entry((visit.year, category)).or_insert(0) += 1;
            }
        }
        let mut categories: Vec<K> = categories.into_iter().collect();
        let extra: BTreeSet<K> = map
            .keys()
            .map(|(_, category)| *category)
            .filter(|category| !categories.contains(category))
            .collect();
        categories.extend(extra);

        let years: Vec<i32> = years.into_iter().collect();
        let mut counts = Vec::with_capacity(years.len() * categories.len());
        for &category in &categories {
            for &year in &years {
                counts.push(YearCount {
                    year,
                    category,
                    count: map.get(&(year, category)).copied().unwrap_or(0),
                });
            }
        }
        ByYear {
            years,
            categories,
            counts,
        }
    }

    pub fn get(&self, year: i32, category: K) -> usize {
        self.counts
            .iter()
            .find(|c| c.year == year && c.category == category)
            .map(|c| c.count)
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|c| c.count).sum()
    }
}

/// All the numbers the report shows.
#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub total_rows: usize,
    pub unique_patients: usize,
    pub unique_services: usize,
    pub unique_visits: usize,
    pub sex_distribution: BTreeMap<Sex, usize>,
    /// All six groups in order, including empty ones.
    pub age_distribution: Vec<AgeGroupCount>,
    /// Rows with a missing age or one outside the bucketed range.
    pub unknown_age: usize,
    pub monthly_distribution: BTreeMap<YearMonth, usize>,
    pub top_services: Vec<ServiceCount>,
    pub years: Vec<i32>,
    pub sex_by_year: ByYear<Sex>,
    pub age_by_year: ByYear<AgeGroup>,
}

impl Metrics {
    pub fn calculate(visits: &Visits) -> Self {
        let (age_distribution, unknown_age) = age_distribution(visits);
        Metrics {
            total_rows: visits.len(),
            unique_patients: unique_patients(visits),
            unique_services: unique_services(visits),
            unique_visits: unique_visits(visits),
            sex_distribution: sex_distribution(visits),
            age_distribution,
            unknown_age,
            monthly_distribution: monthly_distribution(visits),
            top_services: top_services(visits, TOP_SERVICES),
            years: visits.years(),
            sex_by_year: ByYear::count(visits, [Sex::Male, Sex::Female], |v| Some(v.sex)),
            age_by_year: ByYear::count(visits, AgeGroup::ALL, |v| v.age_group),
        }
    }
}

pub fn unique_patients(visits: &Visits) -> usize {
    visits.patient_ids().count()
}

pub fn unique_services(visits: &[Visit]) -> usize {
    visits
        .iter()
        .map(|v| &v.service_name)
        .collect::<BTreeSet<_>>()
        .len()
}

/// A visit is a distinct (patient, service date) pair.
pub fn unique_visits(visits: &[Visit]) -> usize {
    visits
        .iter()
        .map(|v| (&v.patient_id, v.service_date))
        .collect::<BTreeSet<_>>()
        .len()
}

pub fn sex_distribution(visits: &[Visit]) -> BTreeMap<Sex, usize> {
    // B Tree so we get a predictable ordering.
    let mut map = BTreeMap::new();
    for el in visits {
        *map.entry(el.sex).or_insert(0) += 1;
    }
    map
}

/// Count rows into the six age groups. The second value is the number of rows without a group.
pub fn age_distribution(visits: &[Visit]) -> (Vec<AgeGroupCount>, usize) {
    let bucketed = AGE_BUCKETS.bucket_values_with_missing(visits.iter().map(|v| v.age));
    let counts = AgeGroup::ALL
        .iter()
        .zip(bucketed.counts())
        .map(|(&age_group, &count)| AgeGroupCount { age_group, count })
        .collect();
    (counts, bucketed.missing())
}

pub fn monthly_distribution(visits: &[Visit]) -> BTreeMap<YearMonth, usize> {
    let mut map = BTreeMap::new();
    for el in visits {
        *map.entry(el.month).or_insert(0) += 1;
    }
    map
}

/// The `n` most frequent service names, most frequent first. Ties keep the order in which the
/// services first appear in the data.
pub fn top_services(visits: &[Visit], n: usize) -> Vec<ServiceCount> {
    let mut counts: Vec<ServiceCount> = Vec::new();
    let mut idx: HashMap<&ArcStr, usize> = HashMap::new();
    for visit in visits {
        match idx.entry(&visit.service_name) {
            Entry::Occupied(e) => counts[*e.get()].count += 1,
            Entry::Vacant(e) => {
                e.insert(counts.len());
                counts.push(ServiceCount {
                    name: visit.service_name.clone(),
                    count: 1,
                });
            }
        }
    }
    // stable, so ties stay in first-seen order.
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(n);
    counts
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::raw;

    fn sample() -> Visits {
        vec![
            raw("P1", (2021, 4, 3), 25., 2, "Primary appointment"),
            raw("P1", (2021, 4, 3), 25., 2, "Blood test"),
            raw("P2", (2021, 7, 14), 44., 1, "Primary appointment"),
            raw("P3", (2022, 4, 20), 0., 2, "Ultrasound"),
            raw("P3", (2022, 4, 21), 0., 2, "Blood test"),
            raw("P4", (2022, 7, 1), 70., 2, "Primary appointment"),
            raw("P5", (2022, 12, 30), 101., 1, "ECG"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn scalar_counts() {
        let visits = sample();
        let m = Metrics::calculate(&visits);
        assert_eq!(m.total_rows, 7);
        assert_eq!(m.unique_patients, 5);
        assert_eq!(m.unique_services, 4);
        // P1 has two rows on one day.
        assert_eq!(m.unique_visits, 6);
        assert!(m.unique_patients <= m.total_rows);
        assert!(m.unique_visits <= m.total_rows);
        assert!(m.unique_services <= m.total_rows);
        assert_eq!(m.years, [2021, 2022]);
    }

    #[test]
    fn age_table_sums_to_bucketed_rows() {
        let m = Metrics::calculate(&sample());
        let counts: Vec<usize> = m.age_distribution.iter().map(|c| c.count).collect();
        assert_eq!(counts, [0, 2, 1, 0, 1, 0]);
        assert_eq!(m.unknown_age, 3);
        assert_eq!(counts.iter().sum::<usize>(), m.total_rows - m.unknown_age);
        let labels: Vec<&str> = m.age_distribution.iter().map(|c| c.age_group.label()).collect();
        assert_eq!(labels, ["0-18", "19-35", "36-50", "51-65", "66-80", "81-100"]);
    }

    #[test]
    fn sex_and_month_tables() {
        let m = Metrics::calculate(&sample());
        assert_eq!(m.sex_distribution.get(&Sex::Male), Some(&2));
        assert_eq!(m.sex_distribution.get(&Sex::Female), Some(&5));
        let months: Vec<(String, usize)> = m
            .monthly_distribution
            .iter()
            .map(|(month, count)| (month.to_string(), *count))
            .collect();
        assert_eq!(
            months,
            [
                ("2021-04".to_string(), 2),
                ("2021-07".to_string(), 1),
                ("2022-04".to_string(), 2),
                ("2022-07".to_string(), 1),
                ("2022-12".to_string(), 1),
            ]
        );
    }

    #[test]
    fn top_services_ties_keep_first_seen_order() {
        let visits = sample();
        let top = top_services(&visits, 10);
        let names: Vec<(&str, usize)> = top.iter().map(|s| (&*s.name, s.count)).collect();
        assert_eq!(
            names,
            [
                ("Primary appointment", 3),
                ("Blood test", 2),
                ("Ultrasound", 1),
                ("ECG", 1),
            ]
        );
        assert_eq!(top_services(&visits, 2).len(), 2);
    }

    #[test]
    fn top_services_caps_at_ten() {
        let visits: Visits = (0..15)
            .flat_map(|i| {
                (0..=i).map(move |_| raw("P1", (2021, 1, 1), 30., 1, &format!("service {}", i)))
            })
            .collect();
        let top = top_services(&visits, TOP_SERVICES);
        assert_eq!(top.len(), 10);
        assert!(top.windows(2).all(|w| w[0].count >= w[1].count));
        assert_eq!(&*top[0].name, "service 14");
    }

    #[test]
    fn grouped_by_year() {
        let m = Metrics::calculate(&sample());
        assert_eq!(m.sex_by_year.categories, [Sex::Male, Sex::Female]);
        assert_eq!(m.sex_by_year.get(2021, Sex::Female), 2);
        assert_eq!(m.sex_by_year.get(2022, Sex::Female), 3);
        assert_eq!(m.sex_by_year.get(2022, Sex::Male), 1);
        assert_eq!(m.sex_by_year.total(), 7);

        // rows without an age group are left out.
        assert_eq!(m.age_by_year.categories.len(), 6);
        assert_eq!(m.age_by_year.total(), 4);
        assert_eq!(m.age_by_year.get(2021, AgeGroup::From19To35), 2);
        assert_eq!(m.age_by_year.get(2022, AgeGroup::From66To80), 1);
    }

    #[test]
    fn three_identical_rows_make_one_visit() {
        let input = "\
insured,service_date,age_for_service_date,sex_id,service_name
P1,2021-05-05,40,1,Primary appointment
P1,2021-05-05,40,1,Primary appointment
P1,2021-05-05,40,1,Primary appointment
";
        let visits = Visits::from_csv_reader(std::io::Cursor::new(input)).unwrap();
        assert_eq!(visits.len(), 1);
        assert_eq!(unique_visits(&visits), 1);
        assert_eq!(visits.load_summary().duplicates_dropped, 2);
    }

    #[test]
    fn unknown_sex_codes_get_their_own_category() {
        let visits: Visits = vec![
            raw("P1", (2021, 1, 1), 30., 1, "A"),
            raw("P2", (2021, 1, 1), 30., 3, "A"),
        ]
        .into_iter()
        .collect();
        let by_year = ByYear::count(&visits, [Sex::Male, Sex::Female], |v| Some(v.sex));
        assert_eq!(by_year.categories, [Sex::Male, Sex::Female, Sex::Other(3)]);
        assert_eq!(by_year.get(2021, Sex::Female), 0);
    }
}
