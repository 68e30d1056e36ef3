use chrono::{Datelike, NaiveDate};
use polars::prelude::PlSmallStr;
use polars::prelude::*;
use std::collections::HashMap;

use crate::routes::RouteCatalog;

pub const DATE_COLUMN: &str = "Fecha";
pub const ROUTE_COLUMN: &str = "Ruta";
const SUM_COLUMN: &str = "route_total";

/// Days between 0001-01-01 and 1970-01-01, the epoch of polars dates.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// One input row after parsing. Route and value may be blank in the sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub date: NaiveDate,
    pub route: Option<String>,
    pub value: Option<f64>,
}

impl Record {
    pub fn new(date: NaiveDate, route: impl Into<String>, value: f64) -> Self {
        Self {
            date,
            route: Some(route.into()),
            value: Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteTotal {
    pub route: String,
    pub total: f64,
}

/// Everything the report needs from one table for one day.
#[derive(Debug, Clone, PartialEq)]
pub struct DaySummary {
    pub by_route: Vec<RouteTotal>,
    pub total: f64,
    pub has_records: bool,
}

/// Records of one metric (kilometers or passengers) as a polars frame with
/// `Fecha` (Date), `Ruta` (String) and the metric column (Float64).
#[derive(Debug, Clone)]
pub struct RecordTable {
    df: DataFrame,
    metric: String,
}

impl RecordTable {
    pub fn new(metric: impl Into<String>, records: &[Record]) -> PolarsResult<Self> {
        let metric = metric.into();
        let dates: Vec<i32> = records.iter().map(|r| date_to_i32(r.date)).collect();
        let routes: Vec<Option<&str>> = records.iter().map(|r| r.route.as_deref()).collect();
        let values: Vec<Option<f64>> = records.iter().map(|r| r.value).collect();

        let columns = vec![
            Series::new(PlSmallStr::from_static(DATE_COLUMN), dates)
                .cast(&DataType::Date)?
                .into_column(),
            Series::new(PlSmallStr::from_static(ROUTE_COLUMN), routes).into_column(),
            Series::new(metric.as_str().into(), values).into_column(),
        ];
        let df = DataFrame::new(columns)?;
        Ok(Self { df, metric })
    }

    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    fn on_date(&self, date: NaiveDate) -> PolarsResult<DataFrame> {
        self.df
            .clone()
            .lazy()
            .filter(col(DATE_COLUMN).eq(lit(date).cast(DataType::Date)))
            .collect()
    }

    pub fn has_records_on(&self, date: NaiveDate) -> PolarsResult<bool> {
        Ok(self.on_date(date)?.height() > 0)
    }

    /// Sum of the metric per catalog route on `date`, in catalog order.
    /// Routes without rows get 0; routes outside the catalog are ignored.
    pub fn sum_by_route(
        &self,
        date: NaiveDate,
        routes: &RouteCatalog,
    ) -> PolarsResult<Vec<RouteTotal>> {
        let day = self.on_date(date)?;
        Self::route_totals(day, &self.metric, routes)
    }

    /// Sum of the metric over every row on `date`, whatever the route.
    pub fn sum_total(&self, date: NaiveDate) -> PolarsResult<f64> {
        let day = self.on_date(date)?;
        Self::column_total(&day, &self.metric)
    }

    pub fn summarize_day(
        &self,
        date: NaiveDate,
        routes: &RouteCatalog,
    ) -> PolarsResult<DaySummary> {
        let day = self.on_date(date)?;
        let has_records = day.height() > 0;
        let total = Self::column_total(&day, &self.metric)?;
        let by_route = Self::route_totals(day, &self.metric, routes)?;
        Ok(DaySummary {
            by_route,
            total,
            has_records,
        })
    }

    fn column_total(day: &DataFrame, metric: &str) -> PolarsResult<f64> {
        Ok(day.column(metric)?.f64()?.sum().unwrap_or(0.0))
    }

    fn route_totals(
        day: DataFrame,
        metric: &str,
        routes: &RouteCatalog,
    ) -> PolarsResult<Vec<RouteTotal>> {
        let grouped = day
            .lazy()
            .group_by([col(ROUTE_COLUMN)])
            .agg([col(metric).sum().alias(SUM_COLUMN)])
            .collect()?;

        let route_col = grouped.column(ROUTE_COLUMN)?.str()?;
        let sum_col = grouped.column(SUM_COLUMN)?.f64()?;
        let mut sums: HashMap<&str, f64> = HashMap::with_capacity(grouped.height());
        for idx in 0..grouped.height() {
            if let (Some(route), Some(total)) = (route_col.get(idx), sum_col.get(idx)) {
                sums.insert(route, total);
            }
        }

        Ok(routes
            .iter()
            .map(|route| RouteTotal {
                route: route.to_string(),
                total: sums.get(route).copied().unwrap_or(0.0),
            })
            .collect())
    }
}

fn date_to_i32(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn catalog() -> RouteCatalog {
        RouteCatalog::new(["C6-001", "C6-002", "C6-003"])
    }

    fn sample() -> Vec<Record> {
        vec![
            Record::new(d(2024, 1, 15), "C6-001", 100.0),
            Record::new(d(2024, 1, 15), "C6-001", 50.0),
            Record::new(d(2024, 1, 15), "C6-003", 25.0),
            Record::new(d(2024, 1, 15), "UNKNOWN", 5.0),
            Record::new(d(2024, 1, 16), "C6-002", 70.0),
            Record {
                date: d(2024, 1, 15),
                route: None,
                value: Some(1.0),
            },
            Record {
                date: d(2024, 1, 15),
                route: Some("C6-002".into()),
                value: None,
            },
        ]
    }

    #[test]
    fn epoch_conversion_matches_polars() {
        assert_eq!(date_to_i32(d(1970, 1, 1)), 0);
        assert_eq!(date_to_i32(d(1970, 1, 2)), 1);
    }

    #[test]
    fn sums_per_route_in_catalog_order() {
        let table = RecordTable::new("Km", &sample()).unwrap();
        let totals = table.sum_by_route(d(2024, 1, 15), &catalog()).unwrap();
        let pairs: Vec<(&str, f64)> = totals.iter().map(|t| (t.route.as_str(), t.total)).collect();
        assert_eq!(
            pairs,
            vec![("C6-001", 150.0), ("C6-002", 0.0), ("C6-003", 25.0)]
        );
    }

    #[test]
    fn total_counts_unknown_and_blank_routes() {
        let table = RecordTable::new("Km", &sample()).unwrap();
        assert_eq!(table.sum_total(d(2024, 1, 15)).unwrap(), 181.0);
        assert_eq!(table.sum_total(d(2024, 1, 16)).unwrap(), 70.0);
    }

    #[test]
    fn empty_day_yields_zeroes() {
        let table = RecordTable::new("Pax", &sample()).unwrap();
        let summary = table.summarize_day(d(2024, 2, 1), &catalog()).unwrap();
        assert!(!summary.has_records);
        assert_eq!(summary.total, 0.0);
        assert!(summary.by_route.iter().all(|t| t.total == 0.0));
        assert_eq!(summary.by_route.len(), 3);
    }

    #[test]
    fn empty_table_is_valid() {
        let table = RecordTable::new("Pax", &[]).unwrap();
        assert_eq!(table.height(), 0);
        assert_eq!(table.sum_total(d(2024, 1, 15)).unwrap(), 0.0);
        assert!(!table.has_records_on(d(2024, 1, 15)).unwrap());
    }

    #[test]
    fn row_order_does_not_change_sums() {
        let mut records = sample();
        let forward = RecordTable::new("Km", &records).unwrap();
        records.reverse();
        records.rotate_left(3);
        let shuffled = RecordTable::new("Km", &records).unwrap();
        let date = d(2024, 1, 15);
        assert_eq!(
            forward.sum_by_route(date, &catalog()).unwrap(),
            shuffled.sum_by_route(date, &catalog()).unwrap()
        );
        assert_eq!(
            forward.sum_total(date).unwrap(),
            shuffled.sum_total(date).unwrap()
        );
    }
}
