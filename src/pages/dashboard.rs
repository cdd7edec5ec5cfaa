//! Executive sales dashboard: filters, group-by aggregations and text charts.

use super::PageResult;
use crate::gate::{Handler, Outcome, Params, Request};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

const SAMPLE_DATA: &str = include_str!("../../fixtures/sales.json");

/// Outlet codes mapped to the market they serve
const MARKETS: &[(&str, &str)] = &[
    ("OUT027", "California"),
    ("OUT013", "New York"),
    ("OUT049", "Texas"),
    ("OUT046", "Florida"),
    ("OUT035", "Oklahoma"),
    ("OUT045", "California"),
    ("OUT018", "Arizona"),
    ("OUT017", "Nevada"),
    ("OUT010", "Pennsylvania"),
    ("OUT019", "New Jersey"),
];

const STORE_FORMATS: &[(&str, &str)] = &[
    ("Supermarket Type1", "Standard Supermarket"),
    ("Grocery Store", "Local Grocery"),
    ("Supermarket Type3", "Premium Supermarket"),
    ("Supermarket Type2", "Discount Supermarket"),
];

const BAR_WIDTH: usize = 30;
const ATTENTION_ROWS: usize = 5;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read dataset {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset is not a JSON array of sales records: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SalesRecord {
    pub outlet: String,
    pub outlet_type: String,
    pub item_type: String,
    pub item_mrp: f64,
    pub item_visibility: f64,
    pub outlet_sales: f64,
}

impl SalesRecord {
    /// `(sales - mrp) / sales` as a percentage; undefined for zero sales
    pub fn profit_margin(&self) -> Option<f64> {
        if self.outlet_sales == 0.0 {
            None
        } else {
            Some((self.outlet_sales - self.item_mrp) / self.outlet_sales * 100.0)
        }
    }

    /// Sales per unit of shelf visibility; undefined for invisible items
    pub fn revenue_per_visibility(&self) -> Option<f64> {
        if self.item_visibility == 0.0 {
            None
        } else {
            Some(self.outlet_sales / self.item_visibility)
        }
    }
}

fn friendly<'a>(table: &[(&str, &'a str)], code: &'a str) -> &'a str {
    table
        .iter()
        .find(|(from, _)| *from == code)
        .map(|(_, to)| *to)
        .unwrap_or(code)
}

/// Sales records with friendly market and store-format names applied
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<SalesRecord>,
}

impl Dataset {
    pub fn from_records(records: Vec<SalesRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|mut r| {
                r.outlet = friendly(MARKETS, &r.outlet).to_string();
                r.outlet_type = friendly(STORE_FORMATS, &r.outlet_type).to_string();
                r
            })
            .collect();
        Self { records }
    }

    pub fn from_json(content: &str) -> Result<Self, DataError> {
        let records: Vec<SalesRecord> = serde_json::from_str(content)?;
        Ok(Self::from_records(records))
    }

    pub fn load(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Built-in sample used when no dataset is configured
    pub fn sample() -> Result<Self, DataError> {
        Self::from_json(SAMPLE_DATA)
    }

    pub fn records(&self) -> &[SalesRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Record filter. An empty selection means "everything".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub markets: Vec<String>,
    pub store_formats: Vec<String>,
    pub categories: Vec<String>,
}

impl Filter {
    /// Build from `outlet=`, `type=` and `item=` parameters (comma separated)
    pub fn from_params(params: &Params) -> Self {
        let list = |key: &str| -> Vec<String> {
            params
                .get(key)
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };
        Self {
            markets: list("outlet"),
            store_formats: list("type"),
            categories: list("item"),
        }
    }

    pub fn matches(&self, record: &SalesRecord) -> bool {
        selected(&self.markets, &record.outlet)
            && selected(&self.store_formats, &record.outlet_type)
            && selected(&self.categories, &record.item_type)
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty() && self.store_formats.is_empty() && self.categories.is_empty()
    }
}

fn selected(selection: &[String], value: &str) -> bool {
    selection.is_empty() || selection.iter().any(|s| s.eq_ignore_ascii_case(value))
}

/// Aggregates for one group-by key
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    pub key: String,
    pub records: usize,
    pub revenue: f64,
    pub mean_margin: Option<f64>,
    pub mean_visibility: f64,
}

/// Item MRP spread for one store format
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSpread {
    pub store_format: String,
    pub records: usize,
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub records: usize,
    pub total_revenue: f64,
    pub avg_margin: Option<f64>,
    pub top_market: Option<String>,
    /// Markets in the market selection, whatever the other filters keep
    pub store_count: usize,
    /// Ascending by revenue
    pub revenue_by_market: Vec<GroupStats>,
    /// Alphabetical by store format
    pub store_formats: Vec<GroupStats>,
    /// Descending by revenue
    pub categories: Vec<GroupStats>,
    /// Alphabetical by store format
    pub price_points: Vec<PriceSpread>,
    /// Lowest mean margin first
    pub needs_attention: Vec<GroupStats>,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

fn group_by(records: &[&SalesRecord], key: impl Fn(&SalesRecord) -> &str) -> Vec<GroupStats> {
    let mut groups: BTreeMap<&str, Vec<&SalesRecord>> = BTreeMap::new();
    for &record in records {
        groups.entry(key(record)).or_default().push(record);
    }
    groups
        .into_iter()
        .map(|(k, rows)| GroupStats {
            key: k.to_string(),
            records: rows.len(),
            revenue: rows.iter().map(|r| r.outlet_sales).sum(),
            mean_margin: mean(rows.iter().filter_map(|r| r.profit_margin())),
            mean_visibility: mean(rows.iter().map(|r| r.item_visibility)).unwrap_or(0.0),
        })
        .collect()
}

fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn price_points(records: &[&SalesRecord]) -> Vec<PriceSpread> {
    let mut by_format: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for record in records {
        by_format
            .entry(record.outlet_type.as_str())
            .or_default()
            .push(record.item_mrp);
    }
    by_format
        .into_iter()
        .map(|(format, mut prices)| {
            prices.sort_by(f64::total_cmp);
            PriceSpread {
                store_format: format.to_string(),
                records: prices.len(),
                min: prices[0],
                median: median(&prices),
                max: prices[prices.len() - 1],
            }
        })
        .collect()
}

fn filtered<'a>(dataset: &'a Dataset, filter: &Filter) -> Vec<&'a SalesRecord> {
    dataset
        .records()
        .iter()
        .filter(|r| filter.matches(r))
        .collect()
}

pub fn summarize(dataset: &Dataset, filter: &Filter) -> Summary {
    let rows = filtered(dataset, filter);

    let mut revenue_by_market = group_by(&rows, |r| r.outlet.as_str());
    revenue_by_market.sort_by(|a, b| a.revenue.total_cmp(&b.revenue));
    let top_market = revenue_by_market.last().map(|g| g.key.clone());

    let store_formats = group_by(&rows, |r| r.outlet_type.as_str());

    let mut categories = group_by(&rows, |r| r.item_type.as_str());
    categories.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));

    let mut needs_attention = categories.clone();
    needs_attention.sort_by(|a, b| match (a.mean_margin, b.mean_margin) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    needs_attention.truncate(ATTENTION_ROWS);

    let store_count = dataset
        .records()
        .iter()
        .filter(|r| selected(&filter.markets, &r.outlet))
        .map(|r| r.outlet.as_str())
        .collect::<BTreeSet<_>>()
        .len();

    Summary {
        records: rows.len(),
        total_revenue: rows.iter().map(|r| r.outlet_sales).sum(),
        avg_margin: mean(rows.iter().filter_map(|r| r.profit_margin())),
        top_market,
        store_count,
        revenue_by_market,
        store_formats,
        categories,
        price_points: price_points(&rows),
        needs_attention,
    }
}

/// `$1,234,567` style rounding to whole units
pub fn format_money(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

fn bar(value: f64, max: f64) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let len = ((value / max) * BAR_WIDTH as f64).round() as usize;
    "█".repeat(len.clamp(1, BAR_WIDTH))
}

fn fmt_margin(margin: Option<f64>) -> String {
    margin
        .map(|m| format!("{:.1}%", m))
        .unwrap_or_else(|| "n/a".to_string())
}

fn fmt_price(value: f64) -> String {
    format!("${:.2}", value)
}

pub fn render(summary: &Summary, filter: &Filter) -> String {
    let mut out = String::from("# Executive Sales Performance Dashboard\n");
    out.push_str(&format!("Last updated: {}\n", Utc::now().format("%B %d, %Y")));
    if !filter.is_empty() {
        out.push_str(&format!(
            "Filters: markets={:?} formats={:?} categories={:?}\n",
            filter.markets, filter.store_formats, filter.categories
        ));
    }
    out.push('\n');

    if summary.records == 0 {
        out.push_str("No records match the selected filters.\n");
        return out;
    }

    out.push_str(&format!("Total Revenue      {}\n", format_money(summary.total_revenue)));
    out.push_str(&format!("Avg Profit Margin  {}\n", fmt_margin(summary.avg_margin)));
    out.push_str(&format!(
        "Top Market         {}\n",
        summary.top_market.as_deref().unwrap_or("-")
    ));
    out.push_str(&format!("Store Count        {}\n", summary.store_count));

    out.push_str("\n## Revenue by Market\n");
    let max = summary
        .revenue_by_market
        .iter()
        .map(|g| g.revenue)
        .fold(0.0, f64::max);
    for g in &summary.revenue_by_market {
        out.push_str(&format!(
            "{:<14} {:<30} {}\n",
            g.key,
            bar(g.revenue, max),
            format_money(g.revenue)
        ));
    }

    out.push_str("\n## Store Format Performance\n");
    for g in &summary.store_formats {
        out.push_str(&format!(
            "{:<22} revenue {:>10}  margin {:>7}\n",
            g.key,
            format_money(g.revenue),
            fmt_margin(g.mean_margin)
        ));
    }

    out.push_str("\n## Product Category Performance\n");
    for g in &summary.categories {
        out.push_str(&format!(
            "{:<22} revenue {:>10}  visibility {:>6.2}%\n",
            g.key,
            format_money(g.revenue),
            g.mean_visibility * 100.0
        ));
    }

    out.push_str("\n## Price Point Analysis\n");
    for p in &summary.price_points {
        out.push_str(&format!(
            "{:<22} min {:>9}  median {:>9}  max {:>9}\n",
            p.store_format,
            fmt_price(p.min),
            fmt_price(p.median),
            fmt_price(p.max)
        ));
    }

    out.push_str("\n## Products Needing Attention\n");
    for g in &summary.needs_attention {
        out.push_str(&format!(
            "{:<22} margin {:>7}  revenue {:>10}\n",
            g.key,
            fmt_margin(g.mean_margin),
            format_money(g.revenue)
        ));
    }
    out
}

/// One exported CSV row: the record plus its derived metrics
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    outlet: &'a str,
    outlet_type: &'a str,
    item_type: &'a str,
    item_mrp: f64,
    item_visibility: f64,
    outlet_sales: f64,
    profit_margin: Option<f64>,
    revenue_per_visibility: Option<f64>,
}

/// Default export file name, dated like `sales_analytics_20260131.csv`
pub fn default_export_path() -> PathBuf {
    PathBuf::from(format!("sales_analytics_{}.csv", Utc::now().format("%Y%m%d")))
}

/// Write the records selected by `filter` to `path` as CSV. Returns the row count.
pub fn export_csv(dataset: &Dataset, filter: &Filter, path: &Path) -> Result<usize, DataError> {
    let io_err = |source: std::io::Error| DataError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(io_err)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    let mut rows = 0;
    for record in filtered(dataset, filter) {
        writer.serialize(ExportRow {
            outlet: &record.outlet,
            outlet_type: &record.outlet_type,
            item_type: &record.item_type,
            item_mrp: record.item_mrp,
            item_visibility: record.item_visibility,
            outlet_sales: record.outlet_sales,
            profit_margin: record.profit_margin(),
            revenue_per_visibility: record.revenue_per_visibility(),
        })?;
        rows += 1;
    }
    writer.flush().map_err(io_err)?;
    Ok(rows)
}

pub struct DashboardPage {
    dataset: Arc<Dataset>,
}

impl DashboardPage {
    pub fn new(dataset: Arc<Dataset>) -> Self {
        Self { dataset }
    }
}

impl Handler for DashboardPage {
    type Output = PageResult;

    fn name(&self) -> &str {
        "dashboard"
    }

    fn handle(&self, req: &mut Request<'_>) -> Outcome<PageResult> {
        let filter = Filter::from_params(&req.params);
        let summary = summarize(&self.dataset, &filter);
        let mut out = render(&summary, &filter);

        if let Some(target) = req.param("export") {
            let path = if target.is_empty() {
                default_export_path()
            } else {
                PathBuf::from(target)
            };
            match export_csv(&self.dataset, &filter, &path) {
                Ok(rows) => out.push_str(&format!(
                    "\nExported {} rows to {}\n",
                    rows,
                    path.display()
                )),
                Err(e) => return Outcome::Rendered(Err(e.into())),
            }
        }
        Outcome::Rendered(Ok(out))
    }
}
