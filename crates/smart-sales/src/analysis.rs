//! Business reports rolled up from a cube frame.
//!
//! Every function takes the cube as a DataFrame (as built, or read back from
//! its CSV file) and only relies on the dimension and measure columns it
//! names. Re-aggregation always sums, and groups come back sorted by their
//! keys with nulls last unless a report ranks by a total instead.

use crate::cube::AggFunc;
use crate::cube::enrich::left_join_attribute;
use crate::cube::metric_expr;
use crate::error::Result;
use crate::io::write_csv;
use crate::utils::{col_exprs, f64_values, group_sorted, require_columns};
use chrono::Month;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::info;

/// Measure column summed by the sales reports.
pub const SALES_MEASURE: &str = "SaleAmount_sum";

/// Measure column counted by the product report.
pub const COUNT_MEASURE: &str = "TransactionID_count";

/// Sum `measures` grouped by `dimensions`, sorted ascending by dimension.
///
/// Measures keep their names. Integer measures sum to `Int64`, float
/// measures to `Float64`, and NaN counts as missing.
pub fn rollup<S: AsRef<str>, M: AsRef<str>>(
    cube: &DataFrame,
    dimensions: &[S],
    measures: &[M],
) -> Result<DataFrame> {
    require_columns(cube, dimensions, "rollup dimensions")?;
    require_columns(cube, measures, "rollup measures")?;

    let key_names: Vec<String> = dimensions.iter().map(|d| d.as_ref().to_string()).collect();
    let mut aggs = Vec::with_capacity(measures.len());
    for measure in measures {
        let measure = measure.as_ref();
        let dtype = cube.column(measure)?.dtype();
        aggs.push(metric_expr(measure, dtype, AggFunc::Sum).alias(measure));
    }
    group_sorted(cube, &col_exprs(dimensions), &key_names, aggs)
}

/// Rollup of [`SALES_MEASURE`] renamed to `TotalSales`.
fn total_sales<S: AsRef<str>>(cube: &DataFrame, dimensions: &[S]) -> Result<DataFrame> {
    let mut totals = rollup(cube, dimensions, &[SALES_MEASURE])?;
    totals.rename(SALES_MEASURE, "TotalSales".into())?;
    Ok(totals)
}

/// Stable sort by a numeric column; nulls last.
fn sort_by_numeric(df: &DataFrame, column: &str, ascending: bool) -> Result<DataFrame> {
    Ok(df
        .clone()
        .lazy()
        .sort_by_exprs(
            [col(column).cast(DataType::Float64)],
            SortMultipleOptions::default()
                .with_order_descending(!ascending)
                .with_nulls_last(true)
                .with_maintain_order(true),
        )
        .collect()?)
}

fn product_names(products: &DataFrame) -> Result<DataFrame> {
    Ok(products.select(["ProductID", "ProductName"])?)
}

/// Total sales per day of week, least profitable day first.
pub fn sales_by_weekday(cube: &DataFrame) -> Result<DataFrame> {
    let totals = total_sales(cube, &["DayOfWeek"])?;
    let sorted = sort_by_numeric(&totals, "TotalSales", true)?;
    info!("Sales aggregated by DayOfWeek ({} days)", sorted.height());
    Ok(sorted)
}

/// The day with the lowest total in a [`sales_by_weekday`] frame.
pub fn least_profitable_day(by_weekday: &DataFrame) -> Result<Option<(String, f64)>> {
    require_columns(by_weekday, &["DayOfWeek", "TotalSales"], "least profitable day")?;
    let sorted = sort_by_numeric(by_weekday, "TotalSales", true)?;
    if sorted.height() == 0 {
        return Ok(None);
    }

    let day = match sorted.column("DayOfWeek")?.get(0)? {
        AnyValue::String(s) => s.to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        AnyValue::Null => return Ok(None),
        other => other.to_string(),
    };
    let total = f64_values(sorted.column("TotalSales")?.as_materialized_series())?[0];
    Ok(total.map(|t| (day, t)))
}

/// Total sales per month, in month order.
pub fn sales_by_month(cube: &DataFrame) -> Result<DataFrame> {
    total_sales(cube, &["Month"])
}

/// Total sales per (month, region).
pub fn sales_by_month_and_region(cube: &DataFrame) -> Result<DataFrame> {
    total_sales(cube, &["Month", "Region"])
}

/// Weakest and strongest month of every region.
///
/// Columns: Region, LeastPerformingMonth, LeastPerformingSales,
/// BestPerformingMonth, BestPerformingSales. Months are English names. Rows
/// without a region or month are left out; ties go to the earlier month.
pub fn least_and_best_months_by_region(cube: &DataFrame) -> Result<DataFrame> {
    let monthly = rollup(cube, &["Region", "Month"], &[SALES_MEASURE])?
        .lazy()
        .filter(col("Region").is_not_null().and(col("Month").is_not_null()))
        .collect()?;

    let by_sales = |descending: bool| {
        col("Month").sort_by(
            [col(SALES_MEASURE)],
            SortMultipleOptions::default()
                .with_order_descending(descending)
                .with_maintain_order(true),
        )
    };
    let aggs = vec![
        by_sales(false).first().alias("LeastPerformingMonth"),
        col(SALES_MEASURE).min().alias("LeastPerformingSales"),
        by_sales(true).first().alias("BestPerformingMonth"),
        col(SALES_MEASURE).max().alias("BestPerformingSales"),
    ];
    let mut extremes = group_sorted(&monthly, &[col("Region")], &["Region".to_string()], aggs)?;

    for column in ["LeastPerformingMonth", "BestPerformingMonth"] {
        let months = f64_values(extremes.column(column)?.as_materialized_series())?;
        let names: Vec<Option<String>> = months
            .into_iter()
            .map(|m| m.and_then(month_name))
            .collect();
        extremes.replace(column, Series::new(column.into(), names))?;
    }
    info!("Least and best months found for {} regions", extremes.height());
    Ok(extremes)
}

fn month_name(month: f64) -> Option<String> {
    if month.fract() != 0.0 || !(1.0..=12.0).contains(&month) {
        return None;
    }
    Month::try_from(month as u8).ok().map(|m| m.name().to_string())
}

/// Total sales, transaction count and average transaction size per customer.
///
/// A customer with no counted transactions gets a null average.
pub fn customer_average_transaction_size(cube: &DataFrame) -> Result<DataFrame> {
    let mut stats = rollup(cube, &["CustomerID"], &[SALES_MEASURE, COUNT_MEASURE])?;
    stats.rename(SALES_MEASURE, "TotalSales".into())?;
    stats.rename(COUNT_MEASURE, "TransactionCount".into())?;

    let average = when(col("TransactionCount").gt(lit(0)))
        .then(
            col("TotalSales").cast(DataType::Float64)
                / col("TransactionCount").cast(DataType::Float64),
        )
        .otherwise(lit(NULL))
        .alias("AverageTransactionSize");
    Ok(stats.lazy().with_column(average).collect()?)
}

/// The highest-grossing product of every day of week.
///
/// Columns: DayOfWeek, ProductID, TotalSales, ProductName. Days are in
/// ascending name order; ties go to the lower product id.
pub fn top_product_by_weekday(cube: &DataFrame, products: &DataFrame) -> Result<DataFrame> {
    let totals = total_sales(cube, &["DayOfWeek", "ProductID"])?;
    let top = totals
        .lazy()
        .sort_by_exprs(
            [col("DayOfWeek"), col("TotalSales")],
            SortMultipleOptions::default()
                .with_order_descending_multi([false, true])
                .with_nulls_last(true)
                .with_maintain_order(true),
        )
        .group_by_stable([col("DayOfWeek")])
        .head(Some(1))
        .collect()?;
    left_join_attribute(&top, &product_names(products)?, "ProductID", &["ProductName"])
}

/// Total sales per (region, product name).
pub fn most_purchased_products_by_region(
    cube: &DataFrame,
    products: &DataFrame,
) -> Result<DataFrame> {
    let names = product_names(products)?;
    let named = left_join_attribute(cube, &names, "ProductID", &["ProductName"])?;
    total_sales(&named, &["Region", "ProductName"])
}

/// Total sales per customer with the customer's preferred contact method.
pub fn sales_by_customer_contact(cube: &DataFrame, customers: &DataFrame) -> Result<DataFrame> {
    let totals = total_sales(cube, &["CustomerID"])?;
    let contacts = customers.select(["CustomerID", "PreferredContactMethod"])?;
    left_join_attribute(&totals, &contacts, "CustomerID", &["PreferredContactMethod"])
}

/// Total sales per preferred contact method, largest first.
pub fn sales_by_contact_method(by_customer: &DataFrame) -> Result<DataFrame> {
    require_columns(
        by_customer,
        &["PreferredContactMethod", "TotalSales"],
        "contact method sales",
    )?;
    let totals = rollup(by_customer, &["PreferredContactMethod"], &["TotalSales"])?;
    sort_by_numeric(&totals, "TotalSales", false)
}

/// Total sales per (month, product) with product names.
pub fn products_sold_by_month(cube: &DataFrame, products: &DataFrame) -> Result<DataFrame> {
    let totals = total_sales(cube, &["Month", "ProductID"])?;
    left_join_attribute(&totals, &product_names(products)?, "ProductID", &["ProductName"])
}

/// Products ranked by sales within the given months, weakest first.
///
/// Columns: Month, ProductID, TotalSales, TransactionCount, ProductName.
pub fn underperforming_products(
    cube: &DataFrame,
    products: &DataFrame,
    slow_months: &[u32],
) -> Result<DataFrame> {
    require_columns(cube, &["Month"], "underperforming products")?;

    let in_slow_months = slow_months
        .iter()
        .map(|m| col("Month").cast(DataType::Int64).eq(lit(*m as i64)))
        .reduce(|any, next| any.or(next))
        .unwrap_or_else(|| lit(false));
    let in_slow_months = cube.clone().lazy().filter(in_slow_months).collect()?;

    let mut grouped = rollup(
        &in_slow_months,
        &["Month", "ProductID"],
        &[SALES_MEASURE, COUNT_MEASURE],
    )?;
    grouped.rename(SALES_MEASURE, "TotalSales".into())?;
    grouped.rename(COUNT_MEASURE, "TransactionCount".into())?;

    let names = product_names(products)?;
    let merged = left_join_attribute(&grouped, &names, "ProductID", &["ProductName"])?;
    let sorted = sort_by_numeric(&merged, "TotalSales", true)?;
    info!(
        "Underperforming products analysis covers {} (month, product) pairs",
        sorted.height()
    );
    Ok(sorted)
}

/// Files written by [`write_reports`].
#[derive(Debug, Clone)]
pub struct ReportFiles {
    pub sales_by_weekday: PathBuf,
    pub sales_by_month: PathBuf,
    pub sales_by_month_and_region: PathBuf,
    pub underperforming_products: PathBuf,
    pub least_and_best_months_by_region: PathBuf,
    pub customer_average_transaction_size: PathBuf,
    pub top_product_by_weekday: PathBuf,
    pub most_purchased_products_by_region: PathBuf,
    pub sales_by_customer_contact: PathBuf,
    pub sales_by_contact_method: PathBuf,
    pub products_sold_by_month: PathBuf,
    pub least_profitable_day: Option<(String, f64)>,
}

impl ReportFiles {
    fn in_dir(results_dir: &Path, least_profitable_day: Option<(String, f64)>) -> Self {
        let file = |name: &str| results_dir.join(name);
        Self {
            sales_by_weekday: file("sales_by_day_of_week.csv"),
            sales_by_month: file("sales_by_month.csv"),
            sales_by_month_and_region: file("sales_by_month_and_region.csv"),
            underperforming_products: file("underperforming_products.csv"),
            least_and_best_months_by_region: file(
                "least_and_best_performing_months_by_region.csv",
            ),
            customer_average_transaction_size: file("customer_average_transaction_size.csv"),
            top_product_by_weekday: file("top_product_by_day_of_week.csv"),
            most_purchased_products_by_region: file("most_purchased_products_by_region.csv"),
            sales_by_customer_contact: file("sales_by_customer_contact.csv"),
            sales_by_contact_method: file("sales_by_contact_method.csv"),
            products_sold_by_month: file("products_sold_by_month.csv"),
            least_profitable_day,
        }
    }

    /// Every written file, in report order.
    pub fn paths(&self) -> Vec<PathBuf> {
        vec![
            self.sales_by_weekday.clone(),
            self.sales_by_month.clone(),
            self.sales_by_month_and_region.clone(),
            self.underperforming_products.clone(),
            self.least_and_best_months_by_region.clone(),
            self.customer_average_transaction_size.clone(),
            self.top_product_by_weekday.clone(),
            self.most_purchased_products_by_region.clone(),
            self.sales_by_customer_contact.clone(),
            self.sales_by_contact_method.clone(),
            self.products_sold_by_month.clone(),
        ]
    }
}

/// Run every report and write each as CSV under `results_dir`.
pub fn write_reports(
    cube: &DataFrame,
    products: &DataFrame,
    customers: &DataFrame,
    slow_months: &[u32],
    results_dir: &Path,
) -> Result<ReportFiles> {
    std::fs::create_dir_all(results_dir)?;

    let mut by_weekday = sales_by_weekday(cube)?;
    let least = least_profitable_day(&by_weekday)?;
    if let Some((day, total)) = &least {
        info!("Least profitable day: {} with revenue ${:.2}", day, total);
    }
    let files = ReportFiles::in_dir(results_dir, least);

    write_csv(&mut by_weekday, &files.sales_by_weekday)?;
    write_csv(&mut sales_by_month(cube)?, &files.sales_by_month)?;
    write_csv(
        &mut sales_by_month_and_region(cube)?,
        &files.sales_by_month_and_region,
    )?;
    write_csv(
        &mut underperforming_products(cube, products, slow_months)?,
        &files.underperforming_products,
    )?;
    write_csv(
        &mut least_and_best_months_by_region(cube)?,
        &files.least_and_best_months_by_region,
    )?;
    write_csv(
        &mut customer_average_transaction_size(cube)?,
        &files.customer_average_transaction_size,
    )?;
    write_csv(
        &mut top_product_by_weekday(cube, products)?,
        &files.top_product_by_weekday,
    )?;
    write_csv(
        &mut most_purchased_products_by_region(cube, products)?,
        &files.most_purchased_products_by_region,
    )?;

    let mut by_customer = sales_by_customer_contact(cube, customers)?;
    write_csv(
        &mut sales_by_contact_method(&by_customer)?,
        &files.sales_by_contact_method,
    )?;
    write_csv(&mut by_customer, &files.sales_by_customer_contact)?;

    write_csv(
        &mut products_sold_by_month(cube, products)?,
        &files.products_sold_by_month,
    )?;

    info!("Results saved to {}", results_dir.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cube() -> DataFrame {
        df![
            "DayOfWeek" => ["Monday", "Tuesday", "Monday", "Friday"],
            "Month" => [3i64, 3, 10, 5],
            "Region" => [Some("East"), Some("West"), Some("East"), None],
            "ProductID" => [100i64, 101, 100, 102],
            "CustomerID" => [1i64, 2, 1, 3],
            "SaleAmount_sum" => [30.0, 5.0, 20.0, 2.0],
            "SaleAmount_mean" => [15.0, 5.0, 20.0, 2.0],
            "TransactionID_count" => [2i64, 1, 1, 1],
        ]
        .unwrap()
    }

    fn strings(df: &DataFrame, column: &str) -> Vec<Option<String>> {
        df.column(column)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|s| s.map(str::to_string))
            .collect()
    }

    fn floats(df: &DataFrame, column: &str) -> Vec<Option<f64>> {
        df.column(column).unwrap().f64().unwrap().into_iter().collect()
    }

    #[test]
    fn test_rollup_sums_and_sorts() {
        let out = rollup(&cube(), &["Region"], &["SaleAmount_sum"]).unwrap();
        assert_eq!(
            strings(&out, "Region"),
            vec![Some("East".to_string()), Some("West".to_string()), None]
        );
        assert_eq!(floats(&out, "SaleAmount_sum"), vec![Some(50.0), Some(5.0), Some(2.0)]);
    }

    #[test]
    fn test_sales_by_weekday_and_least_profitable() {
        let by_day = sales_by_weekday(&cube()).unwrap();
        assert_eq!(
            strings(&by_day, "DayOfWeek"),
            vec![
                Some("Friday".to_string()),
                Some("Tuesday".to_string()),
                Some("Monday".to_string())
            ]
        );
        assert_eq!(
            least_profitable_day(&by_day).unwrap(),
            Some(("Friday".to_string(), 2.0))
        );
    }

    #[test]
    fn test_sales_by_month_and_region() {
        let out = sales_by_month_and_region(&cube()).unwrap();
        assert_eq!(out.height(), 4);
        let month: Vec<Option<i64>> = out.column("Month").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(month, vec![Some(3), Some(3), Some(5), Some(10)]);
        assert_eq!(floats(&out, "TotalSales")[0], Some(30.0));
    }

    #[test]
    fn test_underperforming_products() {
        let products = df![
            "ProductID" => [100i64, 101],
            "ProductName" => ["Widget", "Gadget"],
            "UnitPrice" => [1.0, 2.0],
        ]
        .unwrap();

        let out = underperforming_products(&cube(), &products, &[3, 10]).unwrap();
        let names: Vec<&str> = out.get_column_names().iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec!["Month", "ProductID", "TotalSales", "TransactionCount", "ProductName"]
        );
        assert_eq!(floats(&out, "TotalSales"), vec![Some(5.0), Some(20.0), Some(30.0)]);
        assert_eq!(
            strings(&out, "ProductName"),
            vec![
                Some("Gadget".to_string()),
                Some("Widget".to_string()),
                Some("Widget".to_string())
            ]
        );
    }

    fn products() -> DataFrame {
        df![
            "ProductID" => [100i64, 101],
            "ProductName" => ["Widget", "Gadget"],
        ]
        .unwrap()
    }

    fn customers() -> DataFrame {
        df![
            "CustomerID" => [1i64, 2],
            "PreferredContactMethod" => ["Email", "Phone"],
        ]
        .unwrap()
    }

    fn ints(df: &DataFrame, column: &str) -> Vec<Option<i64>> {
        df.column(column)
            .unwrap()
            .cast(&DataType::Int64)
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .collect()
    }

    #[test]
    fn test_least_and_best_months_by_region() {
        let out = least_and_best_months_by_region(&cube()).unwrap();
        let names: Vec<&str> = out.get_column_names().iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Region",
                "LeastPerformingMonth",
                "LeastPerformingSales",
                "BestPerformingMonth",
                "BestPerformingSales"
            ]
        );
        // The null region is left out
        assert_eq!(
            strings(&out, "Region"),
            vec![Some("East".to_string()), Some("West".to_string())]
        );
        assert_eq!(
            strings(&out, "LeastPerformingMonth"),
            vec![Some("October".to_string()), Some("March".to_string())]
        );
        assert_eq!(
            strings(&out, "BestPerformingMonth"),
            vec![Some("March".to_string()), Some("March".to_string())]
        );
        assert_eq!(floats(&out, "LeastPerformingSales"), vec![Some(20.0), Some(5.0)]);
        assert_eq!(floats(&out, "BestPerformingSales"), vec![Some(30.0), Some(5.0)]);
    }

    #[test]
    fn test_customer_average_transaction_size() {
        let out = customer_average_transaction_size(&cube()).unwrap();
        assert_eq!(ints(&out, "CustomerID"), vec![Some(1), Some(2), Some(3)]);
        assert_eq!(floats(&out, "TotalSales"), vec![Some(50.0), Some(5.0), Some(2.0)]);
        assert_eq!(ints(&out, "TransactionCount"), vec![Some(3), Some(1), Some(1)]);

        let average = floats(&out, "AverageTransactionSize");
        assert!((average[0].unwrap() - 50.0 / 3.0).abs() < 1e-12);
        assert_eq!(average[1], Some(5.0));
    }

    #[test]
    fn test_customer_without_counted_transactions_has_null_average() {
        let cube = df![
            "CustomerID" => [1i64],
            "SaleAmount_sum" => [10.0],
            "TransactionID_count" => [0i64],
        ]
        .unwrap();
        let out = customer_average_transaction_size(&cube).unwrap();
        assert_eq!(floats(&out, "AverageTransactionSize"), vec![None]);
    }

    #[test]
    fn test_top_product_by_weekday() {
        let cube = df![
            "DayOfWeek" => ["Monday", "Monday", "Tuesday", "Monday"],
            "ProductID" => [100i64, 101, 100, 100],
            "SaleAmount_sum" => [5.0, 9.0, 3.0, 1.0],
        ]
        .unwrap();
        let out = top_product_by_weekday(&cube, &products()).unwrap();
        assert_eq!(
            strings(&out, "DayOfWeek"),
            vec![Some("Monday".to_string()), Some("Tuesday".to_string())]
        );
        assert_eq!(ints(&out, "ProductID"), vec![Some(101), Some(100)]);
        assert_eq!(floats(&out, "TotalSales"), vec![Some(9.0), Some(3.0)]);
        assert_eq!(
            strings(&out, "ProductName"),
            vec![Some("Gadget".to_string()), Some("Widget".to_string())]
        );
    }

    #[test]
    fn test_most_purchased_products_by_region() {
        let out = most_purchased_products_by_region(&cube(), &products()).unwrap();
        assert_eq!(
            strings(&out, "Region"),
            vec![Some("East".to_string()), Some("West".to_string()), None]
        );
        assert_eq!(
            strings(&out, "ProductName"),
            vec![Some("Widget".to_string()), Some("Gadget".to_string()), None]
        );
        assert_eq!(floats(&out, "TotalSales"), vec![Some(50.0), Some(5.0), Some(2.0)]);
    }

    #[test]
    fn test_sales_by_contact() {
        let by_customer = sales_by_customer_contact(&cube(), &customers()).unwrap();
        assert_eq!(
            strings(&by_customer, "PreferredContactMethod"),
            vec![Some("Email".to_string()), Some("Phone".to_string()), None]
        );

        let by_method = sales_by_contact_method(&by_customer).unwrap();
        assert_eq!(
            strings(&by_method, "PreferredContactMethod"),
            vec![Some("Email".to_string()), Some("Phone".to_string()), None]
        );
        assert_eq!(floats(&by_method, "TotalSales"), vec![Some(50.0), Some(5.0), Some(2.0)]);
    }

    #[test]
    fn test_products_sold_by_month() {
        let out = products_sold_by_month(&cube(), &products()).unwrap();
        assert_eq!(ints(&out, "Month"), vec![Some(3), Some(3), Some(5), Some(10)]);
        assert_eq!(
            strings(&out, "ProductName"),
            vec![
                Some("Widget".to_string()),
                Some("Gadget".to_string()),
                None,
                Some("Widget".to_string())
            ]
        );
    }

    #[test]
    fn test_rollup_skips_nan_measures() {
        let cube = df![
            "Month" => [1i64, 1],
            "SaleAmount_sum" => [4.0, f64::NAN],
        ]
        .unwrap();
        let out = sales_by_month(&cube).unwrap();
        assert_eq!(floats(&out, "TotalSales"), vec![Some(4.0)]);
    }

    #[test]
    fn test_write_reports() {
        let dir = tempfile::TempDir::new().unwrap();
        let files = write_reports(&cube(), &products(), &customers(), &[3], dir.path()).unwrap();
        assert_eq!(files.paths().len(), 11);
        for path in files.paths() {
            assert!(path.exists(), "missing {}", path.display());
        }
        assert_eq!(files.least_profitable_day, Some(("Friday".to_string(), 2.0)));
    }

    #[test]
    fn test_missing_measure_is_schema_mismatch() {
        let df = df!["DayOfWeek" => ["Monday"]].unwrap();
        assert_eq!(
            sales_by_weekday(&df).unwrap_err().error_code(),
            "SCHEMA_MISMATCH"
        );
    }
}
