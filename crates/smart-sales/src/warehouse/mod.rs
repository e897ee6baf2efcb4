//! SQLite warehouse with a fixed three-table schema.
//!
//! [`WarehouseLoader`] replaces the whole warehouse content on every load,
//! so loading identical inputs twice leaves identical tables behind.

pub mod schema;

use crate::cleaner::date_from_days;
use crate::error::{PipelineError, Result};
use crate::types::LoadSummary;
use polars::prelude::*;
use rusqlite::types::Value;
use rusqlite::{Connection, Transaction, params_from_iter};
use schema::{TABLES, TableDef, is_schema_table, quote_ident};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// An open warehouse file.
///
/// The connection closes when the value is dropped.
#[derive(Debug)]
pub struct Warehouse {
    conn: Connection,
    path: Option<PathBuf>,
}

static_assertions::assert_impl_all!(Warehouse: Send);

impl Warehouse {
    /// Open (or create) the warehouse at `path`, creating its directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| PipelineError::warehouse(format!("open {}", path.display()), e))?;
        advisory_foreign_keys(&conn)?;
        debug!("Opened warehouse at {}", path.display());
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// An in-memory warehouse.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PipelineError::warehouse("open in-memory database", e))?;
        advisory_foreign_keys(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// Location of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Names of all user tables, sorted.
    pub fn table_names(&self) -> Result<Vec<String>> {
        list_tables(&self.conn)
    }

    /// Number of rows in one table.
    pub fn row_count(&self, table: &str) -> Result<usize> {
        count_rows(&self.conn, table)
    }

    /// Every row of one table.
    pub fn read_table(&self, table: &str) -> Result<DataFrame> {
        self.query(&format!("SELECT * FROM {}", quote_ident(table)))
    }

    /// Run a query and collect its result as a DataFrame.
    ///
    /// A column whose values are all integers becomes `Int64`; all integers
    /// or reals, `Float64`; anything else, `String`. NULLs stay null.
    pub fn query(&self, sql: &str) -> Result<DataFrame> {
        let op = |e| PipelineError::warehouse(format!("query `{}`", sql), e);

        let mut stmt = self.conn.prepare(sql).map_err(op)?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let width = names.len();

        let mut cells: Vec<Vec<Value>> = vec![Vec::new(); width];
        let mut rows = stmt.query([]).map_err(op)?;
        while let Some(row) = rows.next().map_err(op)? {
            for (i, column) in cells.iter_mut().enumerate() {
                column.push(row.get::<_, Value>(i).map_err(op)?);
            }
        }

        let columns: Vec<Column> = names
            .iter()
            .zip(cells)
            .map(|(name, values)| values_to_series(name, values).into())
            .collect();
        Ok(DataFrame::new(columns)?)
    }

    fn transaction(&mut self) -> Result<Transaction<'_>> {
        self.conn
            .transaction()
            .map_err(|e| PipelineError::warehouse("begin transaction", e))
    }
}

/// Declared foreign keys are documentation only: a sale may reference a
/// customer or product that is not loaded, and tables are dropped in any order.
fn advisory_foreign_keys(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", false)
        .map_err(|e| PipelineError::warehouse("disable foreign keys", e))
}

fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let op = |e| PipelineError::warehouse("list tables", e);
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .map_err(op)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(op)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(op)?;
    Ok(names)
}

fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    let count: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )
        .map_err(|e| PipelineError::warehouse(format!("count rows of '{}'", table), e))?;
    Ok(count as usize)
}

fn values_to_series(name: &str, values: Vec<Value>) -> Series {
    let all_integer = values
        .iter()
        .all(|v| matches!(v, Value::Integer(_) | Value::Null));
    let all_numeric = values
        .iter()
        .all(|v| matches!(v, Value::Integer(_) | Value::Real(_) | Value::Null));

    if all_integer {
        let ints: Vec<Option<i64>> = values
            .into_iter()
            .map(|v| match v {
                Value::Integer(i) => Some(i),
                _ => None,
            })
            .collect();
        Series::new(name.into(), ints)
    } else if all_numeric {
        let floats: Vec<Option<f64>> = values
            .into_iter()
            .map(|v| match v {
                Value::Integer(i) => Some(i as f64),
                Value::Real(f) => Some(f),
                _ => None,
            })
            .collect();
        Series::new(name.into(), floats)
    } else {
        let text: Vec<Option<String>> = values
            .into_iter()
            .map(|v| match v {
                Value::Null => None,
                Value::Integer(i) => Some(i.to_string()),
                Value::Real(f) => Some(f.to_string()),
                Value::Text(s) => Some(s),
                Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
            })
            .collect();
        Series::new(name.into(), text)
    }
}

/// SQLite value for one dataset cell. Dates are stored as `YYYY-MM-DD`.
fn sql_value(value: AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Integer(b as i64),
        AnyValue::Int8(v) => Value::Integer(v as i64),
        AnyValue::Int16(v) => Value::Integer(v as i64),
        AnyValue::Int32(v) => Value::Integer(v as i64),
        AnyValue::Int64(v) => Value::Integer(v),
        AnyValue::UInt8(v) => Value::Integer(v as i64),
        AnyValue::UInt16(v) => Value::Integer(v as i64),
        AnyValue::UInt32(v) => Value::Integer(v as i64),
        AnyValue::UInt64(v) => match i64::try_from(v) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Real(v as f64),
        },
        AnyValue::Float32(v) => Value::Real(v as f64),
        AnyValue::Float64(v) => Value::Real(v),
        AnyValue::Date(days) => match date_from_days(days) {
            Some(date) => Value::Text(date.format("%Y-%m-%d").to_string()),
            None => Value::Null,
        },
        AnyValue::String(s) => Value::Text(s.to_string()),
        AnyValue::StringOwned(s) => Value::Text(s.to_string()),
        other => Value::Text(other.to_string()),
    }
}

/// Loads cleaned datasets into the warehouse.
///
/// # Example
///
/// ```rust,ignore
/// use smart_sales::WarehouseLoader;
///
/// let summary = WarehouseLoader::new("data/dw/smart_sales.db")
///     .load(&customers, &products, &sales)?;
/// println!("{} sales rows loaded", summary.sales_rows);
/// ```
#[derive(Debug, Clone)]
pub struct WarehouseLoader {
    path: PathBuf,
}

impl WarehouseLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the warehouse content with the three datasets.
    ///
    /// Datasets are conformed to the schema before the store is touched.
    /// All statements run in one transaction: on any error it is rolled
    /// back and the connection is closed before the error is returned.
    pub fn load(
        &self,
        customers: &DataFrame,
        products: &DataFrame,
        sales: &DataFrame,
    ) -> Result<LoadSummary> {
        info!("Loading warehouse at {}", self.path.display());
        let mut warehouse = Warehouse::open(&self.path)?;
        let result = load_into(&mut warehouse, customers, products, sales);
        if let Err(e) = &result {
            error!("Warehouse load failed: {}", e);
        }
        result
    }
}

/// Run one full load against an already open warehouse.
pub fn load_into(
    warehouse: &mut Warehouse,
    customers: &DataFrame,
    products: &DataFrame,
    sales: &DataFrame,
) -> Result<LoadSummary> {
    let datasets = [customers, products, sales];
    let mut conformed = Vec::with_capacity(TABLES.len());
    for (table, df) in TABLES.iter().zip(datasets) {
        conformed.push(table.conform(df)?);
    }

    let tx = warehouse.transaction()?;

    info!("Dropping unwanted tables...");
    let mut dropped_tables = Vec::new();
    for name in list_tables(&tx)? {
        if !is_schema_table(&name) {
            info!("Dropping table: {}", name);
            exec(&tx, &format!("DROP TABLE IF EXISTS {}", quote_ident(&name)))?;
            dropped_tables.push(name);
        }
    }

    info!("Creating schema...");
    for table in TABLES {
        exec(&tx, &format!("DROP TABLE IF EXISTS {}", table.name))?;
    }
    for table in TABLES {
        exec(&tx, &table.create_sql())?;
    }
    for table in TABLES {
        exec(&tx, &format!("DELETE FROM {}", table.name))?;
    }

    let mut counts = Vec::with_capacity(TABLES.len());
    for (table, df) in TABLES.iter().zip(&conformed) {
        insert_rows(&tx, table, df)?;
        counts.push(count_rows(&tx, table.name)?);
    }

    tx.commit()
        .map_err(|e| PipelineError::warehouse("commit", e))?;

    let summary = LoadSummary {
        customer_rows: counts[0],
        product_rows: counts[1],
        sales_rows: counts[2],
        dropped_tables,
    };
    info!(
        "Warehouse loaded: {} customers, {} products, {} sales",
        summary.customer_rows, summary.product_rows, summary.sales_rows
    );
    Ok(summary)
}

fn exec(tx: &Transaction<'_>, sql: &str) -> Result<()> {
    tx.execute(sql, [])
        .map_err(|e| PipelineError::warehouse(format!("execute `{}`", sql), e))?;
    Ok(())
}

fn insert_rows(tx: &Transaction<'_>, table: &TableDef, df: &DataFrame) -> Result<()> {
    let op = |e| PipelineError::warehouse(format!("insert into '{}'", table.name), e);

    let columns: Vec<&Series> = df
        .get_columns()
        .iter()
        .map(|c| c.as_materialized_series())
        .collect();
    let names: Vec<String> = columns.iter().map(|s| quote_ident(s.name())).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name,
        names.join(", "),
        placeholders.join(", ")
    );

    debug!("Inserting {} rows into '{}'", df.height(), table.name);
    let mut stmt = tx.prepare(&sql).map_err(op)?;
    for row in 0..df.height() {
        let mut values = Vec::with_capacity(columns.len());
        for series in &columns {
            values.push(sql_value(series.get(row)?));
        }
        stmt.execute(params_from_iter(values)).map_err(op)?;
    }
    Ok(())
}
