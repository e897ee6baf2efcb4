//! Fixed warehouse schema.

use crate::error::{PipelineError, Result};
use crate::utils::{has_column, is_integer_dtype, is_numeric_dtype, is_temporal_dtype};
use polars::prelude::*;
use tracing::{info, warn};

/// Declared SQL type of a warehouse column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
    Date,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Text => "TEXT",
            SqlType::Date => "DATE",
        }
    }

    /// Whether a dataset column of `dtype` can be stored without coercion.
    pub fn accepts(&self, dtype: &DataType) -> bool {
        match self {
            SqlType::Integer => is_integer_dtype(dtype),
            SqlType::Real => is_numeric_dtype(dtype),
            SqlType::Text => dtype == &DataType::String,
            SqlType::Date => is_temporal_dtype(dtype) || dtype == &DataType::String,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub primary_key: bool,
}

const fn col(name: &'static str, sql_type: SqlType) -> ColumnDef {
    ColumnDef {
        name,
        sql_type,
        primary_key: false,
    }
}

const fn key(name: &'static str) -> ColumnDef {
    ColumnDef {
        name,
        sql_type: SqlType::Integer,
        primary_key: true,
    }
}

/// `(column, referenced table)`; the referenced column has the same name.
pub type ForeignKey = (&'static str, &'static str);

#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    pub foreign_keys: &'static [ForeignKey],
}

pub const CUSTOMER: TableDef = TableDef {
    name: "customer",
    columns: &[
        key("CustomerID"),
        col("Name", SqlType::Text),
        col("Region", SqlType::Text),
        col("JoinDate", SqlType::Text),
        col("Age", SqlType::Integer),
        col("PreferredContactMethod", SqlType::Text),
    ],
    foreign_keys: &[],
};

pub const PRODUCT: TableDef = TableDef {
    name: "product",
    columns: &[
        key("ProductID"),
        col("ProductName", SqlType::Text),
        col("Category", SqlType::Text),
        col("UnitPrice", SqlType::Real),
        col("StockQuantity", SqlType::Integer),
        col("StoreSection", SqlType::Text),
    ],
    foreign_keys: &[],
};

pub const SALES: TableDef = TableDef {
    name: "sales",
    columns: &[
        key("TransactionID"),
        col("CustomerID", SqlType::Integer),
        col("ProductID", SqlType::Integer),
        col("SaleAmount", SqlType::Real),
        col("SaleDate", SqlType::Date),
        col("CampaignID", SqlType::Integer),
        col("DiscountPercent", SqlType::Integer),
        col("PaymentType", SqlType::Text),
        col("StoreID", SqlType::Text),
    ],
    foreign_keys: &[("CustomerID", "customer"), ("ProductID", "product")],
};

/// The three warehouse tables, in load order.
pub const TABLES: [&TableDef; 3] = [&CUSTOMER, &PRODUCT, &SALES];

/// Whether `name` is one of the warehouse tables.
pub fn is_schema_table(name: &str) -> bool {
    TABLES.iter().any(|t| t.name == name)
}

/// Quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn create_sql(&self) -> String {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut line = format!("{} {}", c.name, c.sql_type.as_sql());
                if c.primary_key {
                    line.push_str(" PRIMARY KEY");
                }
                line
            })
            .collect();
        for (column, table) in self.foreign_keys {
            lines.push(format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                column, table, column
            ));
        }
        format!("CREATE TABLE {} (\n    {}\n)", self.name, lines.join(",\n    "))
    }

    /// Keep only schema columns (in schema order) and check their types.
    ///
    /// A primary key that is not integer typed is a
    /// [`PipelineError::SchemaMismatch`]; other type differences are left
    /// to SQLite's type affinity and logged.
    pub fn conform(&self, df: &DataFrame) -> Result<DataFrame> {
        let dropped: Vec<String> = df
            .get_column_names()
            .into_iter()
            .filter(|name| self.column(name.as_str()).is_none())
            .map(|name| name.to_string())
            .collect();
        if !dropped.is_empty() {
            info!(
                "Dropping non-schema columns {:?} before loading '{}'",
                dropped, self.name
            );
        }

        let mut kept: Vec<Column> = Vec::with_capacity(self.columns.len());
        for def in self.columns {
            if !has_column(df, def.name) {
                if def.primary_key {
                    return Err(PipelineError::missing_column(
                        def.name,
                        format!("table '{}'", self.name),
                    ));
                }
                warn!(
                    "Column '{}' missing for table '{}'; it will be stored as NULL",
                    def.name, self.name
                );
                continue;
            }

            let column = df.column(def.name)?;
            if !def.sql_type.accepts(column.dtype()) {
                if def.primary_key {
                    return Err(PipelineError::SchemaMismatch {
                        column: def.name.to_string(),
                        reason: format!(
                            "primary key of '{}' must be integer typed, found {}",
                            self.name,
                            column.dtype()
                        ),
                    });
                }
                warn!(
                    "Column '{}.{}' is declared {} but the dataset holds {}",
                    self.name,
                    def.name,
                    def.sql_type.as_sql(),
                    column.dtype()
                );
            }
            kept.push(column.clone());
        }

        Ok(DataFrame::new(kept)?)
    }
}
