use serde::{Deserialize, Serialize};

use super::{DataType, Row, Value};
use crate::error::Result;
use crate::sql::parser::format_ident;
use crate::{errconstraint, errschema};

/// A table schema. Table and column names are matched case-insensitively,
/// but keep the case they were declared with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// The table name.
    pub name: String,
    /// The table columns.
    pub columns: Vec<Column>,
}

/// A table column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column datatype.
    pub datatype: DataType,
    /// Whether the column is part of the primary key. Several columns form a
    /// composite key.
    pub primary_key: bool,
    /// Whether the column allows null values.
    pub nullable: bool,
    /// The column's default value. If None, the user must specify an explicit
    /// value for nullable columns too.
    pub default: Option<Value>,
    /// Whether the column should only take unique values (ignoring NULLs).
    pub unique: bool,
}

impl Column {
    /// Creates a nullable column with a NULL default.
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Self {
            name: name.into(),
            datatype,
            primary_key: false,
            nullable: true,
            default: Some(Value::Null),
            unique: false,
        }
    }

    /// Makes the column (part of) the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self.default = None;
        self
    }

    /// Makes the column NOT NULL, without a default.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        if self.default == Some(Value::Null) {
            self.default = None;
        }
        self
    }

    /// Makes the column unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the column default.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

impl Table {
    /// Creates a new table schema.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self { name: name.into(), columns }
    }

    /// Validates the table schema.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return errschema!("table name can't be empty");
        }
        if self.columns.is_empty() {
            return errschema!("table {} has no columns", self.name);
        }
        for (i, column) in self.columns.iter().enumerate() {
            if column.name.is_empty() {
                return errschema!("table {} has a column without a name", self.name);
            }
            if self.columns[..i].iter().any(|c| c.name.eq_ignore_ascii_case(&column.name)) {
                return errschema!("duplicate column {} in table {}", column.name, self.name);
            }
            if column.primary_key && column.nullable {
                return errschema!("primary key column {} can't be nullable", column.name);
            }
            match &column.default {
                Some(Value::Null) if !column.nullable => {
                    return errschema!("invalid NULL default for NOT NULL column {}", column.name);
                }
                Some(value) => {
                    value.clone().coerce(column.datatype)?;
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Returns the index of the named column.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        match self.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name)) {
            Some(index) => Ok(index),
            None => errschema!("unknown column {name} in table {}", self.name),
        }
    }

    /// Returns the column sets that must be unique across rows: the primary
    /// key (if any), then each unique column.
    pub fn unique_keys(&self) -> Vec<Vec<usize>> {
        let primary_key: Vec<usize> = (0..self.columns.len())
            .filter(|i| self.columns[*i].primary_key)
            .collect();
        let unique = (0..self.columns.len())
            .filter(|i| self.columns[*i].unique && !self.columns[*i].primary_key)
            .map(|i| vec![i]);
        Some(primary_key).filter(|pk| !pk.is_empty()).into_iter().chain(unique).collect()
    }

    /// Coerces a complete row to the column types, and checks NOT NULL
    /// constraints.
    pub fn normalize_row(&self, row: Row) -> Result<Row> {
        if row.len() != self.columns.len() {
            return errschema!(
                "row has {} values, table {} has {} columns",
                row.len(),
                self.name,
                self.columns.len()
            );
        }
        self.columns
            .iter()
            .zip(row)
            .map(|(column, value)| match value.coerce(column.datatype)? {
                Value::Null if !column.nullable => {
                    errconstraint!("NULL value not allowed for column {}", column.name)
                }
                value => Ok(value),
            })
            .collect()
    }

    /// Checks that a row doesn't collide with any other row on a unique key.
    /// NULLs never collide. Skips the row at index `skip`, if given.
    pub fn check_unique(&self, rows: &[Row], row: &Row, skip: Option<usize>) -> Result<()> {
        for key in self.unique_keys() {
            if key.iter().any(|&i| row[i] == Value::Null) {
                continue;
            }
            let collides = rows
                .iter()
                .enumerate()
                .filter(|(i, _)| Some(*i) != skip)
                .any(|(_, other)| key.iter().all(|&i| other[i] == row[i]));
            if collides {
                let values = key.iter().map(|&i| row[i].to_string()).collect::<Vec<_>>();
                return errconstraint!(
                    "duplicate key ({}) in table {}",
                    values.join(", "),
                    self.name
                );
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "CREATE TABLE {} (", format_ident(&self.name))?;
        for (i, column) in self.columns.iter().enumerate() {
            write!(f, "  {} {}", format_ident(&column.name), column.datatype)?;
            if column.primary_key {
                write!(f, " PRIMARY KEY")?;
            } else if !column.nullable {
                write!(f, " NOT NULL")?;
            }
            if let Some(default) = &column.default {
                match default {
                    Value::Null => {}
                    Value::String(s) => write!(f, " DEFAULT '{}'", s.replace('\'', "''"))?,
                    value => write!(f, " DEFAULT {value}")?,
                }
            }
            if column.unique {
                write!(f, " UNIQUE")?;
            }
            if i < self.columns.len() - 1 {
                write!(f, ",")?;
            }
            writeln!(f)?;
        }
        write!(f, ")")
    }
}
