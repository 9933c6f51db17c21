use std::collections::BTreeMap;

use itertools::Itertools as _;

use crate::errinvalid;
use crate::error::Result;
use crate::sql::types::{Expression, Row, Rows, Value};

/// An aggregate function and the expression it aggregates.
#[derive(Clone, Debug, PartialEq)]
pub enum Aggregate {
    Average(Expression),
    Count(Expression),
    Max(Expression),
    Min(Expression),
    Sum(Expression),
}

impl Aggregate {
    /// Creates an aggregate from a lowercase function name.
    pub fn new(name: &str, expr: Expression) -> Result<Self> {
        Ok(match name {
            "avg" => Self::Average(expr),
            "count" => Self::Count(expr),
            "max" => Self::Max(expr),
            "min" => Self::Min(expr),
            "sum" => Self::Sum(expr),
            name => return errinvalid!("unknown aggregate function {name}"),
        })
    }

    /// The aggregated expression.
    fn expr(&self) -> &Expression {
        match self {
            Self::Average(expr)
            | Self::Count(expr)
            | Self::Max(expr)
            | Self::Min(expr)
            | Self::Sum(expr) => expr,
        }
    }
}

/// Computes bucketed aggregates for input rows. For example, this query would
/// compute COUNT and SUM aggregates bucketed by category and brand:
///
/// SELECT COUNT(*), SUM(price) FROM products GROUP BY category, brand
///
/// Output rows contain the GROUP BY values followed by the aggregate values.
pub struct Aggregator {
    /// GROUP BY expressions.
    group_by: Vec<Expression>,
    /// Aggregates to compute.
    aggregates: Vec<Aggregate>,
    /// Accumulators indexed by group_by bucket.
    buckets: BTreeMap<Vec<Value>, Vec<Accumulator>>,
}

impl Aggregator {
    /// Creates a new aggregator for the given GROUP BY buckets and aggregates.
    pub fn new(group_by: Vec<Expression>, aggregates: Vec<Aggregate>) -> Self {
        Self { group_by, aggregates, buckets: BTreeMap::new() }
    }

    /// Adds a row to the aggregator.
    pub fn add(&mut self, row: &Row) -> Result<()> {
        // Compute the bucket values.
        let bucket = self.group_by.iter().map(|expr| expr.evaluate(row)).try_collect()?;

        // Look up the bucket accumulators, or create a new bucket.
        let accumulators = self
            .buckets
            .entry(bucket)
            .or_insert_with(|| self.aggregates.iter().map(Accumulator::new).collect())
            .iter_mut();

        // Accumulate the evaluated values.
        let exprs = self.aggregates.iter().map(|a| a.expr());
        for (accumulator, expr) in accumulators.zip_eq(exprs) {
            accumulator.add(expr.evaluate(row)?)?;
        }
        Ok(())
    }

    /// Adds rows to the aggregator.
    pub fn add_rows(&mut self, rows: Rows) -> Result<()> {
        for row in rows {
            self.add(&row?)?;
        }
        Ok(())
    }

    /// Returns a row iterator over the aggregate result.
    pub fn into_rows(self) -> Rows {
        // If there were no rows and no group_by expressions, return a row of
        // empty accumulators (e.g. SELECT COUNT(*) FROM t WHERE FALSE).
        if self.buckets.is_empty() && self.group_by.is_empty() {
            let result =
                self.aggregates.iter().map(Accumulator::new).map(|acc| acc.value()).try_collect();
            return Box::new(std::iter::once(result));
        }

        // Emit the group_by and aggregate values for each bucket.
        let buckets = self.buckets.into_iter().collect_vec();
        Box::new(buckets.into_iter().map(|(bucket, accumulators)| {
            bucket
                .into_iter()
                .map(Ok)
                .chain(accumulators.into_iter().map(|acc| acc.value()))
                .collect()
        }))
    }
}

/// Accumulates aggregate values.
#[derive(Clone)]
enum Accumulator {
    Average { count: i64, sum: Value },
    Count(i64),
    Max(Option<Value>),
    Min(Option<Value>),
    Sum(Option<Value>),
}

impl Accumulator {
    /// Creates a new accumulator from an aggregate kind.
    fn new(aggregate: &Aggregate) -> Self {
        match aggregate {
            Aggregate::Average(_) => Self::Average { count: 0, sum: Value::Integer(0) },
            Aggregate::Count(_) => Self::Count(0),
            Aggregate::Max(_) => Self::Max(None),
            Aggregate::Min(_) => Self::Min(None),
            Aggregate::Sum(_) => Self::Sum(None),
        }
    }

    /// Adds a value to the accumulator.
    fn add(&mut self, value: Value) -> Result<()> {
        // Aggregates ignore NULL values.
        if value == Value::Null {
            return Ok(());
        }
        match self {
            Self::Average { sum, count } => (*sum, *count) = (sum.checked_add(&value)?, *count + 1),
            Self::Count(count) => *count += 1,
            Self::Max(max @ None) => *max = Some(value),
            Self::Max(Some(max)) if value > *max => *max = value,
            Self::Max(Some(_)) => {}
            Self::Min(min @ None) => *min = Some(value),
            Self::Min(Some(min)) if value < *min => *min = value,
            Self::Min(Some(_)) => {}
            Self::Sum(sum @ None) => *sum = Some(Value::Integer(0).checked_add(&value)?),
            Self::Sum(Some(sum)) => *sum = sum.checked_add(&value)?,
        }
        Ok(())
    }

    /// Returns the aggregate value. Averages are always floats.
    fn value(self) -> Result<Value> {
        Ok(match self {
            Self::Average { count: 0, sum: _ } => Value::Null,
            Self::Average { count, sum } => {
                let sum = match sum {
                    Value::Integer(i) => Value::Float(i as f64),
                    sum => sum,
                };
                sum.checked_div(&Value::Float(count as f64))?
            }
            Self::Count(count) => count.into(),
            Self::Max(Some(value)) | Self::Min(Some(value)) | Self::Sum(Some(value)) => value,
            Self::Max(None) | Self::Min(None) | Self::Sum(None) => Value::Null,
        })
    }
}
