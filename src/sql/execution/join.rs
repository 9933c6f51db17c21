use crate::errtype;
use crate::error::Result;
use crate::sql::types::{Expression, Row, Rows, Value};

/// A nested loop join. Iterates over the outer rows and, for each, over all
/// inner rows, emitting the combined rows that satisfy the predicate. The
/// inner rows are buffered in memory.
///
/// For outer joins, outer rows without any match are emitted once, padded with
/// NULLs for the inner columns. RIGHT joins use the right side as the outer
/// side, but the combined rows always have the left columns first.
pub struct NestedLoopJoiner {
    /// The outer rows.
    outer: Rows,
    /// The current outer row, if any.
    outer_row: Option<Row>,
    /// Whether the current outer row has matched an inner row.
    matched: bool,
    /// The inner rows.
    inner: Vec<Row>,
    /// The next inner row index for the current outer row.
    inner_index: usize,
    /// The width of inner rows, for NULL padding.
    inner_width: usize,
    /// The join predicate, if any, evaluated against combined rows.
    predicate: Option<Expression>,
    /// Whether to emit unmatched outer rows padded with NULLs.
    pad: bool,
    /// Whether the outer side is the right side.
    flip: bool,
}

impl NestedLoopJoiner {
    /// Creates a new nested loop joiner.
    pub fn new(
        mut outer: Rows,
        inner: Vec<Row>,
        inner_width: usize,
        predicate: Option<Expression>,
        pad: bool,
        flip: bool,
    ) -> Result<Self> {
        let outer_row = outer.next().transpose()?;
        Ok(Self {
            outer,
            outer_row,
            matched: false,
            inner,
            inner_index: 0,
            inner_width,
            predicate,
            pad,
            flip,
        })
    }

    /// Returns the next joined row, if any.
    fn try_next(&mut self) -> Result<Option<Row>> {
        while let Some(outer_row) = &self.outer_row {
            while let Some(inner_row) = self.inner.get(self.inner_index) {
                self.inner_index += 1;
                let row = combine(outer_row, inner_row.iter().cloned(), self.flip);
                let matches = match &self.predicate {
                    Some(predicate) => match predicate.evaluate(&row)? {
                        Value::Boolean(b) => b,
                        Value::Null => false,
                        value => return errtype!("join predicate returned {value}, expected boolean"),
                    },
                    None => true,
                };
                if matches {
                    self.matched = true;
                    return Ok(Some(row));
                }
            }

            // The outer row is exhausted, pad it if it didn't match.
            let padded = (self.pad && !self.matched).then(|| {
                combine(outer_row, std::iter::repeat_n(Value::Null, self.inner_width), self.flip)
            });
            self.outer_row = self.outer.next().transpose()?;
            self.inner_index = 0;
            self.matched = false;
            if padded.is_some() {
                return Ok(padded);
            }
        }
        Ok(None)
    }
}

/// Combines an outer and an inner row, in left-right order.
fn combine(outer: &Row, inner: impl Iterator<Item = Value>, flip: bool) -> Row {
    match flip {
        false => outer.iter().cloned().chain(inner).collect(),
        true => inner.chain(outer.iter().cloned()).collect(),
    }
}

impl Iterator for NestedLoopJoiner {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.try_next().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools as _;
    use pretty_assertions::assert_eq;

    fn rows(rows: Vec<Row>) -> Rows {
        Box::new(rows.into_iter().map(Ok))
    }

    /// Joins left (id) and right (id, name) rows on left.id = right.id.
    fn join(pad: bool, flip: bool) -> Result<Vec<Row>> {
        let left = vec![vec![1.into()], vec![2.into()]];
        let right = vec![vec![1.into(), "a".into()], vec![3.into(), "c".into()]];
        let predicate =
            Expression::Equal(Expression::Column(0).into(), Expression::Column(1).into());
        let joiner = match flip {
            false => NestedLoopJoiner::new(rows(left), right, 2, Some(predicate), pad, false)?,
            true => NestedLoopJoiner::new(rows(right), left, 1, Some(predicate), pad, true)?,
        };
        joiner.try_collect()
    }

    #[test]
    fn inner() -> Result<()> {
        assert_eq!(join(false, false)?, vec![vec![1.into(), 1.into(), "a".into()]]);
        Ok(())
    }

    #[test]
    fn left() -> Result<()> {
        assert_eq!(
            join(true, false)?,
            vec![
                vec![1.into(), 1.into(), "a".into()],
                vec![2.into(), Value::Null, Value::Null],
            ]
        );
        Ok(())
    }

    #[test]
    fn right() -> Result<()> {
        assert_eq!(
            join(true, true)?,
            vec![
                vec![1.into(), 1.into(), "a".into()],
                vec![Value::Null, 3.into(), "c".into()],
            ]
        );
        Ok(())
    }

    #[test]
    fn cross() -> Result<()> {
        let joiner = NestedLoopJoiner::new(
            rows(vec![vec![1.into()], vec![2.into()]]),
            vec![vec!["a".into()], vec!["b".into()]],
            1,
            None,
            false,
            false,
        )?;
        let result: Vec<Row> = joiner.try_collect()?;
        assert_eq!(result.len(), 4);
        assert_eq!(result[1], vec![1.into(), "b".into()]);
        Ok(())
    }
}
