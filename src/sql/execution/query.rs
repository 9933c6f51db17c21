use std::cmp::Ordering;

use itertools::Itertools as _;

use super::aggregator::{Aggregate, Aggregator};
use super::executor::{Executor, column_name, distinct, matches};
use super::join::NestedLoopJoiner;
use super::scope::{Label, Outer, Scope};
use crate::error::Result;
use crate::sql::parser::ast;
use crate::sql::types::{Expression, Row, Rows, Value};
use crate::storage::Memory;
use crate::{errinvalid, errschema, errunsupported};

/// A relation visible to a query: a table snapshot or a CTE result.
#[derive(Clone)]
struct Relation {
    columns: Vec<String>,
    rows: Vec<Row>,
}

/// The relations visible to a query. CTEs shadow tables of the same name.
/// In a subquery, the context also carries the enclosing query's row.
#[derive(Clone)]
struct Context<'a> {
    store: &'a Memory,
    ctes: &'a [(String, Relation)],
    outer: Option<Outer>,
}

impl Context<'_> {
    /// Looks up a relation by name, taking a snapshot of table rows. FROM dual
    /// is a single row without columns, unless a dual table exists.
    fn relation(&self, name: &str) -> Result<Relation> {
        if let Some((_, relation)) = self.ctes.iter().rev().find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            return Ok(relation.clone());
        }
        match self.store.get_table(name) {
            Some(table) => Ok(Relation {
                columns: table.columns.iter().map(|c| c.name.clone()).collect(),
                rows: self.store.scan(name)?.to_vec(),
            }),
            None if name.eq_ignore_ascii_case("dual") => {
                Ok(Relation { columns: Vec::new(), rows: vec![Vec::new()] })
            }
            None => errschema!("table {name} does not exist"),
        }
    }
}

impl Executor {
    /// SELECT: evaluates the CTEs in order, then the query. The result rows
    /// own their data, so they don't borrow the store.
    pub(super) fn select(
        &self,
        mut select: ast::Select,
        store: &Memory,
    ) -> Result<(Vec<String>, Rows)> {
        let mut ctes = Vec::new();
        for cte in std::mem::take(&mut select.ctes) {
            // Recursion is only parsed, never evaluated.
            if cte.recursive {
                return errunsupported!(self.dialect(), "evaluation of recursive CTE {}", cte.name);
            }
            let (columns, rows) =
                self.query((*cte.body).clone(), &Context { store, ctes: &ctes, outer: None })?;
            let relation = Self::rename_cte_columns(&cte, Relation { columns, rows: rows.try_collect()? })?;
            ctes.push((cte.name, relation));
        }
        self.query(select, &Context { store, ctes: &ctes, outer: None })
    }

    /// Evaluates which rows of a table match an optional UPDATE or DELETE
    /// predicate, which may contain subqueries.
    pub(super) fn predicate_mask(
        &self,
        predicate: Option<&ast::Expression>,
        scope: &Scope,
        rows: &[Row],
        store: &Memory,
    ) -> Result<Vec<bool>> {
        self.mask(predicate, scope, rows, &Context { store, ctes: &[], outer: None })
    }

    /// Evaluates a MERGE source: a table or a derived table. Returns its scope,
    /// qualified by the table name or alias, and its rows.
    pub(super) fn merge_source(
        &self,
        source: &ast::MergeSource,
        store: &Memory,
    ) -> Result<(Scope, Vec<Row>)> {
        let (label, columns, rows) = match source {
            ast::MergeSource::Table(table) => {
                let relation = Context { store, ctes: &[], outer: None }.relation(&table.name)?;
                (table.label(), relation.columns, relation.rows)
            }
            ast::MergeSource::Select { select, alias } => {
                let (columns, rows) = self.select((**select).clone(), store)?;
                (alias.as_str(), columns, rows.try_collect()?)
            }
        };
        Ok((Scope::from_columns(label, columns.iter().map(String::as_str)), rows))
    }

    /// Applies a CTE's column list, if any, to its result.
    fn rename_cte_columns(
        cte: &ast::CommonTableExpression,
        mut relation: Relation,
    ) -> Result<Relation> {
        if cte.columns.is_empty() {
            return Ok(relation);
        }
        if cte.columns.len() != relation.columns.len() {
            return errschema!(
                "CTE {} has {} columns, but {} column names were given",
                cte.name,
                relation.columns.len(),
                cte.columns.len()
            );
        }
        relation.columns = cte.columns.clone();
        Ok(relation)
    }

    /// Evaluates a query without CTEs: its UNION branches, ORDER BY, OFFSET,
    /// and LIMIT.
    fn query(&self, mut select: ast::Select, context: &Context) -> Result<(Vec<String>, Rows)> {
        if !select.ctes.is_empty() {
            return errinvalid!("nested WITH clauses are not supported");
        }
        let unions = std::mem::take(&mut select.unions);
        let order_by = std::mem::take(&mut select.order_by);
        let offset = Self::row_count(select.offset.take(), "OFFSET")?;
        let limit = Self::row_count(select.limit.take(), "LIMIT")?;

        let (columns, mut rows) = if unions.is_empty() {
            self.query_core(select, &order_by, context)?
        } else {
            let (columns, rows) = self.query_core(select, &[], context)?;
            let mut rows: Vec<Row> = rows.try_collect()?;
            for union in unions {
                let (branch_columns, branch_rows) = self.query(union.select, context)?;
                if branch_columns.len() != columns.len() {
                    return errschema!("UNION branches have different column counts");
                }
                for row in branch_rows {
                    rows.push(row?);
                }
                if !union.all {
                    rows = distinct(rows);
                }
            }
            // ORDER BY applies to the combined result, so it can only refer
            // to result columns.
            let keys = order_by
                .iter()
                .map(|(expr, direction)| {
                    let index = match Self::output_position(expr, &columns)? {
                        Some(index) => index,
                        None => return errschema!("ORDER BY of a UNION must use a result column"),
                    };
                    Ok((index, *direction))
                })
                .collect::<Result<Vec<_>>>()?;
            let rows = Self::order(Box::new(rows.into_iter().map(Ok)), &keys)?;
            (columns, Box::new(rows.into_iter().map(Ok)) as Rows)
        };

        if let Some(offset) = offset {
            rows = Box::new(rows.skip(offset));
        }
        if let Some(limit) = limit {
            rows = Box::new(rows.take(limit));
        }
        Ok((columns, rows))
    }

    /// Evaluates a single query: FROM/JOIN, WHERE, GROUP BY, HAVING,
    /// projection, ORDER BY, and DISTINCT.
    fn query_core(
        &self,
        select: ast::Select,
        order_by: &[(ast::Expression, ast::Direction)],
        context: &Context,
    ) -> Result<(Vec<String>, Rows)> {
        // FROM and JOIN. A query without FROM evaluates against a single empty
        // row.
        let (mut scope, mut rows): (Scope, Rows) = match &select.source {
            Some(source) => {
                let relation = context.relation(&source.name)?;
                let scope =
                    Scope::from_columns(source.label(), relation.columns.iter().map(String::as_str));
                (scope, Box::new(relation.rows.into_iter().map(Ok)))
            }
            None => (Scope::new(), Box::new(std::iter::once(Ok(Vec::new())))),
        };
        scope = scope.with_outer(context.outer.clone());
        for join in &select.joins {
            let relation = context.relation(&join.table.name)?;
            let right =
                Scope::from_columns(join.table.label(), relation.columns.iter().map(String::as_str));
            let (left_width, right_width) = (scope.len(), right.len());
            scope.merge(right)?;
            let predicate = join.predicate.as_ref().map(|p| scope.resolve(p)).transpose()?;
            rows = match join.kind {
                ast::JoinType::Right => Box::new(NestedLoopJoiner::new(
                    Box::new(relation.rows.into_iter().map(Ok)),
                    rows.try_collect()?,
                    left_width,
                    predicate,
                    true,
                    true,
                )?),
                kind => Box::new(NestedLoopJoiner::new(
                    rows,
                    relation.rows,
                    right_width,
                    predicate,
                    kind == ast::JoinType::Left,
                    false,
                )?),
            };
        }

        // WHERE. Subqueries are evaluated per row, so the rows are
        // materialized first.
        if let Some(predicate) = &select.predicate {
            if predicate.contains_subquery() {
                let input: Vec<Row> = rows.try_collect()?;
                let mask = self.mask(Some(predicate), &scope, &input, context)?;
                let filtered = input.into_iter().zip(mask).filter_map(|(row, keep)| keep.then_some(row));
                rows = Box::new(filtered.collect_vec().into_iter().map(Ok));
            } else {
                rows = Self::filter(rows, scope.resolve(predicate)?);
            }
        }

        // GROUP BY and aggregates. Afterwards, the rows contain the GROUP BY
        // values followed by the aggregate values, and the scope maps those
        // expressions to their columns.
        let aggregating = !select.group_by.is_empty()
            || select.having.is_some()
            || select.columns.iter().any(|(expr, _)| expr.contains_aggregate())
            || order_by.iter().any(|(expr, _)| expr.contains_aggregate());
        if aggregating {
            (scope, rows) = Self::aggregate(&select, order_by, scope, rows)?;
        }

        // HAVING
        if let Some(having) = &select.having {
            rows = Self::filter(rows, scope.resolve(having)?);
        }

        // Projection. Columns are labeled by alias, column name, or function
        // name.
        let mut projection = Vec::new();
        let mut labels = Vec::new();
        let mut aliases = Vec::new();
        for (expr, alias) in &select.columns {
            if *expr == ast::Expression::All {
                if aggregating {
                    return errinvalid!("* is not valid with GROUP BY or aggregates");
                }
                for (index, label) in scope.labels().iter().enumerate() {
                    projection.push(Expression::Column(index));
                    labels.push(label.clone());
                    aliases.push(None);
                }
                continue;
            }
            let resolved = scope.resolve(expr)?;
            let label = match (alias, &resolved, expr) {
                (Some(alias), _, _) => Label::Unqualified(alias.clone()),
                (None, Expression::Column(index), _) if scope.labels()[*index] != Label::None => {
                    scope.labels()[*index].clone()
                }
                (None, _, ast::Expression::Function(name, _)) => Label::Unqualified(name.clone()),
                (None, _, _) => Label::None,
            };
            projection.push(resolved);
            labels.push(label);
            aliases.push(alias.as_deref());
        }
        let width = projection.len();

        // ORDER BY can refer to result column positions and aliases, or to
        // expressions over the source columns. The latter are evaluated as
        // hidden columns after the projected ones, and removed after sorting.
        let mut keys = Vec::new();
        for (expr, direction) in order_by {
            let alias = match expr {
                ast::Expression::Column(None, name) => aliases
                    .iter()
                    .position(|alias| alias.is_some_and(|a| a.eq_ignore_ascii_case(name))),
                _ => None,
            };
            let index = match (alias, expr) {
                (Some(index), _) => index,
                (None, ast::Expression::Literal(ast::Literal::Integer(_))) => {
                    Self::ordinal(expr, width)?
                }
                (None, expr) => {
                    projection.push(scope.resolve(expr)?);
                    projection.len() - 1
                }
            };
            keys.push((index, *direction));
        }

        let mut rows: Rows = Box::new(rows.map(move |result| {
            let row = result?;
            projection.iter().map(|expr| expr.evaluate(&row)).collect()
        }));
        if !keys.is_empty() {
            let mut sorted = Self::order(rows, &keys)?;
            sorted.iter_mut().for_each(|row| row.truncate(width));
            rows = Box::new(sorted.into_iter().map(Ok));
        }

        // DISTINCT
        if select.distinct {
            let unique = distinct(rows.try_collect()?);
            rows = Box::new(unique.into_iter().map(Ok));
        }

        Ok((labels.iter().map(column_name).collect(), rows))
    }

    /// Aggregates rows by the GROUP BY expressions, computing the aggregate
    /// function calls found in the SELECT, HAVING and ORDER BY expressions.
    /// Returns the post-aggregation scope and rows.
    fn aggregate(
        select: &ast::Select,
        order_by: &[(ast::Expression, ast::Direction)],
        scope: Scope,
        rows: Rows,
    ) -> Result<(Scope, Rows)> {
        let mut calls: Vec<ast::Expression> = Vec::new();
        let exprs = select
            .columns
            .iter()
            .map(|(expr, _)| expr)
            .chain(select.having.iter())
            .chain(order_by.iter().map(|(expr, _)| expr));
        for expr in exprs {
            expr.walk(&mut |expr| {
                if expr.is_aggregate() && !calls.contains(expr) {
                    calls.push(expr.clone());
                }
                true
            });
        }

        let mut post = Scope::new().with_outer(scope.outer().cloned());
        let mut group_by = Vec::new();
        for expr in &select.group_by {
            let resolved = scope.resolve(expr)?;
            let label = match &resolved {
                Expression::Column(index) => scope.labels()[*index].clone(),
                _ => Label::None,
            };
            post.add_expression(expr.clone(), label);
            group_by.push(resolved);
        }

        let mut aggregates = Vec::new();
        for call in calls {
            let ast::Expression::Function(name, args) = &call else {
                continue;
            };
            let expr = match args.as_slice() {
                // COUNT(*) counts rows, i.e. a value that is never NULL.
                [ast::Expression::All] => Expression::Constant(Value::Boolean(true)),
                [arg] => scope.resolve(arg)?,
                args => {
                    return errinvalid!("aggregate function {name} takes 1 argument, got {}", args.len());
                }
            };
            aggregates.push(Aggregate::new(name, expr)?);
            post.add_expression(call.clone(), Label::None);
        }

        let mut aggregator = Aggregator::new(group_by, aggregates);
        aggregator.add_rows(rows)?;
        Ok((post, aggregator.into_rows()))
    }

    /// Evaluates an optional predicate against each row, returning whether
    /// it matched. EXISTS and IN subqueries are evaluated for each row, which
    /// they see as their outer row.
    fn mask(
        &self,
        predicate: Option<&ast::Expression>,
        scope: &Scope,
        rows: &[Row],
        context: &Context,
    ) -> Result<Vec<bool>> {
        let Some(predicate) = predicate else {
            return Ok(vec![true; rows.len()]);
        };
        if !predicate.contains_subquery() {
            let predicate = scope.resolve(predicate)?;
            return rows.iter().map(|row| matches(Some(&predicate), row)).collect();
        }
        // Resolve the outer expression once, so that it's checked even if
        // there are no rows.
        let stripped = predicate.clone().transform(
            &|expr| match expr {
                ast::Expression::Exists(_) => Ok(ast::Literal::Boolean(true).into()),
                ast::Expression::InSelect(lhs, _) => Ok(ast::Operator::In(lhs, Vec::new()).into()),
                expr => Ok(expr),
            },
            &Ok,
        )?;
        scope.resolve(&stripped)?;

        rows.iter()
            .map(|row| {
                let predicate = self.expand_subqueries(predicate, scope, row, context)?;
                matches(Some(&scope.resolve(&predicate)?), row)
            })
            .collect()
    }

    /// Replaces the subqueries in an expression by their results for a row:
    /// EXISTS by a boolean, and IN (SELECT ...) by an IN list.
    fn expand_subqueries(
        &self,
        expr: &ast::Expression,
        scope: &Scope,
        row: &Row,
        context: &Context,
    ) -> Result<ast::Expression> {
        let context = Context { outer: Some(Outer::new(scope.clone(), row.clone())), ..context.clone() };
        expr.clone().transform(
            &|expr| match expr {
                ast::Expression::Exists(select) => {
                    let (_, mut rows) = self.query(*select, &context)?;
                    Ok(ast::Literal::Boolean(rows.next().transpose()?.is_some()).into())
                }
                ast::Expression::InSelect(lhs, select) => {
                    let (columns, rows) = self.query(*select, &context)?;
                    if columns.len() != 1 {
                        return errinvalid!("IN subquery returned {} columns, expected 1", columns.len());
                    }
                    let list: Vec<ast::Expression> = rows
                        .map_ok(|row| {
                            let value = row.into_iter().next().unwrap_or(Value::Null);
                            ast::Expression::from(ast::Literal::from(value))
                        })
                        .try_collect()?;
                    Ok(ast::Operator::In(lhs, list).into())
                }
                expr => Ok(expr),
            },
            &Ok,
        )
    }

    /// Filters rows by a predicate.
    fn filter(rows: Rows, predicate: Expression) -> Rows {
        Box::new(rows.filter_map(move |result| {
            result
                .and_then(|row| Ok(matches(Some(&predicate), &row)?.then_some(row)))
                .transpose()
        }))
    }

    /// Sorts rows by the values at the given column indexes.
    fn order(rows: Rows, keys: &[(usize, ast::Direction)]) -> Result<Vec<Row>> {
        let mut rows: Vec<Row> = rows.try_collect()?;
        rows.sort_by(|a, b| {
            for (index, direction) in keys {
                let mut ordering = a[*index].cmp(&b[*index]);
                if *direction == ast::Direction::Descending {
                    ordering = ordering.reverse();
                }
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        Ok(rows)
    }

    /// Returns the result column position referenced by an ORDER BY
    /// expression, if it's an ordinal or a result column name.
    fn output_position(expr: &ast::Expression, columns: &[String]) -> Result<Option<usize>> {
        Ok(match expr {
            ast::Expression::Literal(ast::Literal::Integer(_)) => {
                Some(Self::ordinal(expr, columns.len())?)
            }
            ast::Expression::Column(None, name) => {
                columns.iter().position(|c| c.eq_ignore_ascii_case(name))
            }
            _ => None,
        })
    }

    /// Converts a 1-based ORDER BY ordinal into a column index.
    fn ordinal(expr: &ast::Expression, width: usize) -> Result<usize> {
        match expr {
            ast::Expression::Literal(ast::Literal::Integer(i)) if *i >= 1 && *i as usize <= width => {
                Ok(*i as usize - 1)
            }
            _ => errinvalid!("ORDER BY position {expr:?} is out of range"),
        }
    }

    /// Evaluates an OFFSET or LIMIT row count, which must be a non-negative
    /// integer.
    fn row_count(expr: Option<ast::Expression>, clause: &str) -> Result<Option<usize>> {
        let Some(expr) = expr else {
            return Ok(None);
        };
        match Scope::evaluate_constant(&expr)? {
            Value::Integer(n) if n >= 0 => Ok(Some(n as usize)),
            value => errinvalid!("invalid {clause} value {value}, expected a non-negative integer"),
        }
    }
}
