use crate::error::Result;
use crate::sql::parser::ast;
use crate::sql::types::{Expression, Function, Row, Value};
use crate::{errinvalid, errparam, errschema};

/// A column label, used to resolve column references and to name result
/// columns.
#[derive(Clone, Debug, PartialEq)]
pub enum Label {
    /// No label, e.g. a computed expression.
    None,
    /// An unqualified column name.
    Unqualified(String),
    /// A column name qualified by a table name or alias.
    Qualified(String, String),
}

impl Label {
    /// The column name, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Unqualified(name) | Self::Qualified(_, name) => Some(name),
        }
    }

    /// Returns an unqualified copy of the label.
    pub fn unqualified(&self) -> Self {
        match self {
            Self::None => Self::None,
            Self::Unqualified(name) | Self::Qualified(_, name) => Self::Unqualified(name.clone()),
        }
    }

    /// Whether the label matches an optionally qualified column reference.
    /// Names are matched case-insensitively.
    fn matches(&self, table: Option<&str>, column: &str) -> bool {
        match (self, table) {
            (Self::None, _) => false,
            (Self::Unqualified(name), None) => name.eq_ignore_ascii_case(column),
            (Self::Unqualified(_), Some(_)) => false,
            (Self::Qualified(_, name), None) => name.eq_ignore_ascii_case(column),
            (Self::Qualified(t, name), Some(table)) => {
                t.eq_ignore_ascii_case(table) && name.eq_ignore_ascii_case(column)
            }
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "?"),
            Self::Unqualified(name) => write!(f, "{name}"),
            Self::Qualified(table, name) => write!(f, "{table}.{name}"),
        }
    }
}

/// The columns visible to an expression, i.e. the layout of the rows it is
/// evaluated against. Resolves AST expressions into expressions with column
/// references replaced by row indexes.
///
/// After aggregation, a scope also maps whole AST expressions (GROUP BY
/// expressions and aggregate calls) to the row indexes holding their values.
///
/// In a subquery, the scope also has the enclosing query's row. Column
/// references that don't resolve in the subquery resolve to its values.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    /// Column labels, by row index.
    columns: Vec<Label>,
    /// AST expressions whose values are available at a row index.
    expressions: Vec<(ast::Expression, usize)>,
    /// The enclosing query's row, for correlated subqueries.
    outer: Option<Box<Outer>>,
}

/// The row of an enclosing query, as seen from a subquery.
#[derive(Clone, Debug)]
pub struct Outer {
    scope: Scope,
    row: Row,
}

impl Outer {
    pub fn new(scope: Scope, row: Row) -> Self {
        Self { scope, row }
    }

    /// Resolves a column reference in the enclosing query and returns its
    /// value. Errors if the column is unknown there too.
    fn value(&self, expr: &ast::Expression) -> Result<Value> {
        self.scope.resolve(expr)?.evaluate(&self.row)
    }
}

impl Scope {
    /// Creates an empty scope, for expressions that don't reference columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scope for a table or relation, with columns qualified by the
    /// given table name or alias.
    pub fn from_columns<'a>(table: &str, columns: impl IntoIterator<Item = &'a str>) -> Self {
        let columns =
            columns.into_iter().map(|c| Label::Qualified(table.to_string(), c.to_string()));
        Self { columns: columns.collect(), ..Self::default() }
    }

    /// Creates a scope from column labels.
    pub fn from_labels(columns: Vec<Label>) -> Self {
        Self { columns, ..Self::default() }
    }

    /// Sets the enclosing query's row, for a subquery.
    pub fn with_outer(mut self, outer: Option<Outer>) -> Self {
        self.outer = outer.map(Box::new);
        self
    }

    /// The enclosing query's row, if any.
    pub fn outer(&self) -> Option<&Outer> {
        self.outer.as_deref()
    }

    /// The number of columns in the scope.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// The column labels.
    pub fn labels(&self) -> &[Label] {
        &self.columns
    }

    /// Appends another scope's columns, e.g. for the right side of a join.
    /// Errors if a table qualifier is used on both sides.
    pub fn merge(&mut self, other: Scope) -> Result<()> {
        let qualifier = |label: &Label| match label {
            Label::Qualified(table, _) => Some(table.to_lowercase()),
            _ => None,
        };
        for table in other.columns.iter().filter_map(qualifier) {
            if self.columns.iter().filter_map(qualifier).any(|t| t == table) {
                return errschema!("duplicate table name {table}");
            }
        }
        self.columns.extend(other.columns);
        Ok(())
    }

    /// Adds a column whose value is given by an AST expression, e.g. a GROUP
    /// BY expression or aggregate call.
    pub fn add_expression(&mut self, expr: ast::Expression, label: Label) {
        self.expressions.push((expr, self.columns.len()));
        self.columns.push(label);
    }

    /// Looks up a column by optional table qualifier and name. Errors if the
    /// column doesn't exist or is ambiguous.
    pub fn lookup(&self, table: Option<&str>, name: &str) -> Result<usize> {
        match self.find(table, name)? {
            Some(index) => Ok(index),
            None => errschema!("unknown column {}", Self::column(table, name)),
        }
    }

    /// Like lookup(), but returns None for an unknown column.
    fn find(&self, table: Option<&str>, name: &str) -> Result<Option<usize>> {
        let mut matches = self.columns.iter().enumerate().filter(|(_, l)| l.matches(table, name));
        match (matches.next(), matches.next()) {
            (Some((index, _)), None) => Ok(Some(index)),
            (Some(_), Some(_)) => errschema!("ambiguous column {}", Self::column(table, name)),
            (None, _) => Ok(None),
        }
    }

    fn column(table: Option<&str>, name: &str) -> String {
        match table {
            Some(table) => format!("{table}.{name}"),
            None => name.to_string(),
        }
    }

    /// Resolves an AST expression into an evaluable expression. Parameters
    /// must already be bound.
    pub fn resolve(&self, expr: &ast::Expression) -> Result<Expression> {
        use ast::Operator::*;

        if let Some((_, index)) = self.expressions.iter().find(|(e, _)| e == expr) {
            return Ok(Expression::Column(*index));
        }
        let resolve = |expr: &ast::Expression| -> Result<Box<Expression>> {
            Ok(Box::new(self.resolve(expr)?))
        };
        Ok(match expr {
            ast::Expression::All => return errinvalid!("* is not valid here"),
            ast::Expression::Column(table, name) => match (self.find(table.as_deref(), name)?, &self.outer) {
                (Some(index), _) => Expression::Column(index),
                (None, Some(outer)) => Expression::Constant(outer.value(expr)?),
                (None, None) => {
                    return errschema!("unknown column {}", Self::column(table.as_deref(), name));
                }
            },
            ast::Expression::Literal(literal) => Expression::Constant(match literal {
                ast::Literal::Null => Value::Null,
                ast::Literal::Boolean(b) => Value::Boolean(*b),
                ast::Literal::Integer(i) => Value::Integer(*i),
                ast::Literal::Float(f) => Value::Float(*f),
                ast::Literal::String(s) => Value::String(s.clone()),
            }),
            ast::Expression::Parameter(placeholder) => {
                return errparam!("parameter {placeholder} is not bound");
            }
            ast::Expression::Excluded(column) => {
                Expression::Column(self.lookup(Some(EXCLUDED), column)?)
            }
            ast::Expression::Exists(_) | ast::Expression::InSelect(_, _) => {
                return errinvalid!("subqueries are only supported in WHERE clauses");
            }
            ast::Expression::Function(name, _) if ast::is_aggregate_function(name) => {
                return errinvalid!("aggregate function {name} is not valid here");
            }
            ast::Expression::Function(name, args) => Expression::Function(
                Function::lookup(name, args.len())?,
                args.iter().map(|arg| self.resolve(arg)).collect::<Result<_>>()?,
            ),
            ast::Expression::Operator(op) => match op {
                And(lhs, rhs) => Expression::And(resolve(lhs)?, resolve(rhs)?),
                Not(expr) => Expression::Not(resolve(expr)?),
                Or(lhs, rhs) => Expression::Or(resolve(lhs)?, resolve(rhs)?),

                Equal(lhs, rhs) => Expression::Equal(resolve(lhs)?, resolve(rhs)?),
                GreaterThan(lhs, rhs) => Expression::GreaterThan(resolve(lhs)?, resolve(rhs)?),
                GreaterThanOrEqual(lhs, rhs) => {
                    Expression::GreaterThanOrEqual(resolve(lhs)?, resolve(rhs)?)
                }
                In(expr, list) => Expression::In(
                    resolve(expr)?,
                    list.iter().map(|e| self.resolve(e)).collect::<Result<_>>()?,
                ),
                Is(expr, ast::Literal::Null) => Expression::IsNull(resolve(expr)?),
                Is(_, literal) => return errinvalid!("invalid IS operand {literal:?}"),
                LessThan(lhs, rhs) => Expression::LessThan(resolve(lhs)?, resolve(rhs)?),
                LessThanOrEqual(lhs, rhs) => {
                    Expression::LessThanOrEqual(resolve(lhs)?, resolve(rhs)?)
                }
                NotEqual(lhs, rhs) => Expression::NotEqual(resolve(lhs)?, resolve(rhs)?),

                Add(lhs, rhs) => Expression::Add(resolve(lhs)?, resolve(rhs)?),
                Concat(lhs, rhs) => Expression::Concat(resolve(lhs)?, resolve(rhs)?),
                Divide(lhs, rhs) => Expression::Divide(resolve(lhs)?, resolve(rhs)?),
                Identity(expr) => Expression::Identity(resolve(expr)?),
                Multiply(lhs, rhs) => Expression::Multiply(resolve(lhs)?, resolve(rhs)?),
                Negate(expr) => Expression::Negate(resolve(expr)?),
                Remainder(lhs, rhs) => Expression::Remainder(resolve(lhs)?, resolve(rhs)?),
                Subtract(lhs, rhs) => Expression::Subtract(resolve(lhs)?, resolve(rhs)?),

                Like(lhs, rhs) => Expression::like(self.resolve(lhs)?, self.resolve(rhs)?)?,
            },
        })
    }

    /// Resolves and evaluates a constant expression, i.e. one that doesn't
    /// reference any columns.
    pub fn evaluate_constant(expr: &ast::Expression) -> Result<Value> {
        Self::new().resolve(expr)?.evaluate(&Vec::new())
    }
}

/// The table qualifier of the proposed row's columns in upsert assignments.
pub const EXCLUDED: &str = "excluded";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;

    fn column(table: Option<&str>, name: &str) -> ast::Expression {
        ast::Expression::Column(table.map(|t| t.to_string()), name.to_string())
    }

    fn joined() -> Result<Scope> {
        let mut scope = Scope::from_columns("u", ["id", "name"]);
        scope.merge(Scope::from_columns("o", ["id", "total"]))?;
        Ok(scope)
    }

    #[test]
    fn lookup() -> Result<()> {
        let scope = joined()?;
        assert_eq!(scope.lookup(None, "NAME")?, 1);
        assert_eq!(scope.lookup(Some("O"), "id")?, 2);
        assert!(matches!(scope.lookup(None, "id"), Err(Error::Schema(_))));
        assert!(matches!(scope.lookup(None, "missing"), Err(Error::Schema(_))));
        assert!(matches!(scope.lookup(Some("x"), "id"), Err(Error::Schema(_))));
        Ok(())
    }

    #[test]
    fn merge_rejects_duplicate_tables() {
        let mut scope = Scope::from_columns("u", ["id"]);
        assert!(matches!(scope.merge(Scope::from_columns("U", ["id"])), Err(Error::Schema(_))));
    }

    #[test]
    fn resolve() -> Result<()> {
        let scope = joined()?;
        let expr = ast::Operator::Equal(
            column(Some("u"), "id").into(),
            column(None, "total").into(),
        );
        assert_eq!(
            scope.resolve(&expr.into())?,
            Expression::Equal(Expression::Column(0).into(), Expression::Column(3).into())
        );
        Ok(())
    }

    #[test]
    fn resolve_aggregate_slots() -> Result<()> {
        let count = ast::Expression::Function("count".into(), vec![ast::Expression::All]);
        assert!(matches!(Scope::new().resolve(&count), Err(Error::InvalidOperation(_))));

        let mut scope = Scope::new();
        scope.add_expression(column(None, "name"), Label::Unqualified("name".into()));
        scope.add_expression(count.clone(), Label::None);
        assert_eq!(scope.resolve(&count)?, Expression::Column(1));
        assert_eq!(scope.resolve(&column(None, "name"))?, Expression::Column(0));
        Ok(())
    }

    #[test]
    fn resolve_outer_columns() -> Result<()> {
        let outer = Outer::new(Scope::from_columns("u", ["id", "name"]), vec![7.into(), "x".into()]);
        let scope = Scope::from_columns("o", ["id", "user_id"]).with_outer(Some(outer));

        // Inner columns shadow outer ones. Unknown columns resolve to the
        // outer row's values.
        assert_eq!(scope.resolve(&column(None, "id"))?, Expression::Column(0));
        let expr = ast::Operator::Equal(column(Some("o"), "user_id").into(), column(Some("u"), "id").into());
        assert_eq!(
            scope.resolve(&expr.into())?,
            Expression::Equal(Expression::Column(1).into(), Expression::Constant(7.into()).into())
        );
        assert_eq!(scope.resolve(&column(None, "name"))?, Expression::Constant("x".into()));
        assert!(matches!(scope.resolve(&column(None, "missing")), Err(Error::Schema(_))));
        Ok(())
    }

    #[test]
    fn subqueries_outside_where() {
        let select = ast::Select { columns: vec![(ast::Literal::Integer(1).into(), None)], ..Default::default() };
        let expr = ast::Expression::Exists(Box::new(select));
        assert!(matches!(Scope::new().resolve(&expr), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn unbound_parameter() {
        let expr = ast::Expression::Parameter(ast::Placeholder::Named("id".into()));
        assert!(matches!(Scope::new().resolve(&expr), Err(Error::ParameterBinding(_))));
    }

    #[test]
    fn evaluate_constant() -> Result<()> {
        let expr = ast::Operator::Add(
            ast::Literal::Integer(1).into(),
            ast::Literal::Integer(2).into(),
        );
        assert_eq!(Scope::evaluate_constant(&expr.into())?, Value::Integer(3));
        assert!(matches!(
            Scope::evaluate_constant(&column(None, "a")),
            Err(Error::Schema(_))
        ));
        Ok(())
    }
}
