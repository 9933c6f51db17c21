use std::collections::BTreeMap;

use crate::error::Result;
use crate::sql::types::{DataType, Value};

/// SQL statements are represented as abstract syntax trees (ASTs). The
/// statement is the root node of this tree, and describes the syntactic
/// structure of a SQL statement. It is built from a raw SQL string by the
/// parser, and passed on to the executor which binds parameters, resolves
/// columns and evaluates it against the in-memory store.
///
/// An AST carries no dialect information: every dialect-specific construct has
/// already been accepted or rejected by the parser, and equivalent constructs
/// from different dialects (e.g. ON CONFLICT and ON DUPLICATE KEY UPDATE) are
/// normalized into the same shape.
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    /// CREATE TABLE: creates a new table.
    CreateTable {
        /// The table name.
        name: String,
        /// Column specifications.
        columns: Vec<Column>,
    },
    /// DROP TABLE: drops a table.
    DropTable {
        /// The table to drop.
        name: String,
        /// IF EXISTS: if true, don't error if the table doesn't exist.
        if_exists: bool,
    },
    /// SELECT: selects rows, possibly from a table.
    Select(Select),
    /// INSERT INTO: inserts new rows into a table.
    Insert(Insert),
    /// UPDATE: updates rows in a table.
    Update(Update),
    /// DELETE: deletes rows from a table.
    Delete(Delete),
    /// MERGE: updates, deletes or inserts target rows by matching them
    /// against source rows.
    Merge(Merge),
}

/// A SELECT query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Select {
    /// WITH: common table expressions, in declaration order.
    pub ctes: Vec<CommonTableExpression>,
    /// DISTINCT: removes duplicate output rows.
    pub distinct: bool,
    /// Expressions to select, with an optional column alias.
    pub columns: Vec<(Expression, Option<String>)>,
    /// FROM: the source table, if any.
    pub source: Option<TableRef>,
    /// JOIN clauses following the source table.
    pub joins: Vec<Join>,
    /// WHERE: optional condition to filter rows.
    pub predicate: Option<Expression>,
    /// GROUP BY: expressions to group and aggregate by.
    pub group_by: Vec<Expression>,
    /// HAVING: expression to filter groups by.
    pub having: Option<Expression>,
    /// UNION [ALL]: further queries whose rows are appended, in order. ORDER
    /// BY, OFFSET and LIMIT apply to the combined result.
    pub unions: Vec<Union>,
    /// ORDER BY: expressions to sort by, with direction.
    pub order_by: Vec<(Expression, Direction)>,
    /// OFFSET: row offset to start from, from OFFSET or LIMIT m, n.
    pub offset: Option<Expression>,
    /// LIMIT: maximum number of rows to return, from LIMIT, TOP or FETCH.
    pub limit: Option<Expression>,
    /// OPTION (...): SQL Server query hints. Advisory, never evaluated.
    pub query_hints: Vec<String>,
}

/// A UNION branch.
#[derive(Clone, Debug, PartialEq)]
pub struct Union {
    /// UNION ALL keeps duplicate rows, plain UNION removes them.
    pub all: bool,
    pub select: Select,
}

/// A common table expression, i.e. a named subquery in a WITH clause.
#[derive(Clone, Debug, PartialEq)]
pub struct CommonTableExpression {
    /// The name the CTE is referenced by.
    pub name: String,
    /// Optional column names, renaming the body's output columns.
    pub columns: Vec<String>,
    /// WITH RECURSIVE: the CTE may reference itself.
    pub recursive: bool,
    /// AS [NOT] MATERIALIZED: an advisory materialization hint.
    pub materialization: Option<Materialization>,
    /// The CTE body.
    pub body: Box<Select>,
}

/// A CTE materialization hint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Materialization {
    Materialized,
    NotMaterialized,
}

/// A table reference in FROM or JOIN, with optional alias and hints.
#[derive(Clone, Debug, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
    pub hints: Vec<TableHint>,
}

impl TableRef {
    /// The name the table is referred to by in expressions.
    pub fn label(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A table hint. Hints are advisory: they are parsed and retained, but never
/// change query results.
#[derive(Clone, Debug, PartialEq)]
pub enum TableHint {
    /// A SQL Server table hint such as NOLOCK, or INDEX(name) as "index(name)".
    Table(String),
    /// A MySQL index hint.
    Index { action: IndexHintAction, scope: Option<IndexHintScope>, indexes: Vec<String> },
}

/// A MySQL index hint action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexHintAction {
    Use,
    Ignore,
    Force,
}

/// A MySQL index hint scope: FOR JOIN, FOR ORDER BY, or FOR GROUP BY.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexHintScope {
    Join,
    OrderBy,
    GroupBy,
}

/// A JOIN clause.
#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub kind: JoinType,
    pub table: TableRef,
    /// The ON predicate. None for CROSS JOIN.
    pub predicate: Option<Expression>,
}

/// JOIN types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinType {
    Cross,
    Inner,
    Left,
    Right,
}

/// An INSERT statement. Both upsert syntaxes normalize into this shape:
/// `on_conflict_assignments` is non-empty iff the statement is an upsert.
#[derive(Clone, Debug, PartialEq)]
pub struct Insert {
    /// The table to insert into.
    pub table: String,
    /// Columns to insert into. If None, all columns are used in order.
    pub columns: Option<Vec<String>>,
    /// Row values to insert. Empty for INSERT ... SELECT.
    pub values: Vec<Vec<Expression>>,
    /// INSERT ... SELECT: a query whose result rows are inserted.
    pub select: Option<Box<Select>>,
    /// ON CONFLICT (columns): the conflict target. Empty means the primary
    /// key and unique columns.
    pub conflict_target: Vec<String>,
    /// Assignments applied to the conflicting row. A column assigned more
    /// than once keeps its last assignment.
    pub on_conflict_assignments: Vec<(String, Expression)>,
    /// ON CONFLICT DO NOTHING: conflicting rows are skipped.
    pub ignore_conflicts: bool,
}

impl Insert {
    /// Whether the statement is an upsert.
    pub fn is_upsert(&self) -> bool {
        !self.on_conflict_assignments.is_empty()
    }
}

/// An UPDATE statement.
#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    pub table: String,
    /// Column assignments. Columns are unique.
    pub assignments: BTreeMap<String, Expression>,
    pub predicate: Option<Expression>,
}

/// A DELETE statement.
#[derive(Clone, Debug, PartialEq)]
pub struct Delete {
    pub table: String,
    pub predicate: Option<Expression>,
}

/// A MERGE statement.
#[derive(Clone, Debug, PartialEq)]
pub struct Merge {
    /// The table to merge into.
    pub target: TableRef,
    /// USING: the rows to merge.
    pub source: MergeSource,
    /// ON: matches source rows to target rows.
    pub predicate: Expression,
    /// WHEN clauses, in order. Each source row takes the first clause whose
    /// kind and condition apply.
    pub clauses: Vec<MergeClause>,
}

/// A MERGE source.
#[derive(Clone, Debug, PartialEq)]
pub enum MergeSource {
    Table(TableRef),
    /// A parenthesized query and its alias.
    Select { select: Box<Select>, alias: String },
}

/// A MERGE WHEN [NOT] MATCHED clause.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeClause {
    /// WHEN MATCHED if true, WHEN NOT MATCHED otherwise.
    pub matched: bool,
    /// AND condition: the clause only applies where it holds.
    pub condition: Option<Expression>,
    pub action: MergeAction,
}

/// The action of a MERGE clause. UPDATE and DELETE only follow WHEN
/// MATCHED, and INSERT only follows WHEN NOT MATCHED.
#[derive(Clone, Debug, PartialEq)]
pub enum MergeAction {
    /// UPDATE SET: target column assignments. Columns are unique.
    Update(BTreeMap<String, Expression>),
    Delete,
    /// INSERT [(columns)] VALUES (...).
    Insert { columns: Option<Vec<String>>, values: Vec<Expression> },
}

/// ORDER BY direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// A CREATE TABLE column definition.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub datatype: DataType,
    pub primary_key: bool,
    pub nullable: Option<bool>,
    pub default: Option<Expression>,
    pub unique: bool,
}

/// SQL expressions, e.g. `a + 7 > b`. Can be nested.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    /// All columns, i.e. *.
    All,
    /// A column reference, optionally qualified with a table name.
    Column(Option<String>, String),
    /// A literal value.
    Literal(Literal),
    /// A parameter placeholder, bound before evaluation.
    Parameter(Placeholder),
    /// In an upsert assignment, the value the conflicting row would have
    /// inserted into the given column: `excluded.col` or `VALUES(col)`.
    Excluded(String),
    /// A function call (name and parameters).
    Function(String, Vec<Expression>),
    /// An operator.
    Operator(Operator),
    /// EXISTS (SELECT ...): true if the subquery returns any rows.
    Exists(Box<Select>),
    /// a IN (SELECT ...): membership in the subquery's single column.
    InSelect(Box<Expression>, Box<Select>),
}

/// Expression literal values.
#[derive(Clone, Debug)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// To allow using expressions and literals in e.g. hashmaps, implement simple
/// equality by value for all types, including Null and f64::NAN. This only
/// checks that the values are the same, and ignores SQL semantics.
impl std::cmp::PartialEq for Literal {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(l), Self::Boolean(r)) => l == r,
            (Self::Integer(l), Self::Integer(r)) => l == r,
            // Implies NaN == NaN but -NaN != NaN. Similarly with +/-0.0.
            (Self::Float(l), Self::Float(r)) => l.to_bits() == r.to_bits(),
            (Self::String(l), Self::String(r)) => l == r,
            (l, r) => core::mem::discriminant(l) == core::mem::discriminant(r),
        }
    }
}

impl From<Value> for Literal {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Boolean(b) => Self::Boolean(b),
            Value::Integer(i) => Self::Integer(i),
            Value::Float(f) => Self::Float(f),
            Value::String(s) => Self::String(s),
        }
    }
}

/// A parameter placeholder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Placeholder {
    /// A named placeholder, e.g. @id, without its prefix.
    Named(String),
    /// A positional ? placeholder, numbered from 0 in textual order.
    Positional(usize),
}

impl std::fmt::Display for Placeholder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(name) => write!(f, "@{name}"),
            Self::Positional(ordinal) => write!(f, "?{ordinal}"),
        }
    }
}

/// Expression operators.
///
/// Since this is a recursive data structure, we have to box each child
/// expression, which incurs a heap allocation. There are clever ways to get
/// around this, but we keep it simple.
#[derive(Clone, Debug, PartialEq)]
pub enum Operator {
    And(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
    Or(Box<Expression>, Box<Expression>),

    Equal(Box<Expression>, Box<Expression>),
    GreaterThan(Box<Expression>, Box<Expression>),
    GreaterThanOrEqual(Box<Expression>, Box<Expression>),
    In(Box<Expression>, Vec<Expression>),
    Is(Box<Expression>, Literal), // NULL only
    LessThan(Box<Expression>, Box<Expression>),
    LessThanOrEqual(Box<Expression>, Box<Expression>),
    NotEqual(Box<Expression>, Box<Expression>),

    Add(Box<Expression>, Box<Expression>),
    Concat(Box<Expression>, Box<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    Identity(Box<Expression>),
    Multiply(Box<Expression>, Box<Expression>),
    Negate(Box<Expression>),
    Remainder(Box<Expression>, Box<Expression>),
    Subtract(Box<Expression>, Box<Expression>),

    Like(Box<Expression>, Box<Expression>),
}

impl Operator {
    /// Returns the operator's operands, in order.
    fn operands(&self) -> Vec<&Expression> {
        use Operator::*;
        match self {
            Add(lhs, rhs)
            | And(lhs, rhs)
            | Concat(lhs, rhs)
            | Divide(lhs, rhs)
            | Equal(lhs, rhs)
            | GreaterThan(lhs, rhs)
            | GreaterThanOrEqual(lhs, rhs)
            | LessThan(lhs, rhs)
            | LessThanOrEqual(lhs, rhs)
            | Like(lhs, rhs)
            | Multiply(lhs, rhs)
            | NotEqual(lhs, rhs)
            | Or(lhs, rhs)
            | Remainder(lhs, rhs)
            | Subtract(lhs, rhs) => vec![lhs.as_ref(), rhs.as_ref()],
            Identity(expr) | Is(expr, _) | Negate(expr) | Not(expr) => vec![expr.as_ref()],
            In(expr, list) => std::iter::once(expr.as_ref()).chain(list).collect(),
        }
    }
}

impl Expression {
    /// Walks the expression tree depth-first, calling a closure for every node.
    /// Halts and returns false if the closure returns false. Subqueries are
    /// not descended into.
    pub fn walk(&self, visitor: &mut impl FnMut(&Expression) -> bool) -> bool {
        if !visitor(self) {
            return false;
        }
        match self {
            Self::Operator(op) => op.operands().into_iter().all(|expr| expr.walk(visitor)),
            Self::Function(_, args) => args.iter().all(|expr| expr.walk(visitor)),
            Self::InSelect(expr, _) => expr.walk(visitor),
            Self::All
            | Self::Column(_, _)
            | Self::Literal(_)
            | Self::Parameter(_)
            | Self::Excluded(_)
            | Self::Exists(_) => true,
        }
    }

    /// Walks the expression tree depth-first while calling a closure until it
    /// returns true. This is the inverse of walk().
    pub fn contains(&self, visitor: &impl Fn(&Expression) -> bool) -> bool {
        !self.walk(&mut |expr| !visitor(expr))
    }

    /// Transforms the expression tree depth-first by applying a closure before
    /// and after descending into child nodes. Like walk(), this doesn't
    /// descend into subqueries.
    pub fn transform(
        mut self,
        before: &impl Fn(Self) -> Result<Self>,
        after: &impl Fn(Self) -> Result<Self>,
    ) -> Result<Self> {
        // Helper for transforming a boxed expression.
        let xform = |mut expr: Box<Expression>| -> Result<Box<Expression>> {
            *expr = expr.transform(before, after)?;
            Ok(expr)
        };

        use Operator::*;
        self = before(self)?;
        self = match self {
            Self::Operator(op) => Self::Operator(match op {
                Add(lhs, rhs) => Add(xform(lhs)?, xform(rhs)?),
                And(lhs, rhs) => And(xform(lhs)?, xform(rhs)?),
                Concat(lhs, rhs) => Concat(xform(lhs)?, xform(rhs)?),
                Divide(lhs, rhs) => Divide(xform(lhs)?, xform(rhs)?),
                Equal(lhs, rhs) => Equal(xform(lhs)?, xform(rhs)?),
                GreaterThan(lhs, rhs) => GreaterThan(xform(lhs)?, xform(rhs)?),
                GreaterThanOrEqual(lhs, rhs) => GreaterThanOrEqual(xform(lhs)?, xform(rhs)?),
                Identity(expr) => Identity(xform(expr)?),
                In(expr, list) => In(
                    xform(expr)?,
                    list.into_iter().map(|e| e.transform(before, after)).collect::<Result<_>>()?,
                ),
                Is(expr, literal) => Is(xform(expr)?, literal),
                LessThan(lhs, rhs) => LessThan(xform(lhs)?, xform(rhs)?),
                LessThanOrEqual(lhs, rhs) => LessThanOrEqual(xform(lhs)?, xform(rhs)?),
                Like(lhs, rhs) => Like(xform(lhs)?, xform(rhs)?),
                Multiply(lhs, rhs) => Multiply(xform(lhs)?, xform(rhs)?),
                Negate(expr) => Negate(xform(expr)?),
                Not(expr) => Not(xform(expr)?),
                NotEqual(lhs, rhs) => NotEqual(xform(lhs)?, xform(rhs)?),
                Or(lhs, rhs) => Or(xform(lhs)?, xform(rhs)?),
                Remainder(lhs, rhs) => Remainder(xform(lhs)?, xform(rhs)?),
                Subtract(lhs, rhs) => Subtract(xform(lhs)?, xform(rhs)?),
            }),
            Self::Function(name, args) => Self::Function(
                name,
                args.into_iter().map(|e| e.transform(before, after)).collect::<Result<_>>()?,
            ),
            Self::InSelect(expr, select) => Self::InSelect(xform(expr)?, select),
            expr @ (Self::All
            | Self::Column(_, _)
            | Self::Literal(_)
            | Self::Parameter(_)
            | Self::Excluded(_)
            | Self::Exists(_)) => expr,
        };
        self = after(self)?;
        Ok(self)
    }

    /// Returns true if the expression is an aggregate function call.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Function(name, _) if is_aggregate_function(name))
    }

    /// Returns true if the expression contains an aggregate function call.
    pub fn contains_aggregate(&self) -> bool {
        self.contains(&|expr| expr.is_aggregate())
    }

    /// Returns true if the expression contains an EXISTS or IN subquery.
    pub fn contains_subquery(&self) -> bool {
        self.contains(&|expr| matches!(expr, Self::Exists(_) | Self::InSelect(_, _)))
    }
}

/// Returns true if the function name is an aggregate function.
pub fn is_aggregate_function(name: &str) -> bool {
    matches!(name, "avg" | "count" | "max" | "min" | "sum")
}

impl From<Literal> for Expression {
    fn from(literal: Literal) -> Self {
        Self::Literal(literal)
    }
}

impl From<Literal> for Box<Expression> {
    fn from(literal: Literal) -> Self {
        Box::new(literal.into())
    }
}

impl From<Operator> for Expression {
    fn from(op: Operator) -> Self {
        Self::Operator(op)
    }
}

impl From<Operator> for Box<Expression> {
    fn from(value: Operator) -> Self {
        Box::new(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> Expression {
        Expression::Column(None, name.to_string())
    }

    #[test]
    fn walk_and_contains() {
        let expr: Expression = Operator::And(
            Operator::Equal(column("a").into(), Literal::Integer(1).into()).into(),
            Expression::Function("count".into(), vec![Expression::All]).into(),
        )
        .into();

        let mut visited = 0;
        assert!(expr.walk(&mut |_| {
            visited += 1;
            true
        }));
        assert_eq!(visited, 6);
        assert!(expr.contains_aggregate());
        assert!(!column("a").contains_aggregate());
    }

    #[test]
    fn transform_replaces_nodes() -> Result<()> {
        let parameter = Expression::Parameter(Placeholder::Positional(0));
        let expr: Expression = Operator::Add(column("a").into(), parameter.into()).into();
        let bound = expr.transform(&Ok, &|expr| match expr {
            Expression::Parameter(_) => Ok(Literal::Integer(7).into()),
            expr => Ok(expr),
        })?;
        assert_eq!(
            bound,
            Operator::Add(column("a").into(), Literal::Integer(7).into()).into()
        );
        Ok(())
    }

    #[test]
    fn subqueries_are_not_descended_into() {
        let subquery = Select {
            columns: vec![(Expression::Function("count".into(), vec![Expression::All]), None)],
            ..Default::default()
        };
        let expr = Expression::InSelect(column("a").into(), Box::new(subquery.clone()));
        assert!(expr.contains_subquery());
        assert!(!expr.contains_aggregate());
        assert!(Expression::Exists(Box::new(subquery)).contains_subquery());
        assert!(!column("a").contains_subquery());
    }

    #[test]
    fn literal_equality_ignores_sql_semantics() {
        assert_eq!(Literal::Null, Literal::Null);
        assert_eq!(Literal::Float(f64::NAN), Literal::Float(f64::NAN));
        assert_ne!(Literal::Integer(1), Literal::Float(1.0));
    }
}
