use std::collections::HashSet;

use itertools::Itertools as _;

use super::scope::{EXCLUDED, Label, Scope};
use crate::error::Result;
use crate::sql::dialect::DialectVersion;
use crate::sql::parser::ast;
use crate::sql::types::{Column, Expression, Row, Rows, Table, Value};
use crate::storage::Memory;
use crate::{errconstraint, errinvalid, errschema, errtype};

/// Executes statement ASTs against an in-memory store.
///
/// Statements are executed in three steps:
///
/// 1. Resolution: AST expressions are resolved against the columns they can
///    see, turning column names into row indexes. Unknown or ambiguous columns
///    are rejected here, before any row is read or written.
/// 2. Evaluation: rows flow through the query pipeline. For SELECT, that's
///    FROM/JOIN → WHERE → GROUP BY → HAVING → projection → ORDER BY →
///    DISTINCT → OFFSET → LIMIT.
/// 3. Commit: mutations are applied to a staged copy of the table's rows,
///    which only replaces the table's rows if the whole statement succeeds.
///
/// By the time a statement reaches the executor, every dialect-specific
/// construct has been accepted or rejected by the parser, and parameters have
/// been bound. The executor evaluates all dialects the same way, and only
/// carries the dialect version for diagnostics.
pub struct Executor {
    dialect: DialectVersion,
}

impl Executor {
    /// Creates a new executor for a dialect version.
    pub fn new(dialect: DialectVersion) -> Self {
        Self { dialect }
    }

    /// The dialect version the executor was created for.
    pub fn dialect(&self) -> DialectVersion {
        self.dialect
    }

    /// Executes a statement, returning an execution result.
    pub fn execute(&self, statement: ast::Statement, store: &mut Memory) -> Result<ExecutionResult> {
        Ok(match statement {
            // CREATE TABLE
            ast::Statement::CreateTable { name, columns } => {
                let columns = columns.into_iter().map(Self::build_column).collect::<Result<_>>()?;
                store.create_table(Table::new(name.clone(), columns))?;
                ExecutionResult::CreateTable { name }
            }

            // DROP TABLE
            ast::Statement::DropTable { name, if_exists } => {
                let existed = store.drop_table(&name, if_exists)?;
                ExecutionResult::DropTable { name, existed }
            }

            // DELETE
            ast::Statement::Delete(delete) => {
                let count = self.delete(delete, store)?;
                ExecutionResult::Delete { count }
            }

            // INSERT
            ast::Statement::Insert(insert) => {
                let count = self.insert(insert, store)?;
                ExecutionResult::Insert { count }
            }

            // MERGE
            ast::Statement::Merge(merge) => {
                let count = self.merge(merge, store)?;
                ExecutionResult::Merge { count }
            }

            // SELECT
            ast::Statement::Select(select) => {
                let (columns, rows) = self.select(select, store)?;
                ExecutionResult::Select { columns, rows }
            }

            // UPDATE
            ast::Statement::Update(update) => {
                let count = self.update(update, store)?;
                ExecutionResult::Update { count }
            }
        })
    }

    /// Builds a table column from a CREATE TABLE column definition. Primary
    /// key columns default to NOT NULL, other columns to nullable with a NULL
    /// default.
    fn build_column(column: ast::Column) -> Result<Column> {
        let nullable = column.nullable.unwrap_or(!column.primary_key);
        let default = match column.default {
            Some(expr) => Some(Scope::evaluate_constant(&expr)?.coerce(column.datatype)?),
            None if nullable => Some(Value::Null),
            None => None,
        };
        Ok(Column {
            name: column.name,
            datatype: column.datatype,
            primary_key: column.primary_key,
            nullable,
            default,
            unique: column.unique,
        })
    }

    /// DELETE: deletes rows matching the predicate. Returns the number of rows
    /// deleted.
    fn delete(&self, delete: ast::Delete, store: &mut Memory) -> Result<u64> {
        let scope = Self::table_scope(store.must_get_table(&delete.table)?);
        let delete_mask =
            self.predicate_mask(delete.predicate.as_ref(), &scope, store.scan(&delete.table)?, store)?;

        store.mutate(&delete.table, |_, rows| {
            let delete = delete_mask;
            let count = delete.iter().filter(|d| **d).count() as u64;
            let mut delete = delete.into_iter();
            rows.retain(|_| !delete.next().unwrap_or(false));
            Ok(count)
        })
    }

    /// INSERT: inserts VALUES rows or the rows of a query, handling conflicts
    /// for upserts and ON CONFLICT DO NOTHING. Returns the number of rows
    /// inserted or updated.
    fn insert(&self, mut insert: ast::Insert, store: &mut Memory) -> Result<u64> {
        let table = store.must_get_table(&insert.table)?.clone();
        let column_map = Self::column_map(&table, insert.columns.as_deref())?;

        // Evaluate the rows, filling in defaults and coercing values. Query
        // rows are evaluated before anything is written, so a query can read
        // the table it inserts into.
        let values: Vec<Vec<Value>> = match insert.select.take() {
            Some(select) => self.select(*select, store)?.1.try_collect()?,
            None => insert
                .values
                .iter()
                .map(|values| values.iter().map(Scope::evaluate_constant).collect())
                .collect::<Result<_>>()?,
        };
        let mut rows = Vec::with_capacity(values.len());
        for values in values {
            if values.len() > column_map.len()
                || (insert.columns.is_some() && values.len() != column_map.len())
            {
                return errschema!("column and value counts do not match");
            }
            rows.push(Self::build_row(&table, &column_map, values)?);
        }

        // Resolve the conflict target and upsert assignments. Assignments see
        // the existing row's columns followed by the proposed row's columns,
        // which are qualified as excluded.
        let conflict_keys = match insert.conflict_target.is_empty() {
            true => table.unique_keys(),
            false => vec![
                insert
                    .conflict_target
                    .iter()
                    .map(|c| table.column_index(c))
                    .collect::<Result<Vec<_>>>()?,
            ],
        };
        let mut scope = Self::table_scope(&table);
        scope.merge(Scope::from_columns(EXCLUDED, table.columns.iter().map(|c| c.name.as_str())))?;
        let assignments: Vec<(usize, Expression)> = insert
            .on_conflict_assignments
            .iter()
            .map(|(column, expr)| Ok((table.column_index(column)?, scope.resolve(expr)?)))
            .collect::<Result<_>>()?;
        let upsert = !assignments.is_empty();

        store.mutate(&insert.table, |table, existing| {
            let mut count = 0;
            for row in rows {
                let conflict = conflict_keys.iter().find_map(|key| {
                    if key.iter().any(|&i| row[i] == Value::Null) {
                        return None;
                    }
                    existing.iter().position(|other| key.iter().all(|&i| other[i] == row[i]))
                });
                match conflict {
                    Some(_) if insert.ignore_conflicts => {}
                    Some(index) if upsert => {
                        let mut input = existing[index].clone();
                        input.extend(row);
                        let mut updated = existing[index].clone();
                        for (column, expr) in &assignments {
                            updated[*column] = expr.evaluate(&input)?;
                        }
                        let updated = table.normalize_row(updated)?;
                        table.check_unique(existing, &updated, Some(index))?;
                        existing[index] = updated;
                        count += 1;
                    }
                    _ => {
                        table.check_unique(existing, &row, None)?;
                        existing.push(row);
                        count += 1;
                    }
                }
            }
            Ok(count)
        })
    }

    /// UPDATE: updates rows matching the predicate. Returns the number of rows
    /// updated.
    fn update(&self, update: ast::Update, store: &mut Memory) -> Result<u64> {
        let table = store.must_get_table(&update.table)?;
        let scope = Self::table_scope(table);
        let assignments: Vec<(usize, Expression)> = update
            .assignments
            .iter()
            .map(|(column, expr)| Ok((table.column_index(column)?, scope.resolve(expr)?)))
            .collect::<Result<_>>()?;
        let update_mask =
            self.predicate_mask(update.predicate.as_ref(), &scope, store.scan(&update.table)?, store)?;

        store.mutate(&update.table, |table, rows| {
            // Evaluate all updates against the original rows, then check
            // uniqueness once every row is updated.
            let mut updated = Vec::new();
            for (index, row) in rows.iter_mut().enumerate() {
                if !update_mask[index] {
                    continue;
                }
                let mut new = row.clone();
                for (column, expr) in &assignments {
                    new[*column] = expr.evaluate(row)?;
                }
                *row = table.normalize_row(new)?;
                updated.push(index);
            }
            for &index in &updated {
                table.check_unique(rows, &rows[index], Some(index))?;
            }
            Ok(updated.len() as u64)
        })
    }

    /// MERGE: matches the source rows against the target rows by the ON
    /// predicate. For each source row, every matched target row takes the
    /// first applicable WHEN MATCHED clause, and an unmatched source row takes
    /// the first applicable WHEN NOT MATCHED clause. Returns the number of
    /// rows updated, deleted, or inserted.
    ///
    /// All clauses see the target rows as they were before the statement. A
    /// target row matched by several source rows is an error. Clauses of an
    /// unmatched source row see NULL target columns.
    fn merge(&self, merge: ast::Merge, store: &mut Memory) -> Result<u64> {
        let (source_scope, source) = self.merge_source(&merge.source, store)?;
        let table = store.must_get_table(&merge.target.name)?.clone();
        let mut scope =
            Scope::from_columns(merge.target.label(), table.columns.iter().map(|c| c.name.as_str()));
        scope.merge(source_scope)?;
        let predicate = scope.resolve(&merge.predicate)?;
        let clauses: Vec<(bool, Option<Expression>, MergeAction)> = merge
            .clauses
            .iter()
            .map(|clause| {
                let condition = clause.condition.as_ref().map(|c| scope.resolve(c)).transpose()?;
                let action = match &clause.action {
                    ast::MergeAction::Update(assignments) => MergeAction::Update(
                        assignments
                            .iter()
                            .map(|(column, expr)| Ok((table.column_index(column)?, scope.resolve(expr)?)))
                            .collect::<Result<_>>()?,
                    ),
                    ast::MergeAction::Delete => MergeAction::Delete,
                    ast::MergeAction::Insert { columns, values } => {
                        let column_map = Self::column_map(&table, columns.as_deref())?;
                        if values.len() > column_map.len()
                            || (columns.is_some() && values.len() != column_map.len())
                        {
                            return errschema!("column and value counts do not match");
                        }
                        let values = values.iter().map(|v| scope.resolve(v)).collect::<Result<_>>()?;
                        MergeAction::Insert(column_map, values)
                    }
                };
                Ok((clause.matched, condition, action))
            })
            .collect::<Result<_>>()?;

        store.mutate(&merge.target.name, |table, rows| {
            let original = rows.clone();
            let mut matched = vec![false; original.len()];
            let mut deleted = vec![false; original.len()];
            let mut updated = vec![false; original.len()];
            let mut inserted = Vec::new();
            let mut count = 0;

            for source_row in &source {
                let mut found = false;
                for (index, target) in original.iter().enumerate() {
                    let input = target.iter().chain(source_row).cloned().collect_vec();
                    if !matches(Some(&predicate), &input)? {
                        continue;
                    }
                    found = true;
                    if std::mem::replace(&mut matched[index], true) {
                        return errinvalid!("MERGE matched a target row with more than one source row");
                    }
                    for (_, condition, action) in clauses.iter().filter(|(matched, ..)| *matched) {
                        if !matches(condition.as_ref(), &input)? {
                            continue;
                        }
                        match action {
                            MergeAction::Update(assignments) => {
                                let mut row = target.clone();
                                for (column, expr) in assignments {
                                    row[*column] = expr.evaluate(&input)?;
                                }
                                rows[index] = table.normalize_row(row)?;
                                updated[index] = true;
                            }
                            MergeAction::Delete => deleted[index] = true,
                            MergeAction::Insert(..) => return errinvalid!("INSERT is not valid for matched rows"),
                        }
                        count += 1;
                        break;
                    }
                }
                if found {
                    continue;
                }

                let mut input = vec![Value::Null; table.columns.len()];
                input.extend(source_row.iter().cloned());
                for (_, condition, action) in clauses.iter().filter(|(matched, ..)| !*matched) {
                    if !matches(condition.as_ref(), &input)? {
                        continue;
                    }
                    let MergeAction::Insert(column_map, values) = action else {
                        return errinvalid!("only INSERT is valid for unmatched rows");
                    };
                    let values = values.iter().map(|v| v.evaluate(&input)).collect::<Result<_>>()?;
                    inserted.push(Self::build_row(table, column_map, values)?);
                    count += 1;
                    break;
                }
            }

            // Apply deletes and inserts, then check uniqueness of every
            // changed row against the final rows.
            let mut result = Vec::with_capacity(rows.len() + inserted.len());
            let mut changed = Vec::new();
            for (index, row) in std::mem::take(rows).into_iter().enumerate() {
                if deleted[index] {
                    continue;
                }
                if updated[index] {
                    changed.push(result.len());
                }
                result.push(row);
            }
            for row in inserted {
                changed.push(result.len());
                result.push(row);
            }
            for &index in &changed {
                table.check_unique(&result, &result[index], Some(index))?;
            }
            *rows = result;
            Ok(count)
        })
    }

    /// Maps INSERT value positions to table column indexes, for an optional
    /// column list.
    fn column_map(table: &Table, columns: Option<&[String]>) -> Result<Vec<usize>> {
        let Some(columns) = columns else {
            return Ok((0..table.columns.len()).collect());
        };
        let mut map = Vec::with_capacity(columns.len());
        for name in columns {
            let index = table.column_index(name)?;
            if map.contains(&index) {
                return errschema!("column {name} given multiple times");
            }
            map.push(index);
        }
        Ok(map)
    }

    /// Builds a table row from INSERT values, filling in defaults for missing
    /// columns and coercing values to the column types.
    fn build_row(table: &Table, column_map: &[usize], values: Vec<Value>) -> Result<Row> {
        let mut row: Vec<Option<Value>> = vec![None; table.columns.len()];
        for (value, index) in values.into_iter().zip(column_map) {
            row[*index] = Some(value);
        }
        let row = row
            .into_iter()
            .zip(&table.columns)
            .map(|(value, column)| match (value, &column.default) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => {
                    errconstraint!("no value given for column {} with no default", column.name)
                }
            })
            .collect::<Result<Row>>()?;
        table.normalize_row(row)
    }

    /// Creates a scope for a table's columns, qualified by the table name.
    fn table_scope(table: &Table) -> Scope {
        Scope::from_columns(&table.name, table.columns.iter().map(|c| c.name.as_str()))
    }
}

/// A resolved MERGE clause action.
enum MergeAction {
    Update(Vec<(usize, Expression)>),
    Delete,
    Insert(Vec<usize>, Vec<Expression>),
}

/// Evaluates an optional predicate against a row. NULL counts as false, and
/// non-boolean values are an error.
pub(super) fn matches(predicate: Option<&Expression>, row: &Row) -> Result<bool> {
    let Some(predicate) = predicate else {
        return Ok(true);
    };
    match predicate.evaluate(row)? {
        Value::Boolean(b) => Ok(b),
        Value::Null => Ok(false),
        value => errtype!("filter returned {value}, expected boolean"),
    }
}

/// Removes duplicate rows, keeping the first occurrence.
pub(super) fn distinct(rows: Vec<Row>) -> Vec<Row> {
    let mut seen = HashSet::new();
    rows.into_iter().filter(|row| seen.insert(row.clone())).collect()
}

/// A statement execution result.
pub enum ExecutionResult {
    CreateTable { name: String },
    DropTable { name: String, existed: bool },
    Delete { count: u64 },
    Insert { count: u64 },
    Merge { count: u64 },
    Update { count: u64 },
    Select { columns: Vec<String>, rows: Rows },
}

impl ExecutionResult {
    /// The number of rows affected by a DML statement, or 0 for other
    /// statements.
    pub fn count(&self) -> u64 {
        match self {
            Self::Delete { count }
            | Self::Insert { count }
            | Self::Merge { count }
            | Self::Update { count } => *count,
            Self::CreateTable { .. } | Self::DropTable { .. } | Self::Select { .. } => 0,
        }
    }
}

impl std::fmt::Debug for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateTable { name } => f.debug_struct("CreateTable").field("name", name).finish(),
            Self::DropTable { name, existed } => {
                f.debug_struct("DropTable").field("name", name).field("existed", existed).finish()
            }
            Self::Delete { count } => f.debug_struct("Delete").field("count", count).finish(),
            Self::Insert { count } => f.debug_struct("Insert").field("count", count).finish(),
            Self::Merge { count } => f.debug_struct("Merge").field("count", count).finish(),
            Self::Update { count } => f.debug_struct("Update").field("count", count).finish(),
            Self::Select { columns, .. } => {
                f.debug_struct("Select").field("columns", columns).finish_non_exhaustive()
            }
        }
    }
}

/// Returns the result column name for a label.
pub(super) fn column_name(label: &Label) -> String {
    label.name().unwrap_or("?").to_string()
}

#[cfg(test)]
mod tests {
    use itertools::Itertools as _;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::Error;
    use crate::sql::parser::Parser;

    /// Parses and executes a statement under the given dialect.
    fn execute(store: &mut Memory, dialect: (&str, u32), sql: &str) -> Result<ExecutionResult> {
        let dialect = DialectVersion::new(dialect.0, dialect.1)?;
        Executor::new(dialect).execute(Parser::parse(sql, dialect)?, store)
    }

    /// Executes a statement under PostgreSQL, returning the affected count.
    fn run(store: &mut Memory, sql: &str) -> Result<u64> {
        Ok(execute(store, ("postgresql", 16), sql)?.count())
    }

    fn rows(store: &Memory, table: &str) -> Result<Vec<Row>> {
        Ok(store.scan(table)?.to_vec())
    }

    /// A store with a table t (id, name, score) and two rows.
    fn setup() -> Result<Memory> {
        let mut store = Memory::new();
        run(
            &mut store,
            "CREATE TABLE t (id INT PRIMARY KEY, name VARCHAR(20) NOT NULL DEFAULT 'x' UNIQUE, score FLOAT)",
        )?;
        run(&mut store, "INSERT INTO t VALUES (1, 'a', 1.5), (2, 'b', NULL)")?;
        Ok(store)
    }

    #[test]
    fn create_table() -> Result<()> {
        let store = setup()?;
        let table = store.must_get_table("T")?;
        assert_eq!(
            table.columns.iter().map(|c| (c.name.as_str(), c.nullable)).collect_vec(),
            vec![("id", false), ("name", false), ("score", true)]
        );
        assert_eq!(table.columns[1].default, Some("x".into()));
        assert_eq!(table.columns[2].default, Some(Value::Null));
        Ok(())
    }

    #[test]
    fn create_duplicate_table() -> Result<()> {
        let mut store = setup()?;
        let result = run(&mut store, "CREATE TABLE t (id INT)");
        assert!(matches!(result, Err(Error::Schema(_))));
        Ok(())
    }

    #[test]
    fn drop_table() -> Result<()> {
        let mut store = setup()?;
        let result = execute(&mut store, ("postgresql", 16), "DROP TABLE t")?;
        assert!(matches!(result, ExecutionResult::DropTable { existed: true, .. }));
        let result = execute(&mut store, ("postgresql", 16), "DROP TABLE IF EXISTS t")?;
        assert!(matches!(result, ExecutionResult::DropTable { existed: false, .. }));
        assert!(matches!(run(&mut store, "DROP TABLE t"), Err(Error::Schema(_))));
        Ok(())
    }

    #[test]
    fn insert_defaults_and_coercion() -> Result<()> {
        let mut store = setup()?;
        assert_eq!(run(&mut store, "INSERT INTO t (score, id) VALUES (3, 3)")?, 1);
        assert_eq!(rows(&store, "t")?[2], vec![3.into(), "x".into(), 3.0.into()]);
        Ok(())
    }

    #[test]
    fn insert_errors() -> Result<()> {
        let mut store = setup()?;
        assert!(matches!(
            run(&mut store, "INSERT INTO t (id, missing) VALUES (3, 1)"),
            Err(Error::Schema(_))
        ));
        assert!(matches!(run(&mut store, "INSERT INTO t (id, name) VALUES (3)"), Err(Error::Schema(_))));
        assert!(matches!(
            run(&mut store, "INSERT INTO t VALUES ('three', 'c', 1)"),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            run(&mut store, "INSERT INTO t VALUES (3, NULL, 1)"),
            Err(Error::Constraint(_))
        ));
        assert!(matches!(run(&mut store, "INSERT INTO missing VALUES (1)"), Err(Error::Schema(_))));
        Ok(())
    }

    #[test]
    fn insert_is_atomic() -> Result<()> {
        let mut store = setup()?;
        let before = rows(&store, "t")?;
        let result = run(&mut store, "INSERT INTO t VALUES (3, 'c', 1), (4, 'd', 2), (1, 'e', 3)");
        assert!(matches!(result, Err(Error::Constraint(_))));
        assert_eq!(rows(&store, "t")?, before);

        // Unique columns are checked too, also within the inserted rows.
        let result = run(&mut store, "INSERT INTO t VALUES (3, 'c', 1), (4, 'c', 2)");
        assert!(matches!(result, Err(Error::Constraint(_))));
        assert_eq!(rows(&store, "t")?, before);
        Ok(())
    }

    #[test]
    fn on_conflict() -> Result<()> {
        let mut store = setup()?;
        let sql = "INSERT INTO t VALUES (1, 'z', 9), (3, 'c', 3) ON CONFLICT (id) DO NOTHING";
        assert_eq!(run(&mut store, sql)?, 1);
        assert_eq!(rows(&store, "t")?.len(), 3);
        assert_eq!(rows(&store, "t")?[0], vec![1.into(), "a".into(), 1.5.into()]);

        let sql = "INSERT INTO t VALUES (1, 'z', 9) ON CONFLICT (id) \
                   DO UPDATE SET name = excluded.name, score = t.score + excluded.score";
        assert_eq!(run(&mut store, sql)?, 1);
        assert_eq!(rows(&store, "t")?[0], vec![1.into(), "z".into(), 10.5.into()]);

        // The updated row must still satisfy the other unique keys.
        let sql = "INSERT INTO t VALUES (1, 'q', 0) ON CONFLICT (id) DO UPDATE SET name = 'b'";
        assert!(matches!(run(&mut store, sql), Err(Error::Constraint(_))));
        Ok(())
    }

    #[test]
    fn on_duplicate_key_update() -> Result<()> {
        let mut store = setup()?;
        let sql = "INSERT INTO t VALUES (2, 'b', 7) ON DUPLICATE KEY UPDATE score = VALUES(score), score = 8";
        assert_eq!(execute(&mut store, ("mysql", 8), sql)?.count(), 1);
        assert_eq!(rows(&store, "t")?[1], vec![2.into(), "b".into(), 8.0.into()]);

        // Without a conflict target, any unique key conflicts: here name.
        let sql = "INSERT INTO t VALUES (5, 'a', 0) ON DUPLICATE KEY UPDATE score = -1";
        assert_eq!(execute(&mut store, ("mysql", 8), sql)?.count(), 1);
        assert_eq!(rows(&store, "t")?[0], vec![1.into(), "a".into(), (-1.0).into()]);
        assert_eq!(rows(&store, "t")?.len(), 2);
        Ok(())
    }

    #[test]
    fn update() -> Result<()> {
        let mut store = setup()?;
        assert_eq!(run(&mut store, "UPDATE t SET score = id * 10 WHERE name <> 'a'")?, 1);
        assert_eq!(rows(&store, "t")?[1], vec![2.into(), "b".into(), 20.0.into()]);

        // Assignments see the original row, and swapping keys is fine since
        // uniqueness is checked after all rows are updated.
        assert_eq!(run(&mut store, "UPDATE t SET id = 3 - id, score = id")?, 2);
        assert_eq!(
            rows(&store, "t")?,
            vec![vec![2.into(), "a".into(), 1.0.into()], vec![1.into(), "b".into(), 2.0.into()]]
        );

        let before = rows(&store, "t")?;
        assert!(matches!(run(&mut store, "UPDATE t SET id = 1"), Err(Error::Constraint(_))));
        assert!(matches!(run(&mut store, "UPDATE t SET missing = 1"), Err(Error::Schema(_))));
        assert!(matches!(run(&mut store, "UPDATE t SET id = 5 WHERE name"), Err(Error::TypeMismatch(_))));
        assert_eq!(rows(&store, "t")?, before);
        Ok(())
    }

    #[test]
    fn delete() -> Result<()> {
        let mut store = setup()?;
        assert_eq!(run(&mut store, "DELETE FROM t WHERE score IS NULL")?, 1);
        assert_eq!(rows(&store, "t")?, vec![vec![1.into(), "a".into(), 1.5.into()]]);
        assert_eq!(execute(&mut store, ("sqlserver", 2019), "DELETE t")?.count(), 1);
        assert_eq!(rows(&store, "t")?, Vec::<Row>::new());
        assert!(matches!(run(&mut store, "DELETE FROM t WHERE nope = 1"), Err(Error::Schema(_))));
        Ok(())
    }

    #[test]
    fn insert_select() -> Result<()> {
        let mut store = setup()?;
        run(&mut store, "CREATE TABLE u (id INT PRIMARY KEY, name VARCHAR(20), score FLOAT DEFAULT 0)")?;
        assert_eq!(run(&mut store, "INSERT INTO u (id, name) SELECT id + 10, name FROM t WHERE id > 1")?, 1);
        assert_eq!(rows(&store, "u")?, vec![vec![12.into(), "b".into(), 0.0.into()]]);

        // A query can read the table it inserts into.
        assert_eq!(run(&mut store, "INSERT INTO u SELECT id + 1, name, score FROM u")?, 1);
        assert_eq!(rows(&store, "u")?.len(), 2);

        // Upserts apply to query rows too.
        let sql = "INSERT INTO t SELECT id - 10, 'c', 5 FROM u WHERE id = 12 ON CONFLICT (id) DO UPDATE SET score = excluded.score";
        assert_eq!(run(&mut store, sql)?, 1);
        assert_eq!(rows(&store, "t")?[1], vec![2.into(), "b".into(), 5.0.into()]);

        assert!(matches!(run(&mut store, "INSERT INTO u (id) SELECT id, name FROM t"), Err(Error::Schema(_))));
        assert!(matches!(run(&mut store, "INSERT INTO u SELECT id FROM missing"), Err(Error::Schema(_))));
        Ok(())
    }

    #[test]
    fn subquery_predicates() -> Result<()> {
        let mut store = setup()?;
        run(&mut store, "CREATE TABLE u (id INT PRIMARY KEY)")?;
        run(&mut store, "INSERT INTO u VALUES (2)")?;
        assert_eq!(run(&mut store, "UPDATE t SET score = 0 WHERE EXISTS (SELECT 1 FROM u WHERE u.id = t.id)")?, 1);
        assert_eq!(rows(&store, "t")?[1], vec![2.into(), "b".into(), 0.0.into()]);
        assert_eq!(run(&mut store, "DELETE FROM t WHERE id NOT IN (SELECT id FROM u)")?, 1);
        assert_eq!(rows(&store, "t")?, vec![vec![2.into(), "b".into(), 0.0.into()]]);

        // Columns are checked even when no row is scanned.
        run(&mut store, "DELETE FROM t")?;
        let result = run(&mut store, "DELETE FROM t WHERE nope IN (SELECT id FROM u)");
        assert!(matches!(result, Err(Error::Schema(_))));
        Ok(())
    }

    #[test]
    fn merge() -> Result<()> {
        let mut store = setup()?;
        let sqlserver = ("sqlserver", 2019);
        let sql = "MERGE INTO t USING (SELECT 1 AS id, 'z' AS name UNION ALL SELECT 3, 'c') AS s ON t.id = s.id \
                   WHEN MATCHED THEN UPDATE SET name = s.name, score = t.score * 2 \
                   WHEN NOT MATCHED THEN INSERT (id, name) VALUES (s.id, s.name)";
        let result = execute(&mut store, sqlserver, sql)?;
        assert!(matches!(result, ExecutionResult::Merge { count: 2 }));
        assert_eq!(
            rows(&store, "t")?,
            vec![
                vec![1.into(), "z".into(), 3.0.into()],
                vec![2.into(), "b".into(), Value::Null],
                vec![3.into(), "c".into(), Value::Null],
            ]
        );

        // The first applicable clause wins, and conditions can skip rows.
        let sql = "MERGE INTO t USING t AS s ON t.id = s.id \
                   WHEN MATCHED AND t.score IS NULL AND t.id = 2 THEN DELETE \
                   WHEN MATCHED AND t.id = 2 THEN UPDATE SET name = 'never' \
                   WHEN MATCHED AND t.score > 1 THEN UPDATE SET score = 0";
        assert_eq!(execute(&mut store, sqlserver, sql)?.count(), 2);
        assert_eq!(
            rows(&store, "t")?,
            vec![vec![1.into(), "z".into(), 0.0.into()], vec![3.into(), "c".into(), Value::Null]]
        );
        Ok(())
    }

    #[test]
    fn merge_errors() -> Result<()> {
        let mut store = setup()?;
        let before = rows(&store, "t")?;
        let kind = |result: &Result<ExecutionResult>| match result {
            Err(Error::InvalidOperation(_)) => "invalid",
            Err(Error::Constraint(_)) => "constraint",
            Err(Error::Schema(_)) => "schema",
            _ => "other",
        };
        for (sql, expect) in [
            // Two source rows match the same target row.
            (
                "MERGE INTO t USING (SELECT 1 AS id UNION ALL SELECT 1) AS s ON t.id = s.id \
                 WHEN MATCHED THEN DELETE",
                "invalid",
            ),
            // The updated row collides with another row's unique name.
            (
                "MERGE INTO t USING (SELECT 1 AS id) AS s ON t.id = s.id \
                 WHEN MATCHED THEN UPDATE SET name = 'b'",
                "constraint",
            ),
            // The inserted rows collide with each other.
            (
                "MERGE INTO t USING (SELECT 5 AS id UNION ALL SELECT 6) AS s ON t.id = s.id \
                 WHEN NOT MATCHED THEN INSERT (id, name) VALUES (s.id, 'same')",
                "constraint",
            ),
            (
                "MERGE INTO t USING (SELECT 1 AS id) AS s ON t.id = s.nope WHEN MATCHED THEN DELETE",
                "schema",
            ),
            (
                "MERGE INTO t USING (SELECT 1 AS id) AS t ON t.id = 1 WHEN MATCHED THEN DELETE",
                "schema",
            ),
        ] {
            let result = execute(&mut store, ("sqlserver", 2019), sql);
            assert_eq!(kind(&result), expect, "{sql}: {result:?}");
            assert_eq!(rows(&store, "t")?, before);
        }
        Ok(())
    }
}
