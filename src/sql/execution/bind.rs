use crate::client::Parameters;
use crate::error::Result;
use crate::sql::parser::ast;

/// Replaces every parameter placeholder in a statement with the value of its
/// matching input parameter, as a literal. Errors if a placeholder has no
/// matching parameter.
pub fn bind(statement: ast::Statement, parameters: &Parameters) -> Result<ast::Statement> {
    let bind_expr = |expr: ast::Expression| bind_expression(expr, parameters);
    Ok(match statement {
        ast::Statement::CreateTable { name, columns } => ast::Statement::CreateTable {
            name,
            columns: columns
                .into_iter()
                .map(|mut column| {
                    column.default = column.default.map(bind_expr).transpose()?;
                    Ok(column)
                })
                .collect::<Result<_>>()?,
        },
        statement @ ast::Statement::DropTable { .. } => statement,
        ast::Statement::Delete(mut delete) => {
            delete.predicate = delete.predicate.map(bind_expr).transpose()?;
            ast::Statement::Delete(delete)
        }
        ast::Statement::Insert(mut insert) => {
            insert.values = insert
                .values
                .into_iter()
                .map(|values| values.into_iter().map(bind_expr).collect())
                .collect::<Result<_>>()?;
            insert.select = insert.select.map(|select| bind_boxed(select, parameters)).transpose()?;
            insert.on_conflict_assignments = insert
                .on_conflict_assignments
                .into_iter()
                .map(|(column, expr)| Ok((column, bind_expr(expr)?)))
                .collect::<Result<_>>()?;
            ast::Statement::Insert(insert)
        }
        ast::Statement::Select(select) => ast::Statement::Select(bind_select(select, parameters)?),
        ast::Statement::Update(mut update) => {
            update.assignments = update
                .assignments
                .into_iter()
                .map(|(column, expr)| Ok((column, bind_expr(expr)?)))
                .collect::<Result<_>>()?;
            update.predicate = update.predicate.map(bind_expr).transpose()?;
            ast::Statement::Update(update)
        }
        ast::Statement::Merge(mut merge) => {
            merge.source = match merge.source {
                source @ ast::MergeSource::Table(_) => source,
                ast::MergeSource::Select { select, alias } => {
                    ast::MergeSource::Select { select: bind_boxed(select, parameters)?, alias }
                }
            };
            merge.predicate = bind_expr(merge.predicate)?;
            for clause in &mut merge.clauses {
                clause.condition = clause.condition.take().map(bind_expr).transpose()?;
                match &mut clause.action {
                    ast::MergeAction::Update(assignments) => {
                        for expr in assignments.values_mut() {
                            *expr = bind_expr(expr.clone())?;
                        }
                    }
                    ast::MergeAction::Insert { values, .. } => {
                        *values = std::mem::take(values).into_iter().map(bind_expr).collect::<Result<_>>()?;
                    }
                    ast::MergeAction::Delete => {}
                }
            }
            ast::Statement::Merge(merge)
        }
    })
}

/// Binds the placeholders in a boxed SELECT.
fn bind_boxed(select: Box<ast::Select>, parameters: &Parameters) -> Result<Box<ast::Select>> {
    Ok(Box::new(bind_select(*select, parameters)?))
}

/// Binds the placeholders in a SELECT, including its CTEs and UNION branches.
fn bind_select(mut select: ast::Select, parameters: &Parameters) -> Result<ast::Select> {
    let bind_expr = |expr: ast::Expression| bind_expression(expr, parameters);
    for cte in &mut select.ctes {
        *cte.body = bind_select(std::mem::take(&mut *cte.body), parameters)?;
    }
    select.columns = select
        .columns
        .into_iter()
        .map(|(expr, alias)| Ok((bind_expr(expr)?, alias)))
        .collect::<Result<_>>()?;
    for join in &mut select.joins {
        join.predicate = join.predicate.take().map(bind_expr).transpose()?;
    }
    select.predicate = select.predicate.map(bind_expr).transpose()?;
    select.group_by = select.group_by.into_iter().map(bind_expr).collect::<Result<_>>()?;
    select.having = select.having.map(bind_expr).transpose()?;
    for union in &mut select.unions {
        union.select = bind_select(std::mem::take(&mut union.select), parameters)?;
    }
    select.order_by = select
        .order_by
        .into_iter()
        .map(|(expr, direction)| Ok((bind_expr(expr)?, direction)))
        .collect::<Result<_>>()?;
    select.offset = select.offset.map(bind_expr).transpose()?;
    select.limit = select.limit.map(bind_expr).transpose()?;
    Ok(select)
}

/// Replaces the placeholders in an expression, including its subqueries.
fn bind_expression(expr: ast::Expression, parameters: &Parameters) -> Result<ast::Expression> {
    expr.transform(
        &|expr| match expr {
            ast::Expression::Parameter(placeholder) => {
                Ok(ast::Expression::Literal(parameters.lookup(&placeholder)?.into()))
            }
            ast::Expression::Exists(select) => {
                Ok(ast::Expression::Exists(bind_boxed(select, parameters)?))
            }
            ast::Expression::InSelect(expr, select) => {
                Ok(ast::Expression::InSelect(expr, bind_boxed(select, parameters)?))
            }
            expr => Ok(expr),
        },
        &Ok,
    )
}
