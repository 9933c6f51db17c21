use std::collections::BTreeMap;
use std::iter::Peekable;
use std::ops::Add;

use super::ast::{self, Literal, Placeholder};
use super::{Keyword, Lexer, Token};
use crate::error::Result;
use crate::sql::dialect::{DialectVersion, HintStyle};
use crate::sql::types::DataType;
use crate::{errinvalid, errsyntax, errunsupported};

/// The SQL parser takes tokens from the lexer and parses the SQL syntax into an
/// abstract syntax tree (AST). The AST represents the syntactic structure of a
/// SQL statement. It does not know whether tables or columns exist, that is
/// left to the executor.
///
/// The parser is bound to a dialect version. Every dialect-specific construct
/// (paging, CTEs, hints, upserts, etc) is checked against the dialect catalog
/// as soon as it's recognized, and rejected with an UnsupportedFeature error if
/// the dialect version lacks it. Syntax errors carry the byte offset of the
/// offending token.
pub struct Parser<'a> {
    lexer: Peekable<Lexer<'a>>,
    dialect: DialectVersion,
    /// The byte offset of the last consumed token.
    position: usize,
    /// The input length, used as the position of end-of-input errors.
    input_len: usize,
    /// The next positional ? parameter index.
    positional: usize,
    /// Whether we're parsing upsert assignments, where excluded.col and
    /// VALUES(col) refer to the conflicting row.
    upsert: bool,
}

/// Keywords that can also be used as identifiers, e.g. a column named "key".
fn is_unreserved(keyword: Keyword) -> bool {
    use Keyword::*;
    matches!(
        keyword,
        Conflict
            | Do
            | Duplicate
            | First
            | Force
            | Ignore
            | Index
            | Key
            | Matched
            | Materialized
            | Merge
            | Next
            | Nothing
            | Only
            | Option
            | Recursive
            | Row
            | Rows
            | Top
            | Use
    )
}

impl Parser<'_> {
    /// Parses the input string into a SQL statement AST for the given dialect
    /// version. The entire string must be parsed as a single statement, ending
    /// with an optional semicolon.
    pub fn parse(statement: &str, dialect: DialectVersion) -> Result<ast::Statement> {
        let mut parser = Parser::new(statement, dialect);
        let statement = parser.parse_statement()?;
        parser.skip(Token::Semicolon);
        if let Some(token) = parser.lexer.next().transpose()? {
            return errsyntax!(token.0, "unexpected token {}", token.1);
        }
        Ok(statement)
    }

    /// Creates a new parser for the given raw SQL string.
    fn new(statement: &str, dialect: DialectVersion) -> Parser<'_> {
        Parser {
            lexer: Lexer::new(statement, dialect.dialect).peekable(),
            dialect,
            position: 0,
            input_len: statement.len(),
            positional: 0,
            upsert: false,
        }
    }

    /// Fetches the next lexer token, or errors if none is found.
    fn next(&mut self) -> Result<Token> {
        match self.lexer.next().transpose()? {
            Some((position, token)) => {
                self.position = position;
                Ok(token)
            }
            None => errsyntax!(self.input_len, "unexpected end of input"),
        }
    }

    /// Returns the next identifier, or errors if not found. Unreserved
    /// keywords are accepted as identifiers.
    fn next_ident(&mut self) -> Result<String> {
        match self.next()? {
            Token::Ident(ident) => Ok(ident),
            Token::Keyword(keyword) if is_unreserved(keyword) => {
                Ok(keyword.to_string().to_lowercase())
            }
            token => errsyntax!(self.position, "expected identifier, got {token}"),
        }
    }

    /// Returns the next lexer token if it satisfies the predicate.
    fn next_if(&mut self, predicate: impl Fn(&Token) -> bool) -> Option<Token> {
        self.peek().ok()?.filter(|t| predicate(t))?;
        self.next().ok()
    }

    /// Passes the next lexer token through the closure, consuming it if the
    /// closure returns Some. Returns the result of the closure.
    fn next_if_map<T>(&mut self, f: impl Fn(&Token) -> Option<T>) -> Option<T> {
        self.peek().ok()?.map(f)?.inspect(|_| drop(self.next()))
    }

    /// Returns the next keyword if there is one.
    fn next_if_keyword(&mut self) -> Option<Keyword> {
        self.next_if_map(|token| match token {
            Token::Keyword(keyword) => Some(*keyword),
            _ => None,
        })
    }

    /// Consumes the next lexer token if it is the given token, returning true.
    fn next_is(&mut self, token: Token) -> bool {
        self.next_if(|t| t == &token).is_some()
    }

    /// Consumes the next lexer token if it's the expected token, or errors.
    fn expect(&mut self, expect: Token) -> Result<()> {
        let token = self.next()?;
        if token != expect {
            return errsyntax!(self.position, "expected token {expect}, found {token}");
        }
        Ok(())
    }

    /// Consumes the next lexer token if it is the given token. Equivalent to
    /// next_is(), but expresses intent better.
    fn skip(&mut self, token: Token) {
        self.next_is(token);
    }

    /// Peeks the next lexer token if any, but transposes it for convenience.
    fn peek(&mut self) -> Result<Option<&Token>> {
        self.lexer
            .peek()
            .map(|r| r.as_ref().map(|(_, token)| token).map_err(|err| err.clone()))
            .transpose()
    }

    /// Peeks the token after the next one, if any. Lexer errors are ignored
    /// here, and surface when the token is consumed.
    fn peek_second(&self) -> Option<Token> {
        let mut lexer = self.lexer.clone();
        lexer.next();
        lexer.next().and_then(|r| r.ok()).map(|(_, token)| token)
    }

    /// Returns the byte offset of the next token, or the input length.
    fn peek_position(&mut self) -> usize {
        match self.lexer.peek() {
            Some(Ok((position, _))) => *position,
            _ => self.input_len,
        }
    }

    /// Errors if the dialect doesn't use the given hint style.
    fn require_hints(&self, style: HintStyle, feature: &str) -> Result<()> {
        if self.dialect.dialect.hints != style {
            return errunsupported!(self.dialect, "{feature}");
        }
        Ok(())
    }

    /// Parses a SQL statement.
    fn parse_statement(&mut self) -> Result<ast::Statement> {
        let position = self.peek_position();
        let Some(token) = self.peek()? else {
            return errsyntax!(self.input_len, "unexpected end of input");
        };
        match token {
            Token::Keyword(Keyword::Create) => self.parse_create_table(),
            Token::Keyword(Keyword::Drop) => self.parse_drop_table(),
            Token::Keyword(Keyword::Delete) => self.parse_delete(),
            Token::Keyword(Keyword::Insert) => self.parse_insert(),
            Token::Keyword(Keyword::Select | Keyword::With) => {
                self.parse_select().map(ast::Statement::Select)
            }
            Token::Keyword(Keyword::Update) => self.parse_update(),
            Token::Keyword(Keyword::Merge) => self.parse_merge(),
            token => errsyntax!(position, "unexpected token {token}"),
        }
    }

    /// Parses a CREATE TABLE statement.
    fn parse_create_table(&mut self) -> Result<ast::Statement> {
        self.expect(Keyword::Create.into())?;
        self.expect(Keyword::Table.into())?;
        let name = self.parse_table_name()?;
        self.expect(Token::OpenParen)?;
        let mut columns: Vec<ast::Column> = Vec::new();
        loop {
            match self.peek()? {
                // Table constraint: PRIMARY KEY (a, b, ...).
                Some(Token::Keyword(Keyword::Primary)) => {
                    self.next()?;
                    self.expect(Keyword::Key.into())?;
                    for key in self.parse_ident_list()? {
                        let Some(column) =
                            columns.iter_mut().find(|c| c.name.eq_ignore_ascii_case(&key))
                        else {
                            return errsyntax!(self.position, "unknown primary key column {key}");
                        };
                        column.primary_key = true;
                    }
                }
                // Table constraint: UNIQUE (a).
                Some(Token::Keyword(Keyword::Unique)) => {
                    self.next()?;
                    for key in self.parse_ident_list()? {
                        let Some(column) =
                            columns.iter_mut().find(|c| c.name.eq_ignore_ascii_case(&key))
                        else {
                            return errsyntax!(self.position, "unknown unique column {key}");
                        };
                        column.unique = true;
                    }
                }
                _ => columns.push(self.parse_create_table_column()?),
            }
            if !self.next_is(Token::Comma) {
                break;
            }
        }
        self.expect(Token::CloseParen)?;
        Ok(ast::Statement::CreateTable { name, columns })
    }

    /// Parses a CREATE TABLE column definition.
    fn parse_create_table_column(&mut self) -> Result<ast::Column> {
        let name = self.next_ident()?;
        let type_name = self.next_ident()?;
        let Some(datatype) = DataType::from_type_name(&type_name) else {
            return errsyntax!(self.position, "unknown datatype {type_name}");
        };
        // Type arguments such as VARCHAR(255) or DECIMAL(10, 2) are ignored.
        if self.next_is(Token::OpenParen) {
            loop {
                match self.next()? {
                    Token::Number(_) => {}
                    token => return errsyntax!(self.position, "unexpected token {token}"),
                }
                if !self.next_is(Token::Comma) {
                    break;
                }
            }
            self.expect(Token::CloseParen)?;
        }

        let mut column = ast::Column {
            name,
            datatype,
            primary_key: false,
            nullable: None,
            default: None,
            unique: false,
        };
        while let Some(keyword) = self.next_if_keyword() {
            match keyword {
                Keyword::Primary => {
                    self.expect(Keyword::Key.into())?;
                    column.primary_key = true;
                }
                Keyword::Null => {
                    if column.nullable.is_some() {
                        return errsyntax!(self.position, "nullability already set for {}", column.name);
                    }
                    column.nullable = Some(true)
                }
                Keyword::Not => {
                    self.expect(Keyword::Null.into())?;
                    if column.nullable.is_some() {
                        return errsyntax!(self.position, "nullability already set for {}", column.name);
                    }
                    column.nullable = Some(false)
                }
                Keyword::Default => column.default = Some(self.parse_expression()?),
                Keyword::Unique => column.unique = true,
                keyword => return errsyntax!(self.position, "unexpected keyword {keyword}"),
            }
        }
        Ok(column)
    }

    /// Parses a DROP TABLE statement.
    fn parse_drop_table(&mut self) -> Result<ast::Statement> {
        self.expect(Keyword::Drop.into())?;
        self.expect(Keyword::Table.into())?;
        let mut if_exists = false;
        if self.next_is(Keyword::If.into()) {
            self.expect(Keyword::Exists.into())?;
            if_exists = true;
        }
        let name = self.parse_table_name()?;
        Ok(ast::Statement::DropTable { name, if_exists })
    }

    /// Parses a DELETE statement. DELETE table without FROM is accepted where
    /// the dialect allows it.
    fn parse_delete(&mut self) -> Result<ast::Statement> {
        self.expect(Keyword::Delete.into())?;
        if !self.next_is(Keyword::From.into()) && !self.dialect.dialect.delete_without_from {
            return errunsupported!(self.dialect, "DELETE without FROM");
        }
        let table = self.parse_table_name()?;
        let predicate = self.parse_where_clause()?;
        Ok(ast::Statement::Delete(ast::Delete { table, predicate }))
    }

    /// Parses an INSERT statement, with either VALUES rows or a SELECT query,
    /// including the ON CONFLICT and ON DUPLICATE KEY UPDATE upsert forms.
    fn parse_insert(&mut self) -> Result<ast::Statement> {
        self.expect(Keyword::Insert.into())?;
        self.expect(Keyword::Into.into())?;
        let table = self.parse_table_name()?;

        let mut columns = None;
        if self.peek()? == Some(&Token::OpenParen) {
            columns = Some(self.parse_ident_list()?);
        }

        let mut values = Vec::new();
        let mut select = None;
        if matches!(self.peek()?, Some(Token::Keyword(Keyword::Select | Keyword::With))) {
            select = Some(Box::new(self.parse_select()?));
        } else {
            self.expect(Keyword::Values.into())?;
            loop {
                values.push(self.parse_value_row()?);
                if !self.next_is(Token::Comma) {
                    break;
                }
            }
        }

        let mut insert = ast::Insert {
            table,
            columns,
            values,
            select,
            conflict_target: Vec::new(),
            on_conflict_assignments: Vec::new(),
            ignore_conflicts: false,
        };
        if !self.next_is(Keyword::On.into()) {
            return Ok(ast::Statement::Insert(insert));
        }
        match self.next()? {
            Token::Keyword(Keyword::Conflict) => {
                if !self.dialect.dialect.on_conflict {
                    return errunsupported!(self.dialect, "ON CONFLICT");
                }
                if self.peek()? == Some(&Token::OpenParen) {
                    insert.conflict_target = self.parse_ident_list()?;
                }
                self.expect(Keyword::Do.into())?;
                if self.next_is(Keyword::Nothing.into()) {
                    insert.ignore_conflicts = true;
                } else {
                    self.expect(Keyword::Update.into())?;
                    self.expect(Keyword::Set.into())?;
                    insert.on_conflict_assignments = self.parse_upsert_assignments()?;
                }
            }
            Token::Keyword(Keyword::Duplicate) => {
                if !self.dialect.dialect.on_duplicate_key_update {
                    return errunsupported!(self.dialect, "ON DUPLICATE KEY UPDATE");
                }
                self.expect(Keyword::Key.into())?;
                self.expect(Keyword::Update.into())?;
                insert.on_conflict_assignments = self.parse_upsert_assignments()?;
            }
            token => return errsyntax!(self.position, "unexpected token {token}"),
        }
        Ok(ast::Statement::Insert(insert))
    }

    /// Parses a parenthesized row of VALUES expressions.
    fn parse_value_row(&mut self) -> Result<Vec<ast::Expression>> {
        self.expect(Token::OpenParen)?;
        let mut row = Vec::new();
        loop {
            row.push(self.parse_expression()?);
            if !self.next_is(Token::Comma) {
                break;
            }
        }
        self.expect(Token::CloseParen)?;
        Ok(row)
    }

    /// Parses upsert assignments. A column assigned more than once keeps the
    /// last assignment, in the position of the first.
    fn parse_upsert_assignments(&mut self) -> Result<Vec<(String, ast::Expression)>> {
        self.upsert = true;
        let mut assignments: Vec<(String, ast::Expression)> = Vec::new();
        loop {
            let column = self.next_ident()?;
            self.expect(Token::Equal)?;
            let expr = self.parse_expression()?;
            match assignments.iter_mut().find(|(c, _)| c.eq_ignore_ascii_case(&column)) {
                Some(assignment) => assignment.1 = expr,
                None => assignments.push((column, expr)),
            }
            if !self.next_is(Token::Comma) {
                break;
            }
        }
        self.upsert = false;
        Ok(assignments)
    }

    /// Parses an UPDATE statement.
    fn parse_update(&mut self) -> Result<ast::Statement> {
        self.expect(Keyword::Update.into())?;
        let table = self.parse_table_name()?;
        self.expect(Keyword::Set.into())?;
        let assignments = self.parse_assignments()?;
        let predicate = self.parse_where_clause()?;
        Ok(ast::Statement::Update(ast::Update { table, assignments, predicate }))
    }

    /// Parses SET assignments, after SET. A table qualifier on the column
    /// is dropped.
    fn parse_assignments(&mut self) -> Result<BTreeMap<String, ast::Expression>> {
        let mut assignments = BTreeMap::new();
        loop {
            let mut column = self.next_ident()?;
            if self.next_is(Token::Period) {
                column = self.next_ident()?;
            }
            self.expect(Token::Equal)?;
            let expr = self.parse_expression()?;
            if assignments.contains_key(&column) {
                return errsyntax!(self.position, "column {column} set multiple times");
            }
            assignments.insert(column, expr);
            if !self.next_is(Token::Comma) {
                break;
            }
        }
        Ok(assignments)
    }

    /// Parses a MERGE statement, where the dialect version has it:
    ///
    /// MERGE [INTO] target [[AS] alias]
    /// USING { table [[AS] alias] | (SELECT ...) [AS] alias } ON predicate
    /// WHEN MATCHED [AND condition] THEN { UPDATE SET ... | DELETE }
    /// WHEN NOT MATCHED [BY TARGET] [AND condition] THEN INSERT [(columns)] VALUES (...)
    ///
    /// WHEN clauses can be given in any order and number, but at least one
    /// is required.
    fn parse_merge(&mut self) -> Result<ast::Statement> {
        self.expect(Keyword::Merge.into())?;
        if !self.dialect.supports_merge() {
            return errunsupported!(self.dialect, "MERGE");
        }
        self.skip(Keyword::Into.into());
        let target = self.parse_table_ref()?;
        self.expect(Keyword::Using.into())?;
        let source = if self.next_is(Token::OpenParen) {
            let select = Box::new(self.parse_select()?);
            self.expect(Token::CloseParen)?;
            self.skip(Keyword::As.into());
            ast::MergeSource::Select { select, alias: self.next_ident()? }
        } else {
            ast::MergeSource::Table(self.parse_table_ref()?)
        };
        self.expect(Keyword::On.into())?;
        let predicate = self.parse_expression()?;

        let mut clauses = Vec::new();
        while self.next_is(Keyword::When.into()) {
            let matched = !self.next_is(Keyword::Not.into());
            self.expect(Keyword::Matched.into())?;
            if !matched && self.next_is(Keyword::By.into()) {
                let by = self.next_ident()?;
                if !by.eq_ignore_ascii_case("target") {
                    return errsyntax!(self.position, "expected TARGET, got {by}");
                }
            }
            let mut condition = None;
            if self.next_is(Keyword::And.into()) {
                condition = Some(self.parse_expression()?);
            }
            self.expect(Keyword::Then.into())?;
            let action = match (matched, self.next()?) {
                (true, Token::Keyword(Keyword::Update)) => {
                    self.expect(Keyword::Set.into())?;
                    ast::MergeAction::Update(self.parse_assignments()?)
                }
                (true, Token::Keyword(Keyword::Delete)) => ast::MergeAction::Delete,
                (false, Token::Keyword(Keyword::Insert)) => {
                    let mut columns = None;
                    if self.peek()? == Some(&Token::OpenParen) {
                        columns = Some(self.parse_ident_list()?);
                    }
                    self.expect(Keyword::Values.into())?;
                    ast::MergeAction::Insert { columns, values: self.parse_value_row()? }
                }
                (true, token) => {
                    return errsyntax!(self.position, "expected UPDATE or DELETE, got {token}");
                }
                (false, token) => return errsyntax!(self.position, "expected INSERT, got {token}"),
            };
            clauses.push(ast::MergeClause { matched, condition, action });
        }
        if clauses.is_empty() {
            return errsyntax!(self.peek_position(), "MERGE requires a WHEN clause");
        }
        Ok(ast::Statement::Merge(ast::Merge { target, source, predicate, clauses }))
    }

    /// Parses a SELECT statement, with an optional WITH prefix.
    fn parse_select(&mut self) -> Result<ast::Select> {
        let ctes = self.parse_with_clause()?;
        let mut select = self.parse_select_core()?;
        select.ctes = ctes;

        while self.next_is(Keyword::Union.into()) {
            let all = self.next_is(Keyword::All.into());
            let branch = self.parse_select_core()?;
            select.unions.push(ast::Union { all, select: branch });
        }

        select.order_by = self.parse_order_by_clause()?;
        self.parse_paging(&mut select)?;
        select.query_hints = self.parse_query_hints()?;
        Ok(select)
    }

    /// Parses a SELECT query up to and including HAVING.
    fn parse_select_core(&mut self) -> Result<ast::Select> {
        self.expect(Keyword::Select.into())?;
        let mut select = ast::Select::default();
        select.limit = self.parse_top_clause()?;
        if self.next_is(Keyword::Distinct.into()) {
            select.distinct = true;
        } else {
            self.skip(Keyword::All.into());
        }
        if select.limit.is_none() {
            select.limit = self.parse_top_clause()?;
        }
        select.columns = self.parse_select_columns()?;
        if self.next_is(Keyword::From.into()) {
            select.source = Some(self.parse_table_ref()?);
            select.joins = self.parse_joins()?;
        }
        select.predicate = self.parse_where_clause()?;
        select.group_by = self.parse_group_by_clause()?;
        select.having = self.parse_having_clause()?;
        Ok(select)
    }

    /// Parses a WITH clause, if any.
    fn parse_with_clause(&mut self) -> Result<Vec<ast::CommonTableExpression>> {
        if !self.next_is(Keyword::With.into()) {
            return Ok(Vec::new());
        }
        if !self.dialect.supports_cte() {
            return errunsupported!(self.dialect, "WITH common table expressions");
        }
        let recursive = self.next_is(Keyword::Recursive.into());
        if recursive && !self.dialect.supports_recursive_cte() {
            return errunsupported!(self.dialect, "WITH RECURSIVE");
        }

        let mut ctes = Vec::new();
        loop {
            let name = self.next_ident()?;
            let mut columns = Vec::new();
            if self.peek()? == Some(&Token::OpenParen) {
                columns = self.parse_ident_list()?;
            }
            self.expect(Keyword::As.into())?;

            let mut materialization = None;
            if self.next_is(Keyword::Materialized.into()) {
                materialization = Some(ast::Materialization::Materialized);
            } else if self.next_is(Keyword::Not.into()) {
                self.expect(Keyword::Materialized.into())?;
                materialization = Some(ast::Materialization::NotMaterialized);
            }
            if materialization.is_some() && !self.dialect.dialect.materialized_hint {
                return errunsupported!(self.dialect, "MATERIALIZED hint");
            }

            self.expect(Token::OpenParen)?;
            let body = self.parse_select()?;
            if !body.ctes.is_empty() {
                return errsyntax!(self.position, "nested WITH clause in CTE {name}");
            }
            self.expect(Token::CloseParen)?;
            ctes.push(ast::CommonTableExpression {
                name,
                columns,
                recursive,
                materialization,
                body: Box::new(body),
            });
            if !self.next_is(Token::Comma) {
                break;
            }
        }
        Ok(ctes)
    }

    /// Parses a TOP n or TOP (n) clause, if any.
    fn parse_top_clause(&mut self) -> Result<Option<ast::Expression>> {
        if !self.next_is(Keyword::Top.into()) {
            return Ok(None);
        }
        if !self.dialect.dialect.top {
            return errunsupported!(self.dialect, "SELECT TOP");
        }
        // Only take an atom, otherwise TOP 5 * would parse as a multiplication.
        Ok(Some(self.parse_expression_atom()?))
    }

    /// Parses the SELECT columns, with optional aliases.
    fn parse_select_columns(&mut self) -> Result<Vec<(ast::Expression, Option<String>)>> {
        let mut columns = Vec::new();
        loop {
            let expr = self.parse_expression()?;
            let mut alias = None;
            if expr != ast::Expression::All
                && (self.next_is(Keyword::As.into())
                    || matches!(self.peek()?, Some(Token::Ident(_))))
            {
                alias = Some(self.next_ident()?);
            }
            columns.push((expr, alias));
            if !self.next_is(Token::Comma) {
                break;
            }
        }
        Ok(columns)
    }

    /// Parses a table name. Schema qualifiers (e.g. dbo.users) are dropped.
    fn parse_table_name(&mut self) -> Result<String> {
        let mut name = self.next_ident()?;
        while self.next_is(Token::Period) {
            name = self.next_ident()?;
        }
        Ok(name)
    }

    /// Parses a FROM or JOIN table reference, with optional alias and hints.
    fn parse_table_ref(&mut self) -> Result<ast::TableRef> {
        let name = self.parse_table_name()?;
        let mut alias = None;
        if self.next_is(Keyword::As.into()) || matches!(self.peek()?, Some(Token::Ident(_))) {
            alias = Some(self.next_ident()?);
        }
        let hints = self.parse_table_hints()?;
        Ok(ast::TableRef { name, alias, hints })
    }

    /// Parses table hints following a table reference: SQL Server WITH (...)
    /// and legacy (...) table hints, or MySQL USE/IGNORE/FORCE INDEX hints.
    fn parse_table_hints(&mut self) -> Result<Vec<ast::TableHint>> {
        let mut hints = Vec::new();
        loop {
            match self.peek()? {
                Some(Token::Keyword(Keyword::With)) => {
                    self.require_hints(HintStyle::Table, "WITH table hints")?;
                    self.next()?;
                    hints.extend(self.parse_table_hint_list()?);
                }
                Some(Token::OpenParen) => {
                    self.require_hints(HintStyle::Table, "table hints")?;
                    hints.extend(self.parse_table_hint_list()?);
                }
                Some(Token::Keyword(Keyword::Use | Keyword::Ignore | Keyword::Force)) => {
                    self.require_hints(HintStyle::Index, "index hints")?;
                    hints.push(self.parse_index_hint()?);
                }
                _ => return Ok(hints),
            }
        }
    }

    /// Parses a parenthesized list of SQL Server table hints, e.g.
    /// (NOLOCK, INDEX(ix_name)). Hint names are uppercased.
    fn parse_table_hint_list(&mut self) -> Result<Vec<ast::TableHint>> {
        self.expect(Token::OpenParen)?;
        let mut hints = Vec::new();
        loop {
            let mut hint = match self.next()? {
                Token::Ident(ident) => ident.to_uppercase(),
                Token::Keyword(keyword) => keyword.to_string(),
                token => return errsyntax!(self.position, "expected table hint, got {token}"),
            };
            if self.next_is(Token::Equal) {
                hint = format!("{hint}({})", self.next_ident()?);
            } else if self.peek()? == Some(&Token::OpenParen) {
                hint = format!("{hint}({})", self.parse_ident_list()?.join(", "));
            }
            hints.push(ast::TableHint::Table(hint));
            if !self.next_is(Token::Comma) {
                break;
            }
        }
        self.expect(Token::CloseParen)?;
        Ok(hints)
    }

    /// Parses a MySQL index hint, e.g. FORCE INDEX FOR JOIN (idx).
    fn parse_index_hint(&mut self) -> Result<ast::TableHint> {
        let action = match self.next()? {
            Token::Keyword(Keyword::Use) => ast::IndexHintAction::Use,
            Token::Keyword(Keyword::Ignore) => ast::IndexHintAction::Ignore,
            Token::Keyword(Keyword::Force) => ast::IndexHintAction::Force,
            token => return errsyntax!(self.position, "unexpected token {token}"),
        };
        match self.next()? {
            Token::Keyword(Keyword::Index | Keyword::Key) => {}
            token => return errsyntax!(self.position, "expected INDEX or KEY, got {token}"),
        }
        let mut scope = None;
        if self.next_is(Keyword::For.into()) {
            scope = Some(match self.next()? {
                Token::Keyword(Keyword::Join) => ast::IndexHintScope::Join,
                Token::Keyword(Keyword::Order) => {
                    self.expect(Keyword::By.into())?;
                    ast::IndexHintScope::OrderBy
                }
                Token::Keyword(Keyword::Group) => {
                    self.expect(Keyword::By.into())?;
                    ast::IndexHintScope::GroupBy
                }
                token => return errsyntax!(self.position, "unexpected token {token}"),
            });
        }
        // USE INDEX () is valid and means no indexes.
        self.expect(Token::OpenParen)?;
        let mut indexes = Vec::new();
        while !self.next_is(Token::CloseParen) {
            if !indexes.is_empty() {
                self.expect(Token::Comma)?;
            }
            match self.next()? {
                Token::Keyword(Keyword::Primary) => indexes.push("primary".to_string()),
                Token::Ident(ident) => indexes.push(ident),
                Token::Keyword(keyword) if is_unreserved(keyword) => {
                    indexes.push(keyword.to_string().to_lowercase())
                }
                token => return errsyntax!(self.position, "expected index name, got {token}"),
            }
        }
        Ok(ast::TableHint::Index { action, scope, indexes })
    }

    /// Parses JOIN clauses and comma-separated tables, which are cross joins.
    fn parse_joins(&mut self) -> Result<Vec<ast::Join>> {
        let mut joins = Vec::new();
        loop {
            let kind = if self.next_is(Token::Comma) {
                ast::JoinType::Cross
            } else if let Some(kind) = self.parse_join_type()? {
                kind
            } else {
                return Ok(joins);
            };
            let table = self.parse_table_ref()?;
            let mut predicate = None;
            if kind != ast::JoinType::Cross {
                self.expect(Keyword::On.into())?;
                predicate = Some(self.parse_expression()?);
            }
            joins.push(ast::Join { kind, table, predicate });
        }
    }

    /// Parses a JOIN type, if present.
    fn parse_join_type(&mut self) -> Result<Option<ast::JoinType>> {
        if self.next_is(Keyword::Join.into()) {
            return Ok(Some(ast::JoinType::Inner));
        }
        if self.next_is(Keyword::Cross.into()) {
            self.expect(Keyword::Join.into())?;
            return Ok(Some(ast::JoinType::Cross));
        }
        if self.next_is(Keyword::Inner.into()) {
            self.expect(Keyword::Join.into())?;
            return Ok(Some(ast::JoinType::Inner));
        }
        if self.next_is(Keyword::Left.into()) {
            self.skip(Keyword::Outer.into());
            self.expect(Keyword::Join.into())?;
            return Ok(Some(ast::JoinType::Left));
        }
        if self.next_is(Keyword::Right.into()) {
            self.skip(Keyword::Outer.into());
            self.expect(Keyword::Join.into())?;
            return Ok(Some(ast::JoinType::Right));
        }
        Ok(None)
    }

    /// Parses a WHERE clause, if present.
    fn parse_where_clause(&mut self) -> Result<Option<ast::Expression>> {
        if !self.next_is(Keyword::Where.into()) {
            return Ok(None);
        }
        Ok(Some(self.parse_expression()?))
    }

    /// Parses a GROUP BY clause, if present.
    fn parse_group_by_clause(&mut self) -> Result<Vec<ast::Expression>> {
        if !self.next_is(Keyword::Group.into()) {
            return Ok(Vec::new());
        }
        let mut group_by = Vec::new();
        self.expect(Keyword::By.into())?;
        loop {
            group_by.push(self.parse_expression()?);
            if !self.next_is(Token::Comma) {
                break;
            }
        }
        Ok(group_by)
    }

    /// Parses a HAVING clause, if present.
    fn parse_having_clause(&mut self) -> Result<Option<ast::Expression>> {
        if !self.next_is(Keyword::Having.into()) {
            return Ok(None);
        }
        Ok(Some(self.parse_expression()?))
    }

    /// Parses an ORDER BY clause, if present.
    fn parse_order_by_clause(&mut self) -> Result<Vec<(ast::Expression, ast::Direction)>> {
        if !self.next_is(Keyword::Order.into()) {
            return Ok(Vec::new());
        }
        let mut order_by = Vec::new();
        self.expect(Keyword::By.into())?;
        loop {
            let expr = self.parse_expression()?;
            let order = self
                .next_if_map(|token| match token {
                    Token::Keyword(Keyword::Asc) => Some(ast::Direction::Ascending),
                    Token::Keyword(Keyword::Desc) => Some(ast::Direction::Descending),
                    _ => None,
                })
                .unwrap_or_default();
            order_by.push((expr, order));
            if !self.next_is(Token::Comma) {
                break;
            }
        }
        Ok(order_by)
    }

    /// Parses paging clauses following ORDER BY:
    ///
    /// * LIMIT n [OFFSET m], LIMIT m, n: where the dialect has LIMIT.
    /// * OFFSET m ROWS [FETCH FIRST|NEXT n ROWS ONLY]: ANSI paging, gated on
    ///   the dialect's paging version. SQL Server also requires ORDER BY.
    /// * OFFSET m [LIMIT n]: where the dialect has LIMIT.
    /// * FETCH FIRST n ROWS ONLY: gated on the dialect's FETCH FIRST version.
    fn parse_paging(&mut self, select: &mut ast::Select) -> Result<()> {
        let top = select.limit.is_some();
        let keyword = self.next_if_map(|token| match token {
            Token::Keyword(keyword @ (Keyword::Limit | Keyword::Offset | Keyword::Fetch)) => {
                Some(*keyword)
            }
            _ => None,
        });
        match keyword {
            Some(Keyword::Limit) => {
                if !self.dialect.dialect.limit_offset {
                    return errunsupported!(self.dialect, "LIMIT");
                }
                let first = self.parse_expression()?;
                if self.next_is(Token::Comma) {
                    select.offset = Some(first);
                    select.limit = Some(self.parse_expression()?);
                } else {
                    select.limit = Some(first);
                    if self.next_is(Keyword::Offset.into()) {
                        select.offset = Some(self.parse_expression()?);
                    }
                }
            }
            Some(Keyword::Offset) => {
                let offset = self.parse_expression()?;
                if self.next_is(Keyword::Row.into()) || self.next_is(Keyword::Rows.into()) {
                    if !self.dialect.supports_paging() {
                        return errunsupported!(self.dialect, "OFFSET/FETCH paging");
                    }
                    select.offset = Some(offset);
                    if self.next_is(Keyword::Fetch.into()) {
                        select.limit = Some(self.parse_fetch_rows()?);
                    }
                    if self.dialect.dialect.paging_requires_order_by && select.order_by.is_empty() {
                        return errinvalid!("OFFSET/FETCH paging requires ORDER BY");
                    }
                } else {
                    if !self.dialect.dialect.limit_offset {
                        return errunsupported!(self.dialect, "OFFSET without ROWS");
                    }
                    select.offset = Some(offset);
                    if self.next_is(Keyword::Limit.into()) {
                        select.limit = Some(self.parse_expression()?);
                    }
                }
            }
            Some(Keyword::Fetch) => {
                if !self.dialect.supports_fetch_first() {
                    return errunsupported!(self.dialect, "FETCH FIRST");
                }
                select.limit = Some(self.parse_fetch_rows()?);
            }
            _ => return Ok(()),
        }
        if top && select.limit.is_some() {
            return errinvalid!("TOP can't be combined with other row limits");
        }
        Ok(())
    }

    /// Parses the tail of FETCH FIRST|NEXT [n] ROW|ROWS ONLY, after FETCH.
    /// The row count defaults to 1.
    fn parse_fetch_rows(&mut self) -> Result<ast::Expression> {
        match self.next()? {
            Token::Keyword(Keyword::First | Keyword::Next) => {}
            token => return errsyntax!(self.position, "expected FIRST or NEXT, got {token}"),
        }
        let mut limit = Literal::Integer(1).into();
        if !matches!(self.peek()?, Some(Token::Keyword(Keyword::Row | Keyword::Rows))) {
            limit = self.parse_expression()?;
        }
        match self.next()? {
            Token::Keyword(Keyword::Row | Keyword::Rows) => {}
            token => return errsyntax!(self.position, "expected ROW or ROWS, got {token}"),
        }
        self.expect(Keyword::Only.into())?;
        Ok(limit)
    }

    /// Parses a SQL Server OPTION (...) query hint clause, if present. Each
    /// hint is kept as its uppercased token text.
    fn parse_query_hints(&mut self) -> Result<Vec<String>> {
        if !self.next_is(Keyword::Option.into()) {
            return Ok(Vec::new());
        }
        self.require_hints(HintStyle::Table, "OPTION query hints")?;
        self.expect(Token::OpenParen)?;
        let mut hints = Vec::new();
        let mut hint: Vec<String> = Vec::new();
        loop {
            match self.next()? {
                Token::CloseParen => break,
                Token::Comma => hints.push(std::mem::take(&mut hint).join(" ")),
                token => hint.push(token.to_string().to_uppercase()),
            }
        }
        hints.push(hint.join(" "));
        if hints.iter().any(|hint| hint.is_empty()) {
            return errsyntax!(self.position, "empty query hint");
        }
        Ok(hints)
    }

    /// Parses a parenthesized, comma-separated list of identifiers.
    fn parse_ident_list(&mut self) -> Result<Vec<String>> {
        self.expect(Token::OpenParen)?;
        let mut idents = Vec::new();
        loop {
            idents.push(self.next_ident()?);
            if !self.next_is(Token::Comma) {
                break;
            }
        }
        self.expect(Token::CloseParen)?;
        Ok(idents)
    }

    /// Parses an expression consisting of at least one atom operated on by any
    /// number of operators, using the precedence climbing algorithm.
    ///
    /// Precedence climbing parses the operators with the highest precedence
    /// first: in 2 + 3 * 4, the multiplication binds tighter and is parsed as
    /// the right-hand side of the addition, giving 2 + (3 * 4). It walks the
    /// tokens left to right, recursing into the right-hand side of each
    /// operator with a higher minimum precedence, and returns to the caller as
    /// soon as it meets an operator whose precedence is lower than the
    /// minimum. Left-associative operators recurse with precedence + 1, so
    /// that 1 - 2 - 3 parses as (1 - 2) - 3.
    fn parse_expression(&mut self) -> Result<ast::Expression> {
        self.parse_expression_at(0)
    }

    /// Parses an expression at the given minimum precedence.
    fn parse_expression_at(&mut self, min_precedence: Precedence) -> Result<ast::Expression> {
        // If there is a prefix operator, parse it and its right-hand operand.
        // Otherwise, parse the left-hand atom.
        let mut lhs = if let Some(prefix) = self.parse_prefix_operator_at(min_precedence) {
            let next_precedence = prefix.precedence() + prefix.associativity();
            let rhs = self.parse_expression_at(next_precedence)?;
            prefix.into_expression(rhs)
        } else {
            self.parse_expression_atom()?
        };

        loop {
            // Apply any postfix operators. These can also follow a binary
            // operator, e.g. 1 + NULL IS NULL.
            while let Some(postfix) = self.parse_postfix_operator_at(min_precedence)? {
                lhs = postfix.into_expression(lhs)
            }

            // Apply a binary infix operator, parsing the right-hand operand.
            let Some(infix) = self.parse_infix_operator_at(min_precedence)? else {
                return Ok(lhs);
            };
            let next_precedence = infix.precedence() + infix.associativity();
            let rhs = self.parse_expression_at(next_precedence)?;
            lhs = infix.into_expression(lhs, rhs);
        }
    }

    /// Parses an expression atom. This is either:
    ///
    /// * A literal value.
    /// * A parameter placeholder.
    /// * A column name, optionally qualified by a table name.
    /// * A function call.
    /// * An upsert reference to the conflicting row: excluded.col, VALUES(col).
    /// * An EXISTS subquery.
    /// * A parenthesized expression.
    fn parse_expression_atom(&mut self) -> Result<ast::Expression> {
        Ok(match self.next()? {
            // All columns.
            Token::Asterisk => ast::Expression::All,

            // Literal value.
            Token::Number(n) if n.chars().all(|c| c.is_ascii_digit()) => match n.parse() {
                Ok(i) => Literal::Integer(i).into(),
                Err(_) => return errsyntax!(self.position, "invalid integer {n}"),
            },
            Token::Number(n) => match n.parse() {
                Ok(f) => Literal::Float(f).into(),
                Err(_) => return errsyntax!(self.position, "invalid number {n}"),
            },
            Token::String(s) => Literal::String(s).into(),
            Token::Keyword(Keyword::True) => Literal::Boolean(true).into(),
            Token::Keyword(Keyword::False) => Literal::Boolean(false).into(),
            Token::Keyword(Keyword::Null) => Literal::Null.into(),

            // Parameter placeholders.
            Token::Parameter(name) => ast::Expression::Parameter(Placeholder::Named(name)),
            Token::Question => {
                self.positional += 1;
                ast::Expression::Parameter(Placeholder::Positional(self.positional - 1))
            }

            // MySQL VALUES(col) in ON DUPLICATE KEY UPDATE.
            Token::Keyword(Keyword::Values) if self.upsert => {
                self.expect(Token::OpenParen)?;
                let column = self.next_ident()?;
                self.expect(Token::CloseParen)?;
                ast::Expression::Excluded(column)
            }

            // Function call.
            Token::Ident(name) if self.next_is(Token::OpenParen) => {
                let mut args = Vec::new();
                while !self.next_is(Token::CloseParen) {
                    if !args.is_empty() {
                        self.expect(Token::Comma)?;
                    }
                    args.push(self.parse_expression()?);
                }
                if args.contains(&ast::Expression::All) && name != "count" {
                    return errsyntax!(self.position, "* is only valid in COUNT(*)");
                }
                ast::Expression::Function(name, args)
            }

            // Qualified column name, or excluded.col in ON CONFLICT DO UPDATE.
            Token::Ident(table) if self.next_is(Token::Period) => {
                let column = self.next_ident()?;
                if self.upsert && table == "excluded" {
                    ast::Expression::Excluded(column)
                } else {
                    ast::Expression::Column(Some(table), column)
                }
            }

            // Unqualified column name.
            Token::Ident(column) => ast::Expression::Column(None, column),
            Token::Keyword(keyword) if is_unreserved(keyword) => {
                ast::Expression::Column(None, keyword.to_string().to_lowercase())
            }

            // EXISTS (SELECT ...). NOT EXISTS is the NOT prefix operator.
            Token::Keyword(Keyword::Exists) => {
                self.expect(Token::OpenParen)?;
                let select = self.parse_select()?;
                self.expect(Token::CloseParen)?;
                ast::Expression::Exists(Box::new(select))
            }

            // Parenthesized expression.
            Token::OpenParen => {
                let expr = self.parse_expression()?;
                self.expect(Token::CloseParen)?;
                expr
            }

            token => return errsyntax!(self.position, "expected expression atom, found {token}"),
        })
    }

    /// Parses a prefix operator, if there is one and its precedence is at
    /// least min_precedence.
    fn parse_prefix_operator_at(&mut self, min_precedence: Precedence) -> Option<PrefixOperator> {
        self.next_if_map(|token| {
            let operator = match token {
                Token::Keyword(Keyword::Not) => PrefixOperator::Not,
                Token::Minus => PrefixOperator::Minus,
                Token::Plus => PrefixOperator::Plus,
                _ => return None,
            };
            Some(operator).filter(|op| op.precedence() >= min_precedence)
        })
    }

    /// Parses an infix operator, if there is one and its precedence is at least
    /// min_precedence.
    fn parse_infix_operator_at(
        &mut self,
        min_precedence: Precedence,
    ) -> Result<Option<InfixOperator>> {
        // NOT LIKE needs two tokens of lookahead, since NOT IN is a postfix
        // operator.
        if self.peek()? == Some(&Keyword::Not.into()) {
            if self.peek_second() != Some(Keyword::Like.into())
                || InfixOperator::NotLike.precedence() < min_precedence
            {
                return Ok(None);
            }
            self.next()?;
            self.next()?;
            return Ok(Some(InfixOperator::NotLike));
        }
        Ok(self.next_if_map(|token| {
            let operator = match token {
                Token::Asterisk => InfixOperator::Multiply,
                Token::Concat => InfixOperator::Concat,
                Token::Equal => InfixOperator::Equal,
                Token::GreaterThan => InfixOperator::GreaterThan,
                Token::GreaterThanOrEqual => InfixOperator::GreaterThanOrEqual,
                Token::Keyword(Keyword::And) => InfixOperator::And,
                Token::Keyword(Keyword::Like) => InfixOperator::Like,
                Token::Keyword(Keyword::Or) => InfixOperator::Or,
                Token::LessThan => InfixOperator::LessThan,
                Token::LessThanOrEqual => InfixOperator::LessThanOrEqual,
                Token::Minus => InfixOperator::Subtract,
                Token::NotEqual => InfixOperator::NotEqual,
                Token::Percent => InfixOperator::Remainder,
                Token::Plus => InfixOperator::Add,
                Token::Slash => InfixOperator::Divide,
                _ => return None,
            };
            Some(operator).filter(|op| op.precedence() >= min_precedence)
        }))
    }

    /// Parses a postfix operator, if there is one and its precedence is at
    /// least min_precedence.
    fn parse_postfix_operator_at(
        &mut self,
        min_precedence: Precedence,
    ) -> Result<Option<PostfixOperator>> {
        // All postfix operators share a precedence. Check it before consuming
        // any tokens.
        if POSTFIX_PRECEDENCE < min_precedence {
            return Ok(None);
        }

        // [NOT] IN (...) and [NOT] IN (SELECT ...)
        let not_in = self.peek()? == Some(&Keyword::Not.into())
            && self.peek_second() == Some(Keyword::In.into());
        if not_in || self.peek()? == Some(&Keyword::In.into()) {
            if not_in {
                self.next()?;
            }
            self.expect(Keyword::In.into())?;
            self.expect(Token::OpenParen)?;
            if matches!(self.peek()?, Some(Token::Keyword(Keyword::Select | Keyword::With))) {
                let select = Box::new(self.parse_select()?);
                self.expect(Token::CloseParen)?;
                return Ok(Some(match not_in {
                    true => PostfixOperator::NotInSelect(select),
                    false => PostfixOperator::InSelect(select),
                }));
            }
            let mut list = Vec::new();
            loop {
                list.push(self.parse_expression()?);
                if !self.next_is(Token::Comma) {
                    break;
                }
            }
            self.expect(Token::CloseParen)?;
            return Ok(Some(match not_in {
                true => PostfixOperator::NotIn(list),
                false => PostfixOperator::In(list),
            }));
        }

        // [NOT] BETWEEN low AND high. The bounds are parsed above AND's
        // precedence, so the AND separating them isn't taken as a conjunction.
        let not_between = self.peek()? == Some(&Keyword::Not.into())
            && self.peek_second() == Some(Keyword::Between.into());
        if not_between || self.peek()? == Some(&Keyword::Between.into()) {
            if not_between {
                self.next()?;
            }
            self.expect(Keyword::Between.into())?;
            let low = self.parse_expression_at(InfixOperator::Add.precedence())?;
            self.expect(Keyword::And.into())?;
            let high = self.parse_expression_at(InfixOperator::Add.precedence())?;
            return Ok(Some(match not_between {
                true => PostfixOperator::NotBetween(low, high),
                false => PostfixOperator::Between(low, high),
            }));
        }

        // IS [NOT] NULL
        if self.next_is(Keyword::Is.into()) {
            let not = self.next_is(Keyword::Not.into());
            self.expect(Keyword::Null.into())?;
            return Ok(Some(match not {
                true => PostfixOperator::IsNot(Literal::Null),
                false => PostfixOperator::Is(Literal::Null),
            }));
        }
        Ok(None)
    }
}

/// Operator precedence.
type Precedence = u8;

/// Operator associativity.
enum Associativity {
    Left,
    Right,
}

impl Add<Associativity> for Precedence {
    type Output = Self;

    fn add(self, rhs: Associativity) -> Self {
        // Left-associative operators have increased precedence, so they bind
        // tighter to their left-hand side.
        self + match rhs {
            Associativity::Left => 1,
            Associativity::Right => 0,
        }
    }
}

/// Prefix operators.
enum PrefixOperator {
    Minus,
    Not,
    Plus,
}

impl PrefixOperator {
    /// The precedence of the operator.
    fn precedence(&self) -> Precedence {
        match self {
            Self::Not => 3,
            Self::Minus | Self::Plus => 10,
        }
    }

    /// The associativity of the operator.
    fn associativity(&self) -> Associativity {
        Associativity::Right
    }

    /// Builds an AST expression for the operator.
    fn into_expression(self, rhs: ast::Expression) -> ast::Expression {
        let rhs = Box::new(rhs);
        match self {
            Self::Plus => ast::Operator::Identity(rhs).into(),
            Self::Minus => ast::Operator::Negate(rhs).into(),
            Self::Not => ast::Operator::Not(rhs).into(),
        }
    }
}

/// Infix operators.
enum InfixOperator {
    Add,
    And,
    Concat,
    Divide,
    Equal,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    Multiply,
    NotEqual,
    NotLike,
    Or,
    Remainder,
    Subtract,
}

impl InfixOperator {
    /// The precedence of the operator.
    fn precedence(&self) -> Precedence {
        match self {
            Self::Or => 1,
            Self::And => 2,
            // Self::Not => 3
            Self::Equal | Self::NotEqual | Self::Like | Self::NotLike => 4, // also IS, IN
            Self::GreaterThan
            | Self::GreaterThanOrEqual
            | Self::LessThan
            | Self::LessThanOrEqual => 5,
            Self::Add | Self::Concat | Self::Subtract => 6,
            Self::Multiply | Self::Divide | Self::Remainder => 7,
        }
    }

    /// The associativity of the operator.
    fn associativity(&self) -> Associativity {
        Associativity::Left
    }

    /// Builds an AST expression for the infix operator.
    fn into_expression(self, lhs: ast::Expression, rhs: ast::Expression) -> ast::Expression {
        let (lhs, rhs) = (Box::new(lhs), Box::new(rhs));
        match self {
            Self::Add => ast::Operator::Add(lhs, rhs).into(),
            Self::And => ast::Operator::And(lhs, rhs).into(),
            Self::Concat => ast::Operator::Concat(lhs, rhs).into(),
            Self::Divide => ast::Operator::Divide(lhs, rhs).into(),
            Self::Equal => ast::Operator::Equal(lhs, rhs).into(),
            Self::GreaterThan => ast::Operator::GreaterThan(lhs, rhs).into(),
            Self::GreaterThanOrEqual => ast::Operator::GreaterThanOrEqual(lhs, rhs).into(),
            Self::LessThan => ast::Operator::LessThan(lhs, rhs).into(),
            Self::LessThanOrEqual => ast::Operator::LessThanOrEqual(lhs, rhs).into(),
            Self::Like => ast::Operator::Like(lhs, rhs).into(),
            Self::Multiply => ast::Operator::Multiply(lhs, rhs).into(),
            Self::NotEqual => ast::Operator::NotEqual(lhs, rhs).into(),
            Self::NotLike => ast::Operator::Not(ast::Operator::Like(lhs, rhs).into()).into(),
            Self::Or => ast::Operator::Or(lhs, rhs).into(),
            Self::Remainder => ast::Operator::Remainder(lhs, rhs).into(),
            Self::Subtract => ast::Operator::Subtract(lhs, rhs).into(),
        }
    }
}

/// The precedence of postfix operators: IS [NOT] NULL, [NOT] IN, [NOT]
/// BETWEEN.
const POSTFIX_PRECEDENCE: Precedence = 4;

/// Postfix operators.
enum PostfixOperator {
    Between(ast::Expression, ast::Expression),
    In(Vec<ast::Expression>),
    InSelect(Box<ast::Select>),
    Is(Literal),
    IsNot(Literal),
    NotBetween(ast::Expression, ast::Expression),
    NotIn(Vec<ast::Expression>),
    NotInSelect(Box<ast::Select>),
}

impl PostfixOperator {
    /// Builds an AST expression for the operator. BETWEEN is rewritten as
    /// lhs >= low AND lhs <= high.
    fn into_expression(self, lhs: ast::Expression) -> ast::Expression {
        let lhs = Box::new(lhs);
        let between = |lhs: Box<ast::Expression>, low: ast::Expression, high: ast::Expression| {
            ast::Expression::from(ast::Operator::And(
                ast::Operator::GreaterThanOrEqual(lhs.clone(), Box::new(low)).into(),
                ast::Operator::LessThanOrEqual(lhs, Box::new(high)).into(),
            ))
        };
        match self {
            Self::Between(low, high) => between(lhs, low, high),
            Self::In(list) => ast::Operator::In(lhs, list).into(),
            Self::InSelect(select) => ast::Expression::InSelect(lhs, select),
            Self::Is(v) => ast::Operator::Is(lhs, v).into(),
            Self::IsNot(v) => ast::Operator::Not(ast::Operator::Is(lhs, v).into()).into(),
            Self::NotBetween(low, high) => ast::Operator::Not(Box::new(between(lhs, low, high))).into(),
            Self::NotIn(list) => ast::Operator::Not(ast::Operator::In(lhs, list).into()).into(),
            Self::NotInSelect(select) => {
                ast::Operator::Not(Box::new(ast::Expression::InSelect(lhs, select))).into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use ast::{Expression, Operator, Statement};
    use pretty_assertions::assert_eq;

    fn parse(dialect: &str, version: u32, sql: &str) -> Result<Statement> {
        Parser::parse(sql, DialectVersion::new(dialect, version)?)
    }

    fn select(dialect: &str, version: u32, sql: &str) -> Result<ast::Select> {
        match parse(dialect, version, sql)? {
            Statement::Select(select) => Ok(select),
            statement => panic!("expected SELECT, got {statement:?}"),
        }
    }

    fn insert(dialect: &str, version: u32, sql: &str) -> Result<ast::Insert> {
        match parse(dialect, version, sql)? {
            Statement::Insert(insert) => Ok(insert),
            statement => panic!("expected INSERT, got {statement:?}"),
        }
    }

    fn is_unsupported(result: Result<impl std::fmt::Debug>) -> bool {
        matches!(result, Err(Error::UnsupportedFeature { .. }))
    }

    fn column(name: &str) -> Expression {
        Expression::Column(None, name.to_string())
    }

    fn int(i: i64) -> Expression {
        Literal::Integer(i).into()
    }

    #[test]
    fn precedence() -> Result<()> {
        let select = select("postgresql", 16, "SELECT 1 + 2 * 3 - 4")?;
        assert_eq!(
            select.columns[0].0,
            Operator::Subtract(
                Operator::Add(
                    int(1).into(),
                    Operator::Multiply(int(2).into(), int(3).into()).into()
                )
                .into(),
                int(4).into()
            )
            .into()
        );

        let select = self::select("postgresql", 16, "SELECT * FROM t WHERE NOT a = 1 OR b IS NOT NULL")?;
        assert_eq!(
            select.predicate,
            Some(
                Operator::Or(
                    Operator::Not(Operator::Equal(column("a").into(), int(1).into()).into()).into(),
                    Operator::Not(Operator::Is(column("b").into(), Literal::Null).into()).into(),
                )
                .into()
            )
        );
        Ok(())
    }

    #[test]
    fn in_and_like() -> Result<()> {
        let select = select("mysql", 8, "SELECT * FROM t WHERE a NOT IN (1, 2) AND b NOT LIKE 'x%'")?;
        assert_eq!(
            select.predicate,
            Some(
                Operator::And(
                    Operator::Not(Operator::In(column("a").into(), vec![int(1), int(2)]).into())
                        .into(),
                    Operator::Not(
                        Operator::Like(column("b").into(), Literal::String("x%".into()).into())
                            .into()
                    )
                    .into(),
                )
                .into()
            )
        );
        Ok(())
    }

    #[test]
    fn parameters() -> Result<()> {
        let select = select("sqlite", 3, "SELECT ? , @name, :other, ? FROM t")?;
        let params: Vec<_> = select.columns.into_iter().map(|(expr, _)| expr).collect();
        assert_eq!(
            params,
            vec![
                Expression::Parameter(Placeholder::Positional(0)),
                Expression::Parameter(Placeholder::Named("name".into())),
                Expression::Parameter(Placeholder::Named("other".into())),
                Expression::Parameter(Placeholder::Positional(1)),
            ]
        );
        Ok(())
    }

    #[test]
    fn syntax_error_position() {
        let result = parse("postgresql", 16, "SELECT * FORM users");
        assert_eq!(
            result,
            Err(Error::Syntax { position: 9, message: "unexpected token form".into() })
        );
        let result = parse("postgresql", 16, "SELECT * FROM");
        assert!(matches!(result, Err(Error::Syntax { position: 13, .. })));
    }

    #[test]
    fn trailing_semicolon() -> Result<()> {
        parse("db2", 11, "SELECT 1;")?;
        assert!(matches!(parse("db2", 11, "SELECT 1;;"), Err(Error::Syntax { .. })));
        Ok(())
    }

    #[test]
    fn merge() -> Result<()> {
        let sql = "MERGE INTO users AS t USING (SELECT 1 AS id, 'a' AS name) AS s ON t.id = s.id \
                   WHEN MATCHED AND t.name <> s.name THEN UPDATE SET t.name = s.name \
                   WHEN MATCHED THEN DELETE \
                   WHEN NOT MATCHED BY TARGET THEN INSERT (id, name) VALUES (s.id, s.name)";
        let Statement::Merge(merge) = parse("sqlserver", 2008, sql)? else {
            panic!("expected MERGE");
        };
        assert_eq!(merge.target.label(), "t");
        assert!(matches!(&merge.source, ast::MergeSource::Select { alias, .. } if alias == "s"));
        let qualified = |table: &str, name: &str| Expression::Column(Some(table.into()), name.into());
        assert_eq!(
            merge.predicate,
            Operator::Equal(qualified("t", "id").into(), qualified("s", "id").into()).into()
        );
        assert_eq!(merge.clauses.len(), 3);
        assert!(merge.clauses[0].matched && merge.clauses[0].condition.is_some());
        assert_eq!(
            merge.clauses[0].action,
            ast::MergeAction::Update([("name".to_string(), qualified("s", "name"))].into())
        );
        assert_eq!(merge.clauses[1].action, ast::MergeAction::Delete);
        assert!(!merge.clauses[2].matched);
        assert_eq!(
            merge.clauses[2].action,
            ast::MergeAction::Insert {
                columns: Some(vec!["id".into(), "name".into()]),
                values: vec![qualified("s", "id"), qualified("s", "name")],
            }
        );

        // A table source, without INTO.
        let sql = "MERGE users USING staged ON users.id = staged.id WHEN MATCHED THEN DELETE";
        let Statement::Merge(merge) = parse("oracle", 9, sql)? else {
            panic!("expected MERGE");
        };
        assert!(matches!(merge.source, ast::MergeSource::Table(table) if table.name == "staged"));

        assert!(is_unsupported(parse("sqlserver", 2005, sql)));
        assert!(is_unsupported(parse("oracle", 8, sql)));
        assert!(is_unsupported(parse("db2", 8, sql)));
        assert!(is_unsupported(parse("postgresql", 14, sql)));
        parse("postgresql", 15, sql)?;
        parse("db2", 9, sql)?;
        assert!(is_unsupported(parse("mysql", 8, sql)));
        assert!(is_unsupported(parse("sqlite", 3, sql)));
        Ok(())
    }

    #[test]
    fn merge_errors() {
        for sql in [
            "MERGE INTO t USING s ON t.id = s.id",
            "MERGE INTO t USING s ON t.id = s.id WHEN MATCHED THEN INSERT VALUES (1)",
            "MERGE INTO t USING s ON t.id = s.id WHEN NOT MATCHED THEN DELETE",
            "MERGE INTO t USING s ON t.id = s.id WHEN NOT MATCHED BY SOURCE THEN DELETE",
            "MERGE INTO t USING (SELECT 1) ON t.id = 1 WHEN MATCHED THEN DELETE",
        ] {
            assert!(matches!(parse("sqlserver", 2019, sql), Err(Error::Syntax { .. })), "{sql}");
        }
    }

    #[test]
    fn between() -> Result<()> {
        let between = |not: bool| {
            let expr: Expression = Operator::And(
                Operator::GreaterThanOrEqual(column("a").into(), int(1).into()).into(),
                Operator::LessThanOrEqual(column("a").into(), Operator::Add(int(2).into(), int(3).into()).into())
                    .into(),
            )
            .into();
            match not {
                true => Expression::from(Operator::Not(expr.into())),
                false => expr,
            }
        };
        let select = select("sqlite", 3, "SELECT * FROM t WHERE a BETWEEN 1 AND 2 + 3 AND b = 4")?;
        assert_eq!(
            select.predicate,
            Some(Expression::from(Operator::And(
                between(false).into(),
                Operator::Equal(column("b").into(), int(4).into()).into()
            )))
        );
        let select = self::select("sqlite", 3, "SELECT * FROM t WHERE a NOT BETWEEN 1 AND 2 + 3")?;
        assert_eq!(select.predicate, Some(between(true)));
        Ok(())
    }

    #[test]
    fn subqueries() -> Result<()> {
        let select = select("postgresql", 16, "SELECT * FROM t WHERE a IN (SELECT b FROM u)")?;
        let Some(Expression::InSelect(lhs, subquery)) = select.predicate else {
            panic!("expected IN (SELECT ...)");
        };
        assert_eq!(*lhs, column("a"));
        assert_eq!(subquery.source.map(|source| source.name), Some("u".to_string()));

        let sql = "SELECT * FROM t WHERE a NOT IN (SELECT b FROM u) AND NOT EXISTS (SELECT 1 FROM v)";
        let select = self::select("postgresql", 16, sql)?;
        let Some(Expression::Operator(Operator::And(lhs, rhs))) = select.predicate else {
            panic!("expected AND");
        };
        let negated = |expr: &Expression| match expr {
            Expression::Operator(Operator::Not(inner)) => Some((**inner).clone()),
            _ => None,
        };
        assert!(matches!(negated(&lhs), Some(Expression::InSelect(..))));
        assert!(matches!(negated(&rhs), Some(Expression::Exists(_))));

        // A plain IN list is unaffected.
        let select = self::select("postgresql", 16, "SELECT * FROM t WHERE a IN ((1), 2)")?;
        assert_eq!(
            select.predicate,
            Some(Expression::from(Operator::In(column("a").into(), vec![int(1), int(2)])))
        );
        Ok(())
    }

    #[test]
    fn insert_select() -> Result<()> {
        let insert = insert("sqlite", 3, "INSERT INTO t (a, b) SELECT x, y FROM u WHERE x > 1")?;
        assert_eq!(insert.columns, Some(vec!["a".to_string(), "b".to_string()]));
        assert!(insert.values.is_empty());
        let select = insert.select.expect("expected SELECT");
        assert_eq!(select.columns.len(), 2);
        assert!(select.predicate.is_some());

        let sql = "INSERT INTO t SELECT x, y FROM u ON CONFLICT (a) DO UPDATE SET b = excluded.b";
        let insert = self::insert("postgresql", 16, sql)?;
        assert!(insert.select.is_some());
        assert!(insert.is_upsert());
        assert_eq!(insert.conflict_target, vec!["a".to_string()]);

        let sql = "INSERT INTO t SELECT x, y FROM u ON DUPLICATE KEY UPDATE b = VALUES(b)";
        let insert = self::insert("mysql", 8, sql)?;
        assert!(insert.select.is_some());
        assert!(insert.is_upsert());
        Ok(())
    }

    #[test]
    fn paging() -> Result<()> {
        let sql = "SELECT * FROM t ORDER BY id OFFSET 5 ROWS FETCH NEXT 10 ROWS ONLY";
        let select = select("sqlserver", 2012, sql)?;
        assert_eq!(select.offset, Some(int(5)));
        assert_eq!(select.limit, Some(int(10)));
        assert!(is_unsupported(parse("sqlserver", 2008, sql)));
        assert!(is_unsupported(parse("oracle", 11, sql)));
        self::select("oracle", 12, sql)?;
        self::select("postgresql", 6, sql)?;
        assert!(is_unsupported(parse("db2", 11, sql)));

        // SQL Server requires ORDER BY for OFFSET/FETCH.
        let sql = "SELECT * FROM t OFFSET 5 ROWS FETCH NEXT 10 ROWS ONLY";
        assert!(matches!(parse("sqlserver", 2019, sql), Err(Error::InvalidOperation(_))));
        assert!(is_unsupported(parse("sqlserver", 2008, sql)));
        self::select("postgresql", 16, sql)?;
        Ok(())
    }

    #[test]
    fn limit_offset() -> Result<()> {
        let select = select("mysql", 5, "SELECT * FROM t LIMIT 10 OFFSET 5")?;
        assert_eq!((select.limit, select.offset), (Some(int(10)), Some(int(5))));

        let select = self::select("mysql", 3, "SELECT * FROM t LIMIT 5, 10")?;
        assert_eq!((select.limit, select.offset), (Some(int(10)), Some(int(5))));

        assert!(is_unsupported(parse("sqlserver", 2022, "SELECT * FROM t LIMIT 10")));
        assert!(is_unsupported(parse("oracle", 23, "SELECT * FROM t LIMIT 10")));
        Ok(())
    }

    #[test]
    fn fetch_first() -> Result<()> {
        let sql = "SELECT * FROM t FETCH FIRST 3 ROWS ONLY";
        assert_eq!(select("db2", 8, sql)?.limit, Some(int(3)));
        assert_eq!(select("oracle", 12, sql)?.limit, Some(int(3)));
        assert!(is_unsupported(parse("oracle", 11, sql)));
        assert!(is_unsupported(parse("sqlserver", 2008, sql)));
        assert!(is_unsupported(parse("sqlserver", 2022, sql)));
        assert!(is_unsupported(parse("mysql", 8, sql)));
        assert!(is_unsupported(parse("sqlite", 3, sql)));
        assert_eq!(select("db2", 9, "SELECT * FROM t FETCH FIRST ROW ONLY")?.limit, Some(int(1)));
        Ok(())
    }

    #[test]
    fn top() -> Result<()> {
        let select = select("sqlserver", 2000, "SELECT DISTINCT TOP 5 * FROM t")?;
        assert!(select.distinct);
        assert_eq!(select.limit, Some(int(5)));
        assert_eq!(select.columns, vec![(Expression::All, None)]);
        assert!(is_unsupported(parse("postgresql", 16, "SELECT TOP 5 * FROM t")));
        Ok(())
    }

    #[test]
    fn ctes() -> Result<()> {
        let sql = "WITH a AS (SELECT 1) SELECT * FROM a";
        assert_eq!(select("sqlserver", 2005, sql)?.ctes.len(), 1);
        assert!(is_unsupported(parse("sqlserver", 2000, sql)));
        assert!(is_unsupported(parse("mysql", 5, sql)));
        assert!(is_unsupported(parse("oracle", 8, sql)));

        let sql = "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n WHERE x < 3) \
                   SELECT x FROM n";
        let select = select("postgresql", 16, sql)?;
        assert!(select.ctes[0].recursive);
        assert_eq!(select.ctes[0].columns, vec!["x".to_string()]);
        assert_eq!(select.ctes[0].body.unions.len(), 1);
        assert!(is_unsupported(parse("oracle", 23, sql)));
        assert!(is_unsupported(parse("sqlserver", 2022, sql)));
        Ok(())
    }

    #[test]
    fn materialized_hint() -> Result<()> {
        let sql = "WITH a AS NOT MATERIALIZED (SELECT 1) SELECT * FROM a";
        let select = select("postgresql", 12, sql)?;
        assert_eq!(select.ctes[0].materialization, Some(ast::Materialization::NotMaterialized));
        assert!(is_unsupported(parse("mysql", 8, sql)));
        Ok(())
    }

    #[test]
    fn table_hints() -> Result<()> {
        let select = select("sqlserver", 2019, "SELECT * FROM t AS x WITH (NOLOCK, INDEX(ix)) OPTION (MAXDOP 1)")?;
        let source = select.source.expect("no source");
        assert_eq!(source.alias.as_deref(), Some("x"));
        assert_eq!(
            source.hints,
            vec![
                ast::TableHint::Table("NOLOCK".into()),
                ast::TableHint::Table("INDEX(ix)".into())
            ]
        );
        assert_eq!(select.query_hints, vec!["MAXDOP 1".to_string()]);

        let select = self::select("sqlserver", 2000, "SELECT * FROM t (NOLOCK)")?;
        assert_eq!(select.source.expect("no source").hints.len(), 1);

        assert!(is_unsupported(parse("postgresql", 16, "SELECT * FROM t WITH (NOLOCK)")));
        assert!(is_unsupported(parse("mysql", 8, "SELECT * FROM t (NOLOCK)")));
        Ok(())
    }

    #[test]
    fn index_hints() -> Result<()> {
        let select = select("mysql", 5, "SELECT * FROM t FORCE INDEX FOR ORDER BY (ix_a, PRIMARY)")?;
        assert_eq!(
            select.source.expect("no source").hints,
            vec![ast::TableHint::Index {
                action: ast::IndexHintAction::Force,
                scope: Some(ast::IndexHintScope::OrderBy),
                indexes: vec!["ix_a".into(), "primary".into()],
            }]
        );
        assert!(is_unsupported(parse("sqlserver", 2019, "SELECT * FROM t USE INDEX (ix)")));
        Ok(())
    }

    #[test]
    fn upserts_normalize() -> Result<()> {
        let postgres = insert(
            "postgresql",
            16,
            "INSERT INTO t (id, n) VALUES (1, 2) ON CONFLICT (id) DO UPDATE SET n = excluded.n",
        )?;
        let mysql = insert(
            "mysql",
            8,
            "INSERT INTO t (id, n) VALUES (1, 2) ON DUPLICATE KEY UPDATE n = VALUES(n)",
        )?;
        assert_eq!(postgres.on_conflict_assignments, mysql.on_conflict_assignments);
        assert_eq!(
            mysql.on_conflict_assignments,
            vec![("n".to_string(), Expression::Excluded("n".into()))]
        );
        assert_eq!(postgres.conflict_target, vec!["id".to_string()]);

        assert!(is_unsupported(parse(
            "mysql",
            8,
            "INSERT INTO t VALUES (1) ON CONFLICT DO NOTHING"
        )));
        assert!(is_unsupported(parse(
            "postgresql",
            16,
            "INSERT INTO t VALUES (1) ON DUPLICATE KEY UPDATE a = 1"
        )));
        Ok(())
    }

    #[test]
    fn upsert_last_assignment_wins() -> Result<()> {
        let insert = insert(
            "sqlite",
            3,
            "INSERT INTO t VALUES (1, 2) ON CONFLICT DO UPDATE SET n = 1, m = 2, n = 3",
        )?;
        assert_eq!(
            insert.on_conflict_assignments,
            vec![("n".to_string(), int(3)), ("m".to_string(), int(2))]
        );
        let insert = self::insert("sqlite", 3, "INSERT INTO t VALUES (1) ON CONFLICT DO NOTHING")?;
        assert!(insert.ignore_conflicts);
        Ok(())
    }

    #[test]
    fn delete_without_from() -> Result<()> {
        let expect = Statement::Delete(ast::Delete { table: "t".into(), predicate: None });
        assert_eq!(parse("mysql", 8, "DELETE t")?, expect);
        assert_eq!(parse("sqlserver", 2000, "DELETE t")?, expect);
        assert!(is_unsupported(parse("postgresql", 16, "DELETE t")));
        Ok(())
    }

    #[test]
    fn create_table() -> Result<()> {
        let statement = parse(
            "mysql",
            8,
            "CREATE TABLE `users` (id INT, name VARCHAR(255) NOT NULL DEFAULT 'x', key BIGINT UNIQUE, PRIMARY KEY (id))",
        )?;
        let Statement::CreateTable { name, columns } = statement else {
            panic!("expected CREATE TABLE");
        };
        assert_eq!(name, "users");
        assert_eq!(columns.len(), 3);
        assert!(columns[0].primary_key);
        assert_eq!(columns[1].datatype, DataType::String);
        assert_eq!(columns[1].nullable, Some(false));
        assert_eq!(columns[1].default, Some(Literal::String("x".into()).into()));
        assert_eq!(columns[2].name, "key");
        assert!(columns[2].unique);
        Ok(())
    }

    #[test]
    fn update_duplicate_column() {
        assert!(matches!(
            parse("postgresql", 16, "UPDATE t SET a = 1, a = 2"),
            Err(Error::Syntax { .. })
        ));
    }

    #[test]
    fn joins() -> Result<()> {
        let select = select(
            "postgresql",
            16,
            "SELECT * FROM a LEFT OUTER JOIN b ON a.id = b.id, c CROSS JOIN d",
        )?;
        let kinds: Vec<_> = select.joins.iter().map(|join| join.kind).collect();
        assert_eq!(kinds, vec![ast::JoinType::Left, ast::JoinType::Cross, ast::JoinType::Cross]);
        assert_eq!(
            select.joins[0].predicate,
            Some(
                Operator::Equal(
                    Expression::Column(Some("a".into()), "id".into()).into(),
                    Expression::Column(Some("b".into()), "id".into()).into()
                )
                .into()
            )
        );
        Ok(())
    }
}
