use std::iter::Peekable;
use std::str::CharIndices;

use crate::errsyntax;
use crate::error::{Error, Result};
use crate::sql::dialect::Dialect;

/// The lexer (lexical analyzer) preprocesses raw SQL strings into a sequence of
/// lexical tokens (e.g. keyword, number, string, etc), which are passed on to
/// the SQL parser. Each token is paired with its byte offset in the input, so
/// parse errors can point at the offending token.
///
/// Quoting rules depend on the dialect: MySQL and SQLite treat "..." as string
/// literals, SQL Server and Oracle accept [bracketed] identifiers, MySQL and
/// SQLite accept `backticked` identifiers, and MySQL recognizes backslash
/// escapes and # comments. Named parameters may use any of the @, : prefixes,
/// and ? is a positional parameter.
#[derive(Clone)]
pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    dialect: &'static Dialect,
}

/// A lexical token.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// A numeric string, with digits, decimal points, and/or exponents.
    Number(String),
    /// A string, with escapes and quotes resolved.
    String(String),
    /// An identifier, either quoted or unquoted (lowercased).
    Ident(String),
    /// A SQL keyword.
    Keyword(Keyword),
    /// A named parameter, without its prefix.
    Parameter(String),
    Question,           // ?
    Period,             // .
    Equal,              // =
    NotEqual,           // != or <>
    GreaterThan,        // >
    GreaterThanOrEqual, // >=
    LessThan,           // <
    LessThanOrEqual,    // <=
    Plus,               // +
    Minus,              // -
    Asterisk,           // *
    Slash,              // /
    Percent,            // %
    Concat,             // ||
    OpenParen,          // (
    CloseParen,         // )
    Comma,              // ,
    Semicolon,          // ;
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Number(n) => n,
            Self::String(s) => s,
            Self::Ident(s) => s,
            Self::Keyword(k) => return k.fmt(f),
            Self::Parameter(p) => return write!(f, "@{p}"),
            Self::Question => "?",
            Self::Period => ".",
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Asterisk => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Concat => "||",
            Self::OpenParen => "(",
            Self::CloseParen => ")",
            Self::Comma => ",",
            Self::Semicolon => ";",
        })
    }
}

impl From<Keyword> for Token {
    fn from(keyword: Keyword) -> Self {
        Self::Keyword(keyword)
    }
}

/// Reserved SQL keywords.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    All,
    And,
    As,
    Asc,
    Between,
    By,
    Conflict,
    Create,
    Cross,
    Default,
    Delete,
    Desc,
    Distinct,
    Do,
    Drop,
    Duplicate,
    Exists,
    False,
    Fetch,
    First,
    For,
    Force,
    From,
    Group,
    Having,
    If,
    Ignore,
    In,
    Index,
    Inner,
    Insert,
    Into,
    Is,
    Join,
    Key,
    Left,
    Like,
    Limit,
    Materialized,
    Matched,
    Merge,
    Next,
    Not,
    Nothing,
    Null,
    Offset,
    On,
    Only,
    Option,
    Or,
    Order,
    Outer,
    Primary,
    Recursive,
    Right,
    Row,
    Rows,
    Select,
    Set,
    Table,
    Then,
    Top,
    True,
    Union,
    Unique,
    Update,
    Use,
    Using,
    Values,
    When,
    Where,
    With,
}

impl TryFrom<&str> for Keyword {
    // Use a cheap static error string. This just indicates it's not a keyword.
    type Error = &'static str;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        // Only compare lowercase, which is enforced by the lexer. This avoids
        // allocating a string to change the case.
        debug_assert!(value.chars().all(|c| !c.is_uppercase()), "keyword must be lowercase");
        Ok(match value {
            "all" => Self::All,
            "and" => Self::And,
            "as" => Self::As,
            "asc" => Self::Asc,
            "between" => Self::Between,
            "by" => Self::By,
            "conflict" => Self::Conflict,
            "create" => Self::Create,
            "cross" => Self::Cross,
            "default" => Self::Default,
            "delete" => Self::Delete,
            "desc" => Self::Desc,
            "distinct" => Self::Distinct,
            "do" => Self::Do,
            "drop" => Self::Drop,
            "duplicate" => Self::Duplicate,
            "exists" => Self::Exists,
            "false" => Self::False,
            "fetch" => Self::Fetch,
            "first" => Self::First,
            "for" => Self::For,
            "force" => Self::Force,
            "from" => Self::From,
            "group" => Self::Group,
            "having" => Self::Having,
            "if" => Self::If,
            "ignore" => Self::Ignore,
            "in" => Self::In,
            "index" => Self::Index,
            "inner" => Self::Inner,
            "insert" => Self::Insert,
            "into" => Self::Into,
            "is" => Self::Is,
            "join" => Self::Join,
            "key" => Self::Key,
            "left" => Self::Left,
            "like" => Self::Like,
            "limit" => Self::Limit,
            "materialized" => Self::Materialized,
            "matched" => Self::Matched,
            "merge" => Self::Merge,
            "next" => Self::Next,
            "not" => Self::Not,
            "nothing" => Self::Nothing,
            "null" => Self::Null,
            "offset" => Self::Offset,
            "on" => Self::On,
            "only" => Self::Only,
            "option" => Self::Option,
            "or" => Self::Or,
            "order" => Self::Order,
            "outer" => Self::Outer,
            "primary" => Self::Primary,
            "recursive" => Self::Recursive,
            "right" => Self::Right,
            "row" => Self::Row,
            "rows" => Self::Rows,
            "select" => Self::Select,
            "set" => Self::Set,
            "table" => Self::Table,
            "then" => Self::Then,
            "top" => Self::Top,
            "true" => Self::True,
            "union" => Self::Union,
            "unique" => Self::Unique,
            "update" => Self::Update,
            "use" => Self::Use,
            "using" => Self::Using,
            "values" => Self::Values,
            "when" => Self::When,
            "where" => Self::Where,
            "with" => Self::With,
            _ => return Err("not a keyword"),
        })
    }
}

impl std::fmt::Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display keywords as uppercase.
        f.write_str(match self {
            Self::All => "ALL",
            Self::And => "AND",
            Self::As => "AS",
            Self::Asc => "ASC",
            Self::Between => "BETWEEN",
            Self::By => "BY",
            Self::Conflict => "CONFLICT",
            Self::Create => "CREATE",
            Self::Cross => "CROSS",
            Self::Default => "DEFAULT",
            Self::Delete => "DELETE",
            Self::Desc => "DESC",
            Self::Distinct => "DISTINCT",
            Self::Do => "DO",
            Self::Drop => "DROP",
            Self::Duplicate => "DUPLICATE",
            Self::Exists => "EXISTS",
            Self::False => "FALSE",
            Self::Fetch => "FETCH",
            Self::First => "FIRST",
            Self::For => "FOR",
            Self::Force => "FORCE",
            Self::From => "FROM",
            Self::Group => "GROUP",
            Self::Having => "HAVING",
            Self::If => "IF",
            Self::Ignore => "IGNORE",
            Self::In => "IN",
            Self::Index => "INDEX",
            Self::Inner => "INNER",
            Self::Insert => "INSERT",
            Self::Into => "INTO",
            Self::Is => "IS",
            Self::Join => "JOIN",
            Self::Key => "KEY",
            Self::Left => "LEFT",
            Self::Like => "LIKE",
            Self::Limit => "LIMIT",
            Self::Materialized => "MATERIALIZED",
            Self::Matched => "MATCHED",
            Self::Merge => "MERGE",
            Self::Next => "NEXT",
            Self::Not => "NOT",
            Self::Nothing => "NOTHING",
            Self::Null => "NULL",
            Self::Offset => "OFFSET",
            Self::On => "ON",
            Self::Only => "ONLY",
            Self::Option => "OPTION",
            Self::Or => "OR",
            Self::Order => "ORDER",
            Self::Outer => "OUTER",
            Self::Primary => "PRIMARY",
            Self::Recursive => "RECURSIVE",
            Self::Right => "RIGHT",
            Self::Row => "ROW",
            Self::Rows => "ROWS",
            Self::Select => "SELECT",
            Self::Set => "SET",
            Self::Table => "TABLE",
            Self::Then => "THEN",
            Self::Top => "TOP",
            Self::True => "TRUE",
            Self::Union => "UNION",
            Self::Unique => "UNIQUE",
            Self::Update => "UPDATE",
            Self::Use => "USE",
            Self::Using => "USING",
            Self::Values => "VALUES",
            Self::When => "WHEN",
            Self::Where => "WHERE",
            Self::With => "WITH",
        })
    }
}

/// The lexer is used as a token iterator, yielding tokens with their byte
/// offset in the input.
impl Iterator for Lexer<'_> {
    type Item = Result<(usize, Token)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(error) = self.skip_whitespace_and_comments() {
            return Some(Err(error));
        }
        let position = self.position();
        match self.scan() {
            Ok(Some(token)) => Some(Ok((position, token))),
            // If there's any remaining chars, the lexer didn't recognize them.
            // Otherwise, we're done lexing.
            Ok(None) => self.chars.peek().map(|&(position, c)| {
                Err(Error::Syntax { position, message: format!("unexpected character {c}") })
            }),
            Err(err) => Some(Err(err)),
        }
    }
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given string and dialect.
    pub fn new(input: &'a str, dialect: &'static Dialect) -> Lexer<'a> {
        Lexer { input, chars: input.char_indices().peekable(), dialect }
    }

    /// Returns the byte offset of the next character.
    fn position(&mut self) -> usize {
        self.chars.peek().map(|&(i, _)| i).unwrap_or(self.input.len())
    }

    /// Returns true if the remaining input starts with the given string.
    fn lookahead(&mut self, prefix: &str) -> bool {
        let position = self.position();
        self.input[position..].starts_with(prefix)
    }

    /// Returns the next character if it satisfies the predicate.
    fn next_if(&mut self, predicate: impl Fn(char) -> bool) -> Option<char> {
        self.chars.next_if(|&(_, c)| predicate(c)).map(|(_, c)| c)
    }

    /// Applies a function to the next character, returning its result and
    /// consuming the next character if it's Some.
    fn next_if_map<T>(&mut self, map: impl Fn(char) -> Option<T>) -> Option<T> {
        let value = self.chars.peek().and_then(|&(_, c)| map(c))?;
        self.chars.next();
        Some(value)
    }

    /// Returns true if the next character is the given character, consuming it.
    fn next_is(&mut self, c: char) -> bool {
        self.next_if(|n| n == c).is_some()
    }

    /// Consumes whitespace and comments.
    fn skip_whitespace_and_comments(&mut self) -> Result<()> {
        loop {
            while self.next_if(|c| c.is_whitespace()).is_some() {}
            if self.lookahead("--") || (self.dialect.hash_comments && self.lookahead("#")) {
                while self.next_if(|c| c != '\n').is_some() {}
            } else if self.lookahead("/*") {
                let start = self.position();
                self.chars.next();
                self.chars.next();
                loop {
                    if self.lookahead("*/") {
                        self.chars.next();
                        self.chars.next();
                        break;
                    }
                    if self.chars.next().is_none() {
                        return errsyntax!(start, "unterminated comment");
                    }
                }
            } else {
                return Ok(());
            }
        }
    }

    /// Scans the next token, if any.
    fn scan(&mut self) -> Result<Option<Token>> {
        let Some(&(_, c)) = self.chars.peek() else { return Ok(None) };
        match c {
            '\'' => self.scan_string('\''),
            '"' if self.dialect.double_quote_strings => self.scan_string('"'),
            '"' => self.scan_quoted_ident('"', '"'),
            '`' if self.dialect.backtick_identifiers => self.scan_quoted_ident('`', '`'),
            '[' if self.dialect.bracket_identifiers => self.scan_quoted_ident('[', ']'),
            '@' | ':' => Ok(self.scan_parameter()),
            c if c.is_ascii_digit() => Ok(self.scan_number()),
            c if c.is_alphabetic() || c == '_' => Ok(self.scan_ident()),
            _ => Ok(self.scan_symbol()),
        }
    }

    /// Scans the next identifier or keyword, if any. Unquoted identifiers are
    /// converted to lowercase.
    fn scan_ident(&mut self) -> Option<Token> {
        let first = self.next_if(|c| c.is_alphabetic() || c == '_')?;
        let mut name = first.to_lowercase().collect::<String>();
        while let Some(c) = self.next_if(|c| c.is_alphanumeric() || c == '_' || c == '$') {
            name.extend(c.to_lowercase())
        }
        match Keyword::try_from(name.as_str()).ok() {
            Some(keyword) => Some(Token::Keyword(keyword)),
            None => Some(Token::Ident(name)),
        }
    }

    /// Scans the next quoted identifier, if any. Case is preserved, and a
    /// doubled closing quote is an escaped quote.
    fn scan_quoted_ident(&mut self, open: char, close: char) -> Result<Option<Token>> {
        let start = self.position();
        if !self.next_is(open) {
            return Ok(None);
        }
        let mut ident = String::new();
        loop {
            match self.chars.next() {
                Some((_, c)) if c == close && self.next_is(close) => ident.push(c),
                Some((_, c)) if c == close => break,
                Some((_, c)) => ident.push(c),
                None => return errsyntax!(start, "unterminated quoted identifier"),
            }
        }
        if ident.is_empty() {
            return errsyntax!(start, "empty quoted identifier");
        }
        Ok(Some(Token::Ident(ident)))
    }

    /// Scans the next number, if any.
    fn scan_number(&mut self) -> Option<Token> {
        let mut number = self.next_if(|c| c.is_ascii_digit())?.to_string();
        while let Some(c) = self.next_if(|c| c.is_ascii_digit()) {
            number.push(c)
        }
        if self.next_is('.') {
            number.push('.');
            while let Some(dec) = self.next_if(|c| c.is_ascii_digit()) {
                number.push(dec)
            }
        }
        if let Some(exp) = self.next_if(|c| c == 'e' || c == 'E') {
            number.push(exp);
            if let Some(sign) = self.next_if(|c| c == '+' || c == '-') {
                number.push(sign)
            }
            while let Some(c) = self.next_if(|c| c.is_ascii_digit()) {
                number.push(c)
            }
        }
        Some(Token::Number(number))
    }

    /// Scans the next named parameter, if any. The name keeps its case, since
    /// binding compares names case-insensitively anyway.
    fn scan_parameter(&mut self) -> Option<Token> {
        let mut lookahead = self.chars.clone();
        lookahead.next()?;
        if !lookahead.peek().is_some_and(|&(_, c)| c.is_alphabetic() || c == '_') {
            return None;
        }
        self.chars.next();
        let mut name = String::new();
        while let Some(c) = self.next_if(|c| c.is_alphanumeric() || c == '_') {
            name.push(c)
        }
        Some(Token::Parameter(name))
    }

    /// Scans the next quoted string literal, if any.
    fn scan_string(&mut self, quote: char) -> Result<Option<Token>> {
        let start = self.position();
        if !self.next_is(quote) {
            return Ok(None);
        }
        let mut string = String::new();
        loop {
            match self.chars.next() {
                Some((_, c)) if c == quote && self.next_is(quote) => string.push(c),
                Some((_, c)) if c == quote => break,
                Some((_, '\\')) if self.dialect.backslash_escapes => match self.chars.next() {
                    Some((_, 'n')) => string.push('\n'),
                    Some((_, 't')) => string.push('\t'),
                    Some((_, 'r')) => string.push('\r'),
                    Some((_, '0')) => string.push('\0'),
                    Some((_, c)) => string.push(c),
                    None => return errsyntax!(start, "unterminated string literal"),
                },
                Some((_, c)) => string.push(c),
                None => return errsyntax!(start, "unterminated string literal"),
            }
        }
        Ok(Some(Token::String(string)))
    }

    /// Scans the next symbol token, if any.
    fn scan_symbol(&mut self) -> Option<Token> {
        // Two-character tokens first, e.g. !=.
        for (symbol, token) in [
            ("!=", Token::NotEqual),
            ("<>", Token::NotEqual),
            (">=", Token::GreaterThanOrEqual),
            ("<=", Token::LessThanOrEqual),
            ("||", Token::Concat),
        ] {
            if self.lookahead(symbol) {
                self.chars.next();
                self.chars.next();
                return Some(token);
            }
        }
        self.next_if_map(|c| {
            Some(match c {
                '?' => Token::Question,
                '.' => Token::Period,
                '=' => Token::Equal,
                '>' => Token::GreaterThan,
                '<' => Token::LessThan,
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Asterisk,
                '/' => Token::Slash,
                '%' => Token::Percent,
                '(' => Token::OpenParen,
                ')' => Token::CloseParen,
                ',' => Token::Comma,
                ';' => Token::Semicolon,
                _ => return None,
            })
        })
    }
}

/// Returns true if the entire given string is a single valid identifier.
pub fn is_ident(ident: &str) -> bool {
    let mut chars = ident.chars();
    if let Some(first) = chars.next() {
        if !first.is_alphabetic() && first != '_' {
            return false;
        }
    }
    !ident.is_empty() && chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scan(dialect: &str, input: &str) -> Result<Vec<Token>> {
        let dialect = Dialect::lookup(dialect)?;
        Lexer::new(input, dialect).map(|r| r.map(|(_, token)| token)).collect()
    }

    #[test]
    fn literal_string() -> Result<()> {
        assert_eq!(
            scan("postgresql", "'it''s' 'a\\nb'")?,
            vec![Token::String("it's".into()), Token::String("a\\nb".into())]
        );
        assert_eq!(
            scan("mysql", r#"'a\nb' "double""#)?,
            vec![Token::String("a\nb".into()), Token::String("double".into())]
        );
        Ok(())
    }

    #[test]
    fn literal_number() -> Result<()> {
        assert_eq!(
            scan("sqlite", "0 1 3.14 293. -2.718 3.14e3 2.718E-2")?,
            vec![
                Token::Number("0".into()),
                Token::Number("1".into()),
                Token::Number("3.14".into()),
                Token::Number("293.".into()),
                Token::Minus,
                Token::Number("2.718".into()),
                Token::Number("3.14e3".into()),
                Token::Number("2.718E-2".into()),
            ]
        );
        Ok(())
    }

    #[test]
    fn quoted_identifiers() -> Result<()> {
        assert_eq!(scan("postgresql", r#""User Name""#)?, vec![Token::Ident("User Name".into())]);
        assert_eq!(scan("mysql", "`select`")?, vec![Token::Ident("select".into())]);
        assert_eq!(scan("sqlserver", "[IX_Users_Id]")?, vec![Token::Ident("IX_Users_Id".into())]);
        assert!(matches!(scan("postgresql", "[a]"), Err(Error::Syntax { position: 0, .. })));
        assert!(matches!(scan("oracle", "`a`"), Err(Error::Syntax { position: 0, .. })));
        Ok(())
    }

    #[test]
    fn parameters() -> Result<()> {
        assert_eq!(
            scan("sqlserver", "@id :Name ?")?,
            vec![Token::Parameter("id".into()), Token::Parameter("Name".into()), Token::Question]
        );
        Ok(())
    }

    #[test]
    fn bare_prefix_is_error() {
        assert!(matches!(scan("sqlite", "SELECT @"), Err(Error::Syntax { position: 7, .. })));
    }

    #[test]
    fn comments() -> Result<()> {
        assert_eq!(
            scan("sqlite", "SELECT -- one\n 1 /* two */ ;")?,
            vec![Keyword::Select.into(), Token::Number("1".into()), Token::Semicolon]
        );
        assert_eq!(scan("mysql", "# note\nSELECT")?, vec![Keyword::Select.into()]);
        assert!(matches!(scan("sqlite", "/* open"), Err(Error::Syntax { .. })));
        Ok(())
    }

    #[test]
    fn operators() -> Result<()> {
        use Token::*;
        assert_eq!(
            scan("db2", "a <> b != c >= d <= e || f")?,
            vec![
                Ident("a".into()),
                NotEqual,
                Ident("b".into()),
                NotEqual,
                Ident("c".into()),
                GreaterThanOrEqual,
                Ident("d".into()),
                LessThanOrEqual,
                Ident("e".into()),
                Concat,
                Ident("f".into()),
            ]
        );
        Ok(())
    }

    #[test]
    fn positions() -> Result<()> {
        let dialect = Dialect::lookup("sqlite")?;
        let positions: Vec<usize> = Lexer::new("SELECT id FROM t", dialect)
            .map(|r| r.map(|(position, _)| position))
            .collect::<Result<_>>()?;
        assert_eq!(positions, vec![0, 7, 10, 15]);
        Ok(())
    }

    #[test]
    fn select() -> Result<()> {
        use Token::*;
        assert_eq!(
            scan(
                "postgresql",
                "SELECT u.name AS n FROM users u WHERE u.id = @id AND u.email LIKE '%@x.io'"
            )?,
            vec![
                super::Keyword::Select.into(),
                Ident("u".into()),
                Period,
                Ident("name".into()),
                super::Keyword::As.into(),
                Ident("n".into()),
                super::Keyword::From.into(),
                Ident("users".into()),
                Ident("u".into()),
                super::Keyword::Where.into(),
                Ident("u".into()),
                Period,
                Ident("id".into()),
                Equal,
                Parameter("id".into()),
                super::Keyword::And.into(),
                Ident("u".into()),
                Period,
                Ident("email".into()),
                super::Keyword::Like.into(),
                String("%@x.io".into()),
            ]
        );
        Ok(())
    }
}
