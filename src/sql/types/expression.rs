use regex::Regex;

use super::{Row, Value};
use crate::error::Result;
use crate::{errinvalid, errtype};

/// An expression with column references resolved to row indexes, ready for
/// evaluation against a row. Built from AST expressions by the executor's
/// scope resolution, which also rejects unknown columns before any row is
/// read.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    /// A constant value.
    Constant(Value),
    /// A column reference by row index.
    Column(usize),

    /// Logical AND of two booleans: a AND b.
    And(Box<Expression>, Box<Expression>),
    /// Logical OR of two booleans: a OR b.
    Or(Box<Expression>, Box<Expression>),
    /// Logical NOT of a boolean: NOT a.
    Not(Box<Expression>),

    /// Equality comparison of two values: a = b.
    Equal(Box<Expression>, Box<Expression>),
    /// Inequality comparison of two values: a != b.
    NotEqual(Box<Expression>, Box<Expression>),
    /// Greater than comparison of two values: a > b.
    GreaterThan(Box<Expression>, Box<Expression>),
    /// Greater than or equal comparison of two values: a >= b.
    GreaterThanOrEqual(Box<Expression>, Box<Expression>),
    /// Less than comparison of two values: a < b.
    LessThan(Box<Expression>, Box<Expression>),
    /// Less than or equal comparison of two values: a <= b.
    LessThanOrEqual(Box<Expression>, Box<Expression>),
    /// List membership: a IN (b, c).
    In(Box<Expression>, Vec<Expression>),
    /// Checks if a value is NULL: a IS NULL.
    IsNull(Box<Expression>),

    /// Adds two numbers: a + b.
    Add(Box<Expression>, Box<Expression>),
    /// Concatenates two strings: a || b.
    Concat(Box<Expression>, Box<Expression>),
    /// Divides two numbers: a / b.
    Divide(Box<Expression>, Box<Expression>),
    /// Returns the input number: +a.
    Identity(Box<Expression>),
    /// Multiplies two numbers: a * b.
    Multiply(Box<Expression>, Box<Expression>),
    /// Negates the input number: -a.
    Negate(Box<Expression>),
    /// The remainder after dividing two numbers: a % b.
    Remainder(Box<Expression>, Box<Expression>),
    /// Subtracts two numbers: a - b.
    Subtract(Box<Expression>, Box<Expression>),

    /// Checks if a string matches a pattern: a LIKE b. % matches any run of
    /// characters and _ matches a single character, case-insensitively.
    Like(Box<Expression>, Box<Expression>),
    /// A LIKE with a constant pattern, compiled once at resolution.
    Matches(Box<Expression>, Pattern),

    /// A scalar function call.
    Function(Function, Vec<Expression>),
}

/// Scalar functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Function {
    /// ABS(x)
    Abs,
    /// COALESCE(a, b, ...), and the two-argument IFNULL, NVL and ISNULL.
    Coalesce,
    /// LENGTH(s), LEN(s)
    Length,
    /// LOWER(s), LCASE(s)
    Lower,
    /// UPPER(s), UCASE(s)
    Upper,
}

impl Function {
    /// Looks up a scalar function by lowercase name, checking the argument
    /// count.
    pub fn lookup(name: &str, args: usize) -> Result<Self> {
        let (function, arity) = match name {
            "abs" => (Self::Abs, Some(1)),
            "coalesce" => (Self::Coalesce, None),
            "ifnull" | "nvl" | "isnull" => (Self::Coalesce, Some(2)),
            "length" | "len" | "char_length" => (Self::Length, Some(1)),
            "lower" | "lcase" => (Self::Lower, Some(1)),
            "upper" | "ucase" => (Self::Upper, Some(1)),
            name => return errinvalid!("unknown function {name}"),
        };
        match arity {
            Some(arity) if arity != args => {
                errinvalid!("function {name} takes {arity} arguments, got {args}")
            }
            None if args == 0 => errinvalid!("function {name} takes at least 1 argument"),
            _ => Ok(function),
        }
    }
}

/// A compiled LIKE pattern. Compares by its source text.
#[derive(Clone, Debug)]
pub struct Pattern {
    pattern: String,
    regex: Regex,
}

impl Pattern {
    /// Compiles a LIKE pattern into a case-insensitive, anchored regex.
    pub fn new(pattern: &str) -> Result<Self> {
        let mut regex = String::from("(?is)^");
        for c in pattern.chars() {
            match c {
                '%' => regex.push_str(".*"),
                '_' => regex.push('.'),
                c => regex.push_str(&regex::escape(&c.to_string())),
            }
        }
        regex.push('$');
        Ok(Self { pattern: pattern.to_string(), regex: Regex::new(&regex)? })
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl Expression {
    /// Builds a LIKE expression. A constant string pattern is compiled here,
    /// rather than for every row.
    pub fn like(lhs: Expression, rhs: Expression) -> Result<Self> {
        Ok(match rhs {
            Self::Constant(Value::String(pattern)) => Self::Matches(lhs.into(), Pattern::new(&pattern)?),
            rhs => Self::Like(lhs.into(), rhs.into()),
        })
    }

    /// Evaluates an expression against a row, returning a value.
    pub fn evaluate(&self, row: &Row) -> Result<Value> {
        use Value::*;
        Ok(match self {
            Self::Constant(value) => value.clone(),
            Self::Column(index) => match row.get(*index) {
                Some(value) => value.clone(),
                None => return errinvalid!("column index {index} out of bounds"),
            },

            // Logical operations. Takes three-valued logic into account.
            Self::And(lhs, rhs) => match (lhs.evaluate(row)?, rhs.evaluate(row)?) {
                (Boolean(lhs), Boolean(rhs)) => Boolean(lhs && rhs),
                (Boolean(b), Null) | (Null, Boolean(b)) if !b => Boolean(false),
                (Boolean(_), Null) | (Null, Boolean(_)) | (Null, Null) => Null,
                (lhs, rhs) => return errtype!("can't AND {lhs} and {rhs}"),
            },
            Self::Or(lhs, rhs) => match (lhs.evaluate(row)?, rhs.evaluate(row)?) {
                (Boolean(lhs), Boolean(rhs)) => Boolean(lhs || rhs),
                (Boolean(b), Null) | (Null, Boolean(b)) if b => Boolean(true),
                (Boolean(_), Null) | (Null, Boolean(_)) | (Null, Null) => Null,
                (lhs, rhs) => return errtype!("can't OR {lhs} and {rhs}"),
            },
            Self::Not(expr) => match expr.evaluate(row)? {
                Boolean(b) => Boolean(!b),
                Null => Null,
                value => return errtype!("can't NOT {value}"),
            },

            // Comparisons. Any NULL operand yields NULL.
            Self::Equal(lhs, rhs) => Self::compare(lhs, rhs, row, |o| o.is_eq())?,
            Self::NotEqual(lhs, rhs) => Self::compare(lhs, rhs, row, |o| o.is_ne())?,
            Self::GreaterThan(lhs, rhs) => Self::compare(lhs, rhs, row, |o| o.is_gt())?,
            Self::GreaterThanOrEqual(lhs, rhs) => Self::compare(lhs, rhs, row, |o| o.is_ge())?,
            Self::LessThan(lhs, rhs) => Self::compare(lhs, rhs, row, |o| o.is_lt())?,
            Self::LessThanOrEqual(lhs, rhs) => Self::compare(lhs, rhs, row, |o| o.is_le())?,
            Self::In(expr, list) => {
                let value = expr.evaluate(row)?;
                if value == Null {
                    return Ok(Null);
                }
                let mut result = Boolean(false);
                for item in list {
                    match value.compare(&item.evaluate(row)?)? {
                        Some(ordering) if ordering.is_eq() => return Ok(Boolean(true)),
                        Some(_) => {}
                        None => result = Null,
                    }
                }
                result
            }
            Self::IsNull(expr) => Boolean(expr.evaluate(row)? == Null),

            // Arithmetic.
            Self::Add(lhs, rhs) => lhs.evaluate(row)?.checked_add(&rhs.evaluate(row)?)?,
            Self::Divide(lhs, rhs) => lhs.evaluate(row)?.checked_div(&rhs.evaluate(row)?)?,
            Self::Multiply(lhs, rhs) => lhs.evaluate(row)?.checked_mul(&rhs.evaluate(row)?)?,
            Self::Remainder(lhs, rhs) => lhs.evaluate(row)?.checked_rem(&rhs.evaluate(row)?)?,
            Self::Subtract(lhs, rhs) => lhs.evaluate(row)?.checked_sub(&rhs.evaluate(row)?)?,
            Self::Identity(expr) => match expr.evaluate(row)? {
                value @ (Integer(_) | Float(_) | Null) => value,
                value => return errtype!("can't take the positive of {value}"),
            },
            Self::Negate(expr) => match expr.evaluate(row)? {
                Integer(i) => match i.checked_neg() {
                    Some(i) => Integer(i),
                    None => return errinvalid!("integer overflow"),
                },
                Float(f) => Float(-f),
                Null => Null,
                value => return errtype!("can't negate {value}"),
            },

            // String operations.
            Self::Concat(lhs, rhs) => match (lhs.evaluate(row)?, rhs.evaluate(row)?) {
                (Null, _) | (_, Null) => Null,
                (Boolean(_), _) | (_, Boolean(_)) => {
                    return errtype!("can't concatenate booleans");
                }
                (lhs, rhs) => String(format!("{lhs}{rhs}")),
            },
            Self::Like(lhs, rhs) => match (lhs.evaluate(row)?, rhs.evaluate(row)?) {
                (String(lhs), String(rhs)) => Boolean(Pattern::new(&rhs)?.is_match(&lhs)),
                (String(_), Null) | (Null, String(_)) | (Null, Null) => Null,
                (lhs, rhs) => return errtype!("can't LIKE {lhs} and {rhs}"),
            },
            Self::Matches(expr, pattern) => match expr.evaluate(row)? {
                String(value) => Boolean(pattern.is_match(&value)),
                Null => Null,
                value => return errtype!("can't LIKE {value} and {pattern}"),
            },

            Self::Function(function, args) => {
                let args: Vec<Value> = args.iter().map(|a| a.evaluate(row)).collect::<Result<_>>()?;
                evaluate_function(*function, args)?
            }
        })
    }

    /// Compares two operands with SQL semantics, mapping the ordering to a
    /// boolean, or NULL if either operand is NULL.
    fn compare(
        lhs: &Expression,
        rhs: &Expression,
        row: &Row,
        check: impl Fn(std::cmp::Ordering) -> bool,
    ) -> Result<Value> {
        Ok(match lhs.evaluate(row)?.compare(&rhs.evaluate(row)?)? {
            Some(ordering) => Value::Boolean(check(ordering)),
            None => Value::Null,
        })
    }
}

/// Evaluates a scalar function on its arguments.
fn evaluate_function(function: Function, mut args: Vec<Value>) -> Result<Value> {
    use Value::*;
    Ok(match function {
        Function::Coalesce => args.into_iter().find(|v| *v != Null).unwrap_or(Null),
        Function::Abs => match args.remove(0) {
            Integer(i) => match i.checked_abs() {
                Some(i) => Integer(i),
                None => return errinvalid!("integer overflow"),
            },
            Float(f) => Float(f.abs()),
            Null => Null,
            value => return errtype!("can't take ABS of {value}"),
        },
        Function::Length => match args.remove(0) {
            String(s) => Integer(s.chars().count() as i64),
            Null => Null,
            value => return errtype!("can't take LENGTH of {value}"),
        },
        Function::Lower => match args.remove(0) {
            String(s) => String(s.to_lowercase()),
            Null => Null,
            value => return errtype!("can't take LOWER of {value}"),
        },
        Function::Upper => match args.remove(0) {
            String(s) => String(s.to_uppercase()),
            Null => Null,
            value => return errtype!("can't take UPPER of {value}"),
        },
    })
}
