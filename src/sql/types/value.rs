use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{errinvalid, errtype};

/// A primitive SQL data type. Dialect type names (VARCHAR, NUMBER, BIT, ...)
/// map onto these.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// A boolean: true or false.
    Boolean,
    /// A 64-bit signed integer.
    Integer,
    /// A 64-bit floating point number.
    Float,
    /// A UTF-8 encoded string.
    String,
}

impl DataType {
    /// Maps a dialect type name, case-insensitively, to a data type. Length,
    /// precision and scale arguments are not part of the name.
    pub fn from_type_name(name: &str) -> Option<Self> {
        Some(match name.to_lowercase().as_str() {
            "bool" | "boolean" | "bit" => Self::Boolean,
            "int" | "integer" | "bigint" | "smallint" | "tinyint" | "mediumint" | "serial"
            | "bigserial" | "int2" | "int4" | "int8" => Self::Integer,
            "float" | "double" | "real" | "decimal" | "numeric" | "number" | "money" => Self::Float,
            "char" | "nchar" | "varchar" | "nvarchar" | "varchar2" | "nvarchar2" | "text"
            | "ntext" | "string" | "clob" | "date" | "datetime" | "datetime2" | "timestamp"
            | "time" | "uuid" | "uniqueidentifier" => Self::String,
            _ => return None,
        })
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::Boolean => "BOOLEAN",
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::String => "STRING",
        })
    }
}

/// A primitive value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Value {
    /// An unknown value of unknown type.
    Null,
    /// A boolean.
    Boolean(bool),
    /// A 64-bit signed integer.
    Integer(i64),
    /// A 64-bit floating point number.
    Float(f64),
    /// A UTF-8 encoded string.
    String(String),
}

/// Values compare by identity, not SQL semantics: NULL equals NULL, floats
/// are equal iff their bits are, and 1 is not equal to 1.0. This is what
/// DISTINCT, GROUP BY and hash maps need. SQL comparisons use
/// [`Value::compare`].
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Boolean(l), Self::Boolean(r)) => l == r,
            (Self::Integer(l), Self::Integer(r)) => l == r,
            (Self::Float(l), Self::Float(r)) => l.to_bits() == r.to_bits(),
            (Self::String(l), Self::String(r)) => l == r,
            (Self::Null, Self::Null) => true,
            (_, _) => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Boolean(v) => v.hash(state),
            Self::Integer(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::String(v) => v.hash(state),
        }
    }
}

/// A total order for sorting: NULL first, then booleans, numbers (integers
/// and floats interleaved by value) and strings.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Boolean(a), Boolean(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Integer(a), Float(b)) => (*a as f64).total_cmp(b).then(Ordering::Less),
            (Float(a), Integer(b)) => a.total_cmp(&(*b as f64)).then(Ordering::Greater),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Value {
    /// Returns the value's datatype, or None for null values.
    pub fn datatype(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Boolean(_) => Some(DataType::Boolean),
            Self::Integer(_) => Some(DataType::Integer),
            Self::Float(_) => Some(DataType::Float),
            Self::String(_) => Some(DataType::String),
        }
    }

    /// The type rank in the total order.
    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Integer(_) | Self::Float(_) => 2,
            Self::String(_) => 3,
        }
    }

    /// Compares two values with SQL semantics. Returns None if either value is
    /// NULL (or NaN). Integers and floats compare by value, and a string that
    /// parses as a number compares numerically with a number. Any other pair
    /// of types is a type mismatch.
    pub fn compare(&self, other: &Self) -> Result<Option<Ordering>> {
        use Value::*;
        Ok(match (self, other) {
            (Null, _) | (_, Null) => None,
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Integer(a), Integer(b)) => Some(a.cmp(b)),
            (Integer(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (String(a), String(b)) => Some(a.cmp(b)),
            (String(s), number @ (Integer(_) | Float(_))) => {
                Self::parse_number(s, number)?.compare(number)?
            }
            (number @ (Integer(_) | Float(_)), String(s)) => {
                number.compare(&Self::parse_number(s, number)?)?
            }
            (a, b) => return errtype!("can't compare {a} and {b}"),
        })
    }

    /// Parses a string for comparison with a number.
    fn parse_number(s: &str, number: &Value) -> Result<Value> {
        match s.trim().parse::<f64>() {
            Ok(f) => Ok(Value::Float(f)),
            Err(_) => errtype!("can't compare '{s}' and {number}"),
        }
    }

    /// Adds two values. Errors when invalid.
    pub fn checked_add(&self, other: &Self) -> Result<Self> {
        use Value::*;
        Ok(match (self, other) {
            (Integer(lhs), Integer(rhs)) => match lhs.checked_add(*rhs) {
                Some(i) => Integer(i),
                None => return errinvalid!("integer overflow"),
            },
            (Integer(lhs), Float(rhs)) => Float(*lhs as f64 + rhs),
            (Float(lhs), Integer(rhs)) => Float(lhs + *rhs as f64),
            (Float(lhs), Float(rhs)) => Float(lhs + rhs),
            (Null, Integer(_) | Float(_) | Null) => Null,
            (Integer(_) | Float(_), Null) => Null,
            (lhs, rhs) => return errtype!("can't add {lhs} and {rhs}"),
        })
    }

    /// Divides two values. Errors when invalid.
    pub fn checked_div(&self, other: &Self) -> Result<Self> {
        use Value::*;
        Ok(match (self, other) {
            (Integer(_), Integer(0)) => return errinvalid!("can't divide by zero"),
            (Integer(lhs), Integer(rhs)) => match lhs.checked_div(*rhs) {
                Some(i) => Integer(i),
                None => return errinvalid!("integer overflow"),
            },
            (Integer(lhs), Float(rhs)) => Float(*lhs as f64 / rhs),
            (Float(lhs), Integer(rhs)) => Float(lhs / *rhs as f64),
            (Float(lhs), Float(rhs)) => Float(lhs / rhs),
            (Null, Integer(_) | Float(_) | Null) => Null,
            (Integer(_) | Float(_), Null) => Null,
            (lhs, rhs) => return errtype!("can't divide {lhs} and {rhs}"),
        })
    }

    /// Multiplies two values. Errors when invalid.
    pub fn checked_mul(&self, other: &Self) -> Result<Self> {
        use Value::*;
        Ok(match (self, other) {
            (Integer(lhs), Integer(rhs)) => match lhs.checked_mul(*rhs) {
                Some(i) => Integer(i),
                None => return errinvalid!("integer overflow"),
            },
            (Integer(lhs), Float(rhs)) => Float(*lhs as f64 * rhs),
            (Float(lhs), Integer(rhs)) => Float(lhs * *rhs as f64),
            (Float(lhs), Float(rhs)) => Float(lhs * rhs),
            (Null, Integer(_) | Float(_) | Null) => Null,
            (Integer(_) | Float(_), Null) => Null,
            (lhs, rhs) => return errtype!("can't multiply {lhs} and {rhs}"),
        })
    }

    /// Finds the remainder of two values. Errors when invalid.
    ///
    /// NB: uses the remainder, not modulo, like Postgres. For negative values,
    /// the result has the sign of the dividend, rather than always returning a
    /// positive value (modulo).
    pub fn checked_rem(&self, other: &Self) -> Result<Self> {
        use Value::*;
        Ok(match (self, other) {
            (Integer(_), Integer(0)) => return errinvalid!("can't divide by zero"),
            (Integer(lhs), Integer(rhs)) => match lhs.checked_rem(*rhs) {
                Some(i) => Integer(i),
                None => return errinvalid!("integer overflow"),
            },
            (Integer(lhs), Float(rhs)) => Float(*lhs as f64 % rhs),
            (Float(lhs), Integer(rhs)) => Float(lhs % *rhs as f64),
            (Float(lhs), Float(rhs)) => Float(lhs % rhs),
            (Null, Integer(_) | Float(_) | Null) => Null,
            (Integer(_) | Float(_), Null) => Null,
            (lhs, rhs) => return errtype!("can't take remainder of {lhs} and {rhs}"),
        })
    }

    /// Subtracts two values. Errors when invalid.
    pub fn checked_sub(&self, other: &Self) -> Result<Self> {
        use Value::*;
        Ok(match (self, other) {
            (Integer(lhs), Integer(rhs)) => match lhs.checked_sub(*rhs) {
                Some(i) => Integer(i),
                None => return errinvalid!("integer overflow"),
            },
            (Integer(lhs), Float(rhs)) => Float(*lhs as f64 - rhs),
            (Float(lhs), Integer(rhs)) => Float(lhs - *rhs as f64),
            (Float(lhs), Float(rhs)) => Float(lhs - rhs),
            (Null, Integer(_) | Float(_) | Null) => Null,
            (Integer(_) | Float(_), Null) => Null,
            (lhs, rhs) => return errtype!("can't subtract {lhs} and {rhs}"),
        })
    }

    /// Coerces the value to a column's data type, for storage. Integers widen
    /// to floats, integral floats narrow to integers, and 0/1 become booleans.
    /// NULL passes through; nullability is checked by the table.
    pub fn coerce(self, datatype: DataType) -> Result<Self> {
        use Value::*;
        Ok(match (self, datatype) {
            (Null, _) => Null,
            (value, datatype) if value.datatype() == Some(datatype) => value,
            (Integer(i), DataType::Float) => Float(i as f64),
            (Float(f), DataType::Integer)
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 =>
            {
                Integer(f as i64)
            }
            (Integer(i @ (0 | 1)), DataType::Boolean) => Boolean(i == 1),
            (value, datatype) => return errtype!("can't store {value} in {datatype} column"),
        })
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Boolean(true) => f.write_str("TRUE"),
            Self::Boolean(false) => f.write_str("FALSE"),
            Self::Integer(integer) => integer.fmt(f),
            Self::Float(float) => write!(f, "{float:?}"),
            Self::String(string) => f.write_str(string),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        let Value::Boolean(b) = value else { return errtype!("not boolean: {value}") };
        Ok(b)
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        let Value::Float(f) = value else { return errtype!("not float: {value}") };
        Ok(f)
    }
}

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        let Value::Integer(i) = value else { return errtype!("not integer: {value}") };
        Ok(i)
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        let Value::String(s) = value else { return errtype!("not string: {value}") };
        Ok(s)
    }
}

/// A row of values.
pub type Row = Vec<Value>;

/// A row iterator. Result sets are single-pass: rows are produced on demand,
/// and can't be rewound.
pub type Rows = Box<dyn Iterator<Item = Result<Row>> + Send>;
