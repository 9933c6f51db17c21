use crate::errparam;
use crate::error::Result;
use crate::sql::parser::ast::Placeholder;
use crate::sql::types::Value;

/// Prefixes stripped from parameter names before matching them against
/// placeholders.
const PREFIXES: &[char] = &['@', ':', '?'];

/// A parameter direction. Only input parameters are bound to placeholders.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

/// A command parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    /// The parameter name, with or without its prefix. None for positional
    /// parameters.
    pub name: Option<String>,
    pub value: Value,
    pub direction: Direction,
}

impl Parameter {
    /// Creates a named input parameter.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { name: Some(name.into()), value: value.into(), direction: Direction::Input }
    }

    /// Creates a positional input parameter.
    pub fn positional(value: impl Into<Value>) -> Self {
        Self { name: None, value: value.into(), direction: Direction::Input }
    }

    /// Sets the parameter direction.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Whether the parameter supplies a value to the statement.
    pub fn is_input(&self) -> bool {
        matches!(self.direction, Direction::Input | Direction::InputOutput)
    }

    /// Whether the parameter name matches a placeholder name, ignoring
    /// prefixes and case.
    fn matches(&self, name: &str) -> bool {
        self.name.as_deref().is_some_and(|n| {
            n.trim_start_matches(PREFIXES).eq_ignore_ascii_case(name.trim_start_matches(PREFIXES))
        })
    }
}

/// A command's parameter collection, in the order parameters were added.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Parameters(Vec<Parameter>);

impl Parameters {
    /// Creates an empty parameter collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter.
    pub fn add(&mut self, parameter: Parameter) {
        self.0.push(parameter);
    }

    /// Removes all parameters.
    pub fn clear(&mut self) {
        self.0.clear()
    }

    /// Fetches a parameter by name, ignoring prefixes and case.
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.0.iter().find(|p| p.matches(name))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.0.iter()
    }

    /// Looks up the value for a placeholder. Named placeholders match input
    /// parameters by name, positional placeholders match the input parameter
    /// at that ordinal.
    pub fn lookup(&self, placeholder: &Placeholder) -> Result<Value> {
        let mut inputs = self.0.iter().filter(|p| p.is_input());
        let parameter = match placeholder {
            Placeholder::Named(name) => inputs.find(|p| p.matches(name)),
            Placeholder::Positional(ordinal) => inputs.nth(*ordinal),
        };
        match parameter {
            Some(parameter) => Ok(parameter.value.clone()),
            None => errparam!("no input parameter given for placeholder {placeholder}"),
        }
    }
}

impl FromIterator<Parameter> for Parameters {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
