use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use lockstep_normalize::ExtraName;
use lockstep_pep440::{Operator, VersionSpecifier};

use crate::Pep508Error;
use crate::cursor::Cursor;
use crate::marker::MarkerEnvironment;

/// A marker variable whose value is a PEP 440 version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerValueVersion {
    /// `implementation_version`
    ImplementationVersion,
    /// `python_full_version`
    PythonFullVersion,
    /// `python_version`
    PythonVersion,
}

impl Display for MarkerValueVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ImplementationVersion => "implementation_version",
            Self::PythonFullVersion => "python_full_version",
            Self::PythonVersion => "python_version",
        })
    }
}

/// A marker variable whose value is an arbitrary string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerValueString {
    /// `implementation_name`
    ImplementationName,
    /// `os_name`
    OsName,
    /// `platform_machine`
    PlatformMachine,
    /// `platform_python_implementation`
    PlatformPythonImplementation,
    /// `platform_release`
    PlatformRelease,
    /// `platform_system`
    PlatformSystem,
    /// `platform_version`
    PlatformVersion,
    /// `sys_platform`
    SysPlatform,
}

impl MarkerValueString {
    pub const ALL: [Self; 8] = [
        Self::ImplementationName,
        Self::OsName,
        Self::PlatformMachine,
        Self::PlatformPythonImplementation,
        Self::PlatformRelease,
        Self::PlatformSystem,
        Self::PlatformVersion,
        Self::SysPlatform,
    ];
}

impl Display for MarkerValueString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ImplementationName => "implementation_name",
            Self::OsName => "os_name",
            Self::PlatformMachine => "platform_machine",
            Self::PlatformPythonImplementation => "platform_python_implementation",
            Self::PlatformRelease => "platform_release",
            Self::PlatformSystem => "platform_system",
            Self::PlatformVersion => "platform_version",
            Self::SysPlatform => "sys_platform",
        })
    }
}

/// The comparison operators allowed in markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    TildeEqual,
    ExactEqual,
    In,
    NotIn,
}

impl MarkerOperator {
    /// The equivalent PEP 440 operator, for comparisons against a version variable.
    fn to_pep440(self) -> Option<Operator> {
        Some(match self {
            Self::Equal => Operator::Equal,
            Self::NotEqual => Operator::NotEqual,
            Self::GreaterThan => Operator::GreaterThan,
            Self::GreaterEqual => Operator::GreaterThanEqual,
            Self::LessThan => Operator::LessThan,
            Self::LessEqual => Operator::LessThanEqual,
            Self::TildeEqual => Operator::TildeEqual,
            Self::ExactEqual => Operator::ExactEqual,
            Self::In | Self::NotIn => return None,
        })
    }
}

impl Display for MarkerOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterEqual => ">=",
            Self::LessThan => "<",
            Self::LessEqual => "<=",
            Self::TildeEqual => "~=",
            Self::ExactEqual => "===",
            Self::In => "in",
            Self::NotIn => "not in",
        })
    }
}

/// `extra == "..."` or `extra != "..."`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtraOperator {
    Equal,
    NotEqual,
}

/// A single comparison, such as `python_version >= "3.8"` or `extra == "socks"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarkerExpression {
    /// `python_version >= "3.8"`, normalized so the variable is on the left.
    Version {
        key: MarkerValueVersion,
        specifier: VersionSpecifier,
    },
    /// `sys_platform == "linux"`
    String {
        key: MarkerValueString,
        operator: MarkerOperator,
        value: String,
    },
    /// `"linux" in sys_platform`
    StringInverted {
        value: String,
        operator: MarkerOperator,
        key: MarkerValueString,
    },
    /// `extra == "socks"`
    Extra {
        operator: ExtraOperator,
        name: ExtraName,
    },
}

impl MarkerExpression {
    /// Evaluate against a concrete environment and a set of activated extras.
    pub fn evaluate(&self, environment: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        match self {
            Self::Version { key, specifier } => specifier.contains(environment.get_version(*key)),
            Self::String {
                key,
                operator,
                value,
            } => compare_strings(environment.get_string(*key), *operator, value),
            Self::StringInverted {
                value,
                operator,
                key,
            } => compare_strings(value, *operator, environment.get_string(*key)),
            Self::Extra { operator, name } => evaluate_extra(*operator, name, extras),
        }
    }
}

pub(crate) fn evaluate_extra(
    operator: ExtraOperator,
    name: &ExtraName,
    extras: &[ExtraName],
) -> bool {
    let active = extras.contains(name);
    match operator {
        ExtraOperator::Equal => active,
        ExtraOperator::NotEqual => !active,
    }
}

/// Compare two marker strings. Ordered comparisons of strings are legal but meaningless, and
/// evaluate lexicographically with a warning.
pub(crate) fn compare_strings(left: &str, operator: MarkerOperator, right: &str) -> bool {
    match operator {
        MarkerOperator::Equal | MarkerOperator::ExactEqual => left == right,
        MarkerOperator::NotEqual => left != right,
        MarkerOperator::In => right.contains(left),
        MarkerOperator::NotIn => !right.contains(left),
        MarkerOperator::TildeEqual => {
            warn!("Can't compare `{left}` and `{right}` with `~=`; evaluating to false");
            false
        }
        MarkerOperator::GreaterThan
        | MarkerOperator::GreaterEqual
        | MarkerOperator::LessThan
        | MarkerOperator::LessEqual => {
            warn!("Comparing `{left}` and `{right}` lexicographically with `{operator}`");
            match operator {
                MarkerOperator::GreaterThan => left > right,
                MarkerOperator::GreaterEqual => left >= right,
                MarkerOperator::LessThan => left < right,
                _ => left <= right,
            }
        }
    }
}

impl Display for MarkerExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version { key, specifier } => {
                let star = if matches!(
                    specifier.operator(),
                    Operator::EqualStar | Operator::NotEqualStar
                ) {
                    ".*"
                } else {
                    ""
                };
                write!(
                    f,
                    "{key} {} \"{}{star}\"",
                    specifier.operator(),
                    specifier.version()
                )
            }
            Self::String {
                key,
                operator,
                value,
            } => write!(f, "{key} {operator} {}", Quoted(value)),
            Self::StringInverted {
                value,
                operator,
                key,
            } => write!(f, "{} {operator} {key}", Quoted(value)),
            Self::Extra { operator, name } => {
                let operator = match operator {
                    ExtraOperator::Equal => "==",
                    ExtraOperator::NotEqual => "!=",
                };
                write!(f, "extra {operator} \"{name}\"")
            }
        }
    }
}

/// A marker string in double quotes, or single quotes when it contains a double quote.
struct Quoted<'a>(&'a str);

impl Display for Quoted<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0.contains('"') {
            write!(f, "'{}'", self.0)
        } else {
            write!(f, "\"{}\"", self.0)
        }
    }
}

/// A boolean combination of [`MarkerExpression`]s.
///
/// `And([])` is the marker that is always true and `Or([])` the marker that is always false.
/// The combinators flatten nested conjunctions and disjunctions, drop duplicates, and absorb
/// the constants, so a tree built from them never contains a constant below its root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarkerTree {
    Expression(MarkerExpression),
    And(Vec<MarkerTree>),
    Or(Vec<MarkerTree>),
}

impl MarkerTree {
    pub const TRUE: Self = Self::And(Vec::new());
    pub const FALSE: Self = Self::Or(Vec::new());

    pub fn expression(expression: MarkerExpression) -> Self {
        Self::Expression(expression)
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Self::And(children) if children.is_empty())
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Self::Or(children) if children.is_empty())
    }

    /// The conjunction of two markers.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        if self.is_false() || other.is_false() {
            return Self::FALSE;
        }
        let mut children = Vec::new();
        for tree in [self, other] {
            match tree {
                Self::And(nested) => children.extend(nested),
                tree => children.push(tree),
            }
        }
        Self::collect(children, Self::And)
    }

    /// The disjunction of two markers.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        if self.is_true() || other.is_true() {
            return Self::TRUE;
        }
        let mut children = Vec::new();
        for tree in [self, other] {
            match tree {
                Self::Or(nested) => children.extend(nested),
                tree => children.push(tree),
            }
        }
        Self::collect(children, Self::Or)
    }

    fn collect(children: Vec<Self>, wrap: fn(Vec<Self>) -> Self) -> Self {
        let mut unique: Vec<Self> = Vec::with_capacity(children.len());
        for child in children {
            if !unique.contains(&child) {
                unique.push(child);
            }
        }
        if unique.len() == 1 {
            unique.pop().unwrap_or(Self::TRUE)
        } else {
            wrap(unique)
        }
    }

    /// Evaluate against a concrete environment and a set of activated extras.
    pub fn evaluate(&self, environment: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        match self {
            Self::Expression(expression) => expression.evaluate(environment, extras),
            Self::And(children) => children
                .iter()
                .all(|child| child.evaluate(environment, extras)),
            Self::Or(children) => children
                .iter()
                .any(|child| child.evaluate(environment, extras)),
        }
    }

    /// The marker as text, or `None` for the marker that is always true.
    pub fn contents(&self) -> Option<String> {
        if self.is_true() {
            None
        } else {
            Some(self.to_string())
        }
    }

    /// Visit every expression in the tree.
    pub fn expressions(&self) -> Box<dyn Iterator<Item = &MarkerExpression> + '_> {
        match self {
            Self::Expression(expression) => Box::new(std::iter::once(expression)),
            Self::And(children) | Self::Or(children) => {
                Box::new(children.iter().flat_map(Self::expressions))
            }
        }
    }
}

impl Display for MarkerTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expression(expression) => write!(f, "{expression}"),
            Self::And(children) if children.is_empty() => f.write_str("true"),
            Self::Or(children) if children.is_empty() => f.write_str("false"),
            Self::And(children) => {
                for (index, child) in children.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" and ")?;
                    }
                    if matches!(child, Self::Or(_)) {
                        write!(f, "({child})")?;
                    } else {
                        write!(f, "{child}")?;
                    }
                }
                Ok(())
            }
            Self::Or(children) => {
                for (index, child) in children.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" or ")?;
                    }
                    write!(f, "{child}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for MarkerTree {
    type Err = Pep508Error;

    /// Parse a marker. The empty string is the marker that is always true.
    fn from_str(markers: &str) -> Result<Self, Self::Err> {
        if markers.trim().is_empty() {
            return Ok(Self::TRUE);
        }
        let mut cursor = Cursor::new(markers);
        let tree = parse_markers(&mut cursor)?;
        cursor.eat_whitespace();
        if let Some(unexpected) = cursor.peek() {
            return Err(cursor.error(
                format!("Unexpected character `{unexpected}`, expected `and`, `or` or end of input"),
                cursor.pos(),
                cursor.rest().len(),
            ));
        }
        Ok(tree)
    }
}

impl Serialize for MarkerTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.contents() {
            Some(contents) => serializer.serialize_str(&contents),
            None => serializer.serialize_str(""),
        }
    }
}

impl<'de> Deserialize<'de> for MarkerTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let markers = String::deserialize(deserializer)?;
        Self::from_str(&markers).map_err(serde::de::Error::custom)
    }
}

/// A parsed operand: either a marker variable or a quoted string.
enum MarkerValue {
    Version(MarkerValueVersion),
    String(MarkerValueString),
    Extra,
    Quoted(String),
}

/// `marker_or := marker_and ("or" marker_and)*`
pub(crate) fn parse_markers(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    let mut tree = parse_and(cursor)?;
    loop {
        cursor.eat_whitespace();
        if !cursor.eat_keyword("or") {
            return Ok(tree);
        }
        tree = tree.or(parse_and(cursor)?);
    }
}

/// `marker_and := marker_expr ("and" marker_expr)*`
fn parse_and(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    let mut tree = parse_expression(cursor)?;
    loop {
        cursor.eat_whitespace();
        if !cursor.eat_keyword("and") {
            return Ok(tree);
        }
        tree = tree.and(parse_expression(cursor)?);
    }
}

/// `marker_expr := "(" marker_or ")" | value operator value`
fn parse_expression(cursor: &mut Cursor) -> Result<MarkerTree, Pep508Error> {
    cursor.eat_whitespace();
    if cursor.eat_char('(') {
        let tree = parse_markers(cursor)?;
        cursor.eat_whitespace();
        cursor.expect(')')?;
        return Ok(tree);
    }

    let start = cursor.pos();
    let left = parse_value(cursor)?;
    cursor.eat_whitespace();
    let operator = parse_operator(cursor)?;
    cursor.eat_whitespace();
    let right = parse_value(cursor)?;
    let len = cursor.pos() - start;

    let expression = match (left, right) {
        (MarkerValue::Version(key), MarkerValue::Quoted(value)) => {
            version_expression(cursor, key, operator, &value, false, start, len)?
        }
        (MarkerValue::Quoted(value), MarkerValue::Version(key)) => {
            version_expression(cursor, key, operator, &value, true, start, len)?
        }
        (MarkerValue::String(key), MarkerValue::Quoted(value)) => MarkerExpression::String {
            key,
            operator,
            value,
        },
        (MarkerValue::Quoted(value), MarkerValue::String(key)) => {
            MarkerExpression::StringInverted {
                value,
                operator,
                key,
            }
        }
        (MarkerValue::Extra, MarkerValue::Quoted(value))
        | (MarkerValue::Quoted(value), MarkerValue::Extra) => {
            let operator = match operator {
                MarkerOperator::Equal => ExtraOperator::Equal,
                MarkerOperator::NotEqual => ExtraOperator::NotEqual,
                operator => {
                    return Err(cursor.error(
                        format!("The `extra` marker only supports `==` and `!=`, found `{operator}`"),
                        start,
                        len,
                    ));
                }
            };
            let name = ExtraName::from_str(&value)
                .map_err(|err| cursor.error(err.to_string(), start, len))?;
            MarkerExpression::Extra { operator, name }
        }
        (MarkerValue::Quoted(_), MarkerValue::Quoted(_)) => {
            return Err(cursor.error(
                "Expected a marker variable on one side of the comparison, found two quoted strings"
                    .to_string(),
                start,
                len,
            ));
        }
        _ => {
            return Err(cursor.error(
                "Expected a quoted string on one side of the comparison, found two marker variables"
                    .to_string(),
                start,
                len,
            ));
        }
    };
    Ok(MarkerTree::Expression(expression))
}

fn version_expression(
    cursor: &Cursor,
    key: MarkerValueVersion,
    operator: MarkerOperator,
    value: &str,
    inverted: bool,
    start: usize,
    len: usize,
) -> Result<MarkerExpression, Pep508Error> {
    let Some(mut pep440) = operator.to_pep440() else {
        return Err(cursor.error(
            format!("The `{operator}` operator can't be used with the version variable `{key}`"),
            start,
            len,
        ));
    };
    if inverted {
        pep440 = pep440.reverse().ok_or_else(|| {
            cursor.error(
                format!("The `{operator}` operator requires the version variable `{key}` on the left"),
                start,
                len,
            )
        })?;
    }
    let specifier = VersionSpecifier::from_str(&format!("{pep440}{value}")).map_err(|err| {
        cursor.error(
            format!("Expected a PEP 440 version to compare with `{key}`, found `{value}`: {err}"),
            start,
            len,
        )
    })?;
    Ok(MarkerExpression::Version { key, specifier })
}

fn parse_value(cursor: &mut Cursor) -> Result<MarkerValue, Pep508Error> {
    let start = cursor.pos();
    match cursor.peek() {
        Some(quote @ ('"' | '\'')) => {
            cursor.next();
            let value = cursor.take_while(|char| char != quote);
            if !cursor.eat_char(quote) {
                return Err(cursor.error(
                    format!("Missing closing quote `{quote}`"),
                    start,
                    cursor.pos() - start,
                ));
            }
            Ok(MarkerValue::Quoted(value.to_string()))
        }
        Some(char) if char.is_ascii_alphabetic() => {
            let key =
                cursor.take_while(|char| char.is_ascii_alphanumeric() || matches!(char, '_' | '.'));
            Ok(match key {
                "implementation_version" => {
                    MarkerValue::Version(MarkerValueVersion::ImplementationVersion)
                }
                "python_full_version" => {
                    MarkerValue::Version(MarkerValueVersion::PythonFullVersion)
                }
                "python_version" => MarkerValue::Version(MarkerValueVersion::PythonVersion),
                "implementation_name" => MarkerValue::String(MarkerValueString::ImplementationName),
                "os_name" | "os.name" => MarkerValue::String(MarkerValueString::OsName),
                "platform_machine" | "platform.machine" => {
                    MarkerValue::String(MarkerValueString::PlatformMachine)
                }
                "platform_python_implementation" | "platform.python_implementation" => {
                    MarkerValue::String(MarkerValueString::PlatformPythonImplementation)
                }
                "platform_release" => MarkerValue::String(MarkerValueString::PlatformRelease),
                "platform_system" => MarkerValue::String(MarkerValueString::PlatformSystem),
                "platform_version" | "platform.version" => {
                    MarkerValue::String(MarkerValueString::PlatformVersion)
                }
                "sys_platform" | "sys.platform" => {
                    MarkerValue::String(MarkerValueString::SysPlatform)
                }
                "extra" => MarkerValue::Extra,
                unknown => {
                    return Err(cursor.error(
                        format!("Expected a marker variable, found `{unknown}`"),
                        start,
                        unknown.len(),
                    ));
                }
            })
        }
        Some(other) => Err(cursor.error(
            format!("Expected a quoted string or a marker variable, found `{other}`"),
            start,
            other.len_utf8(),
        )),
        None => Err(cursor.error(
            "Expected a quoted string or a marker variable, found end of input".to_string(),
            start,
            1,
        )),
    }
}

fn parse_operator(cursor: &mut Cursor) -> Result<MarkerOperator, Pep508Error> {
    const OPERATORS: [(&str, MarkerOperator); 8] = [
        ("===", MarkerOperator::ExactEqual),
        ("==", MarkerOperator::Equal),
        ("!=", MarkerOperator::NotEqual),
        ("~=", MarkerOperator::TildeEqual),
        ("<=", MarkerOperator::LessEqual),
        (">=", MarkerOperator::GreaterEqual),
        ("<", MarkerOperator::LessThan),
        (">", MarkerOperator::GreaterThan),
    ];
    for (token, operator) in OPERATORS {
        if cursor.rest().starts_with(token) {
            for _ in 0..token.len() {
                cursor.next();
            }
            return Ok(operator);
        }
    }
    if cursor.eat_keyword("in") {
        return Ok(MarkerOperator::In);
    }
    let start = cursor.pos();
    if cursor.eat_keyword("not") {
        cursor.eat_whitespace();
        if cursor.eat_keyword("in") {
            return Ok(MarkerOperator::NotIn);
        }
        return Err(cursor.error(
            "Expected `in` after `not`".to_string(),
            start,
            cursor.pos() - start,
        ));
    }
    let found = cursor
        .rest()
        .split_whitespace()
        .next()
        .unwrap_or("end of input")
        .to_string();
    Err(cursor.error(
        format!("Expected a comparison operator, found `{found}`"),
        start,
        found.len().max(1),
    ))
}
