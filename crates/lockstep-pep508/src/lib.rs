//! PEP 508 dependency specifiers and environment markers.
//!
//! ```text
//! requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"
//! ```
//!
//! Besides evaluating markers against a concrete [`MarkerEnvironment`], markers can be decided
//! for a whole range of environments at once with [`MarkerTree::evaluate_symbolic`]: a lock
//! for `requires-python >= 3.8` on Linux knows that `sys_platform == "win32"` never holds, but
//! has to keep `python_version < "3.10"` around.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use lockstep_normalize::{ExtraName, PackageName};
use lockstep_pep440::VersionSpecifiers;

pub use crate::marker::{
    ExtraOperator, MarkerEnvironment, MarkerExpression, MarkerOperator, MarkerTree, MarkerTruth,
    MarkerValueString, MarkerValueVersion, RangedEnvironment,
};
use crate::cursor::Cursor;

mod cursor;
pub mod marker;

/// A requirement string that failed to parse, with the span of the offending text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pep508Error {
    message: String,
    input: String,
    /// Byte offset of the span.
    start: usize,
    /// Byte length of the span.
    len: usize,
}

impl Pep508Error {
    pub(crate) fn new(message: String, input: &str, start: usize, len: usize) -> Self {
        Self {
            message,
            input: input.to_string(),
            start,
            len,
        }
    }

    /// The error without the input and the span marker.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Pep508Error {
    /// ```text
    /// Expected `)`, found end of input
    /// requests (>=2.0
    ///                ^
    /// ```
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let start = self.start.min(self.input.len());
        let end = (start + self.len).min(self.input.len());
        let (Some(before), Some(span)) = (self.input.get(..start), self.input.get(start..end))
        else {
            return write!(f, "{}\n{}", self.message, self.input);
        };
        write!(
            f,
            "{}\n{}\n{}{}",
            self.message,
            self.input,
            " ".repeat(before.chars().count()),
            "^".repeat(span.chars().count().max(1)),
        )
    }
}

impl std::error::Error for Pep508Error {}

/// Either a set of version specifiers or a direct URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionOrUrl {
    /// `requests >= 2.8.1, == 2.8.*`
    VersionSpecifier(VersionSpecifiers),
    /// `flask @ https://files.example.com/flask-3.0.0-py3-none-any.whl`
    Url(Url),
}

/// A PEP 508 dependency specifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    /// The distribution name such as `requests` in
    /// `requests [security,tests] >= 2.8.1, == 2.8.* ; python_version > "3.8"`.
    pub name: PackageName,
    /// The extras such as `security` and `tests`.
    pub extras: Vec<ExtraName>,
    /// The version specifiers such as `>= 2.8.1, == 2.8.*`, or a direct URL.
    pub version_or_url: Option<VersionOrUrl>,
    /// The marker such as `python_version > "3.8"`, [`MarkerTree::TRUE`] if absent.
    pub marker: MarkerTree,
}

impl Requirement {
    /// Whether the requirement applies to `environment` when `extras` are activated.
    pub fn evaluate_markers(&self, environment: &MarkerEnvironment, extras: &[ExtraName]) -> bool {
        self.marker.evaluate(environment, extras)
    }
}

impl Display for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.extras.is_empty() {
            let extras: Vec<String> = self.extras.iter().map(ToString::to_string).collect();
            write!(f, "[{}]", extras.join(","))?;
        }
        match &self.version_or_url {
            Some(VersionOrUrl::VersionSpecifier(specifiers)) => write!(f, "{specifiers}")?,
            // The space before the marker separates it from the URL.
            Some(VersionOrUrl::Url(url)) => write!(f, " @ {url}")?,
            None => {}
        }
        if let Some(marker) = self.marker.contents() {
            write!(f, " ; {marker}")?;
        }
        Ok(())
    }
}

impl FromStr for Requirement {
    type Err = Pep508Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        parse_requirement(&mut Cursor::new(input))
    }
}

impl Serialize for Requirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Requirement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let requirement = String::deserialize(deserializer)?;
        Self::from_str(&requirement).map_err(serde::de::Error::custom)
    }
}

fn is_name_char(char: char) -> bool {
    char.is_ascii_alphanumeric() || matches!(char, '-' | '_' | '.')
}

/// `name [extras] (@ url | specifiers)? (; marker)?`
fn parse_requirement(cursor: &mut Cursor) -> Result<Requirement, Pep508Error> {
    cursor.eat_whitespace();
    let start = cursor.pos();
    let name = match cursor.peek() {
        Some(char) if char.is_ascii_alphanumeric() => cursor.take_while(is_name_char),
        Some(other) => {
            return Err(cursor.error(
                format!("Expected package name starting with an alphanumeric character, found `{other}`"),
                start,
                other.len_utf8(),
            ));
        }
        None => return Err(cursor.error("Empty requirement".to_string(), start, 1)),
    };
    let name = PackageName::from_str(name)
        .map_err(|err| cursor.error(err.to_string(), start, name.len()))?;

    cursor.eat_whitespace();
    let extras = parse_extras(cursor)?;

    cursor.eat_whitespace();
    let version_or_url = parse_version_or_url(cursor)?;

    cursor.eat_whitespace();
    let has_marker = cursor.eat_char(';');
    let marker = if has_marker {
        marker::parse_markers(cursor)?
    } else {
        MarkerTree::TRUE
    };

    cursor.eat_whitespace();
    if let Some(unexpected) = cursor.peek() {
        let expected = if has_marker {
            "`and`, `or` or end of input"
        } else if version_or_url.is_some() {
            "`;` or end of input"
        } else {
            "`[`, `@`, a version specifier or `;`"
        };
        let message = format!("Unexpected character `{unexpected}`, expected {expected}");
        return Err(cursor.error(message, cursor.pos(), cursor.rest().len()));
    }

    Ok(Requirement {
        name,
        extras,
        version_or_url,
        marker,
    })
}

/// `[extra, extra]`, or nothing.
fn parse_extras(cursor: &mut Cursor) -> Result<Vec<ExtraName>, Pep508Error> {
    let mut extras = Vec::new();
    if !cursor.eat_char('[') {
        return Ok(extras);
    }
    loop {
        cursor.eat_whitespace();
        if cursor.eat_char(']') {
            return Ok(extras);
        }
        let start = cursor.pos();
        let extra = cursor.take_while(is_name_char);
        if extra.is_empty() {
            return Err(match cursor.peek() {
                Some(other) => cursor.error(
                    format!("Expected an extra name, found `{other}`"),
                    start,
                    other.len_utf8(),
                ),
                None => cursor.error("Missing closing bracket `]`".to_string(), start, 1),
            });
        }
        let extra = ExtraName::from_str(extra)
            .map_err(|err| cursor.error(err.to_string(), start, extra.len()))?;
        if !extras.contains(&extra) {
            extras.push(extra);
        }
        cursor.eat_whitespace();
        if !cursor.eat_char(',') {
            cursor.expect(']')?;
            return Ok(extras);
        }
    }
}

fn parse_version_or_url(cursor: &mut Cursor) -> Result<Option<VersionOrUrl>, Pep508Error> {
    let start = cursor.pos();
    match cursor.peek() {
        Some('@') => {
            cursor.next();
            cursor.eat_whitespace();
            let url_start = cursor.pos();
            let url = cursor.take_while(|char| !char.is_whitespace());
            if url.is_empty() {
                return Err(cursor.error("Expected a URL after `@`".to_string(), start, 1));
            }
            let url = Url::parse(url).map_err(|err| {
                cursor.error(format!("Invalid URL `{url}`: {err}"), url_start, url.len())
            })?;
            Ok(Some(VersionOrUrl::Url(url)))
        }
        Some('(') => {
            cursor.next();
            let text = cursor.take_while(|char| char != ')' && char != ';');
            let specifiers = parse_specifiers(cursor, text, start + 1)?;
            cursor.expect(')')?;
            Ok(Some(VersionOrUrl::VersionSpecifier(specifiers)))
        }
        Some('<' | '>' | '=' | '!' | '~') => {
            let text = cursor.take_while(|char| char != ';');
            let specifiers = parse_specifiers(cursor, text.trim_end(), start)?;
            Ok(Some(VersionOrUrl::VersionSpecifier(specifiers)))
        }
        _ => Ok(None),
    }
}

fn parse_specifiers(
    cursor: &Cursor,
    text: &str,
    start: usize,
) -> Result<VersionSpecifiers, Pep508Error> {
    VersionSpecifiers::from_str(text)
        .map_err(|err| cursor.error(err.to_string(), start, text.len()))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use lockstep_pep440::Version;

    use super::*;

    fn linux_311() -> MarkerEnvironment {
        MarkerEnvironment {
            implementation_name: "cpython".to_string(),
            implementation_version: Version::from_str("3.11.4").unwrap(),
            os_name: "posix".to_string(),
            platform_machine: "x86_64".to_string(),
            platform_python_implementation: "CPython".to_string(),
            platform_release: "6.1.0".to_string(),
            platform_system: "Linux".to_string(),
            platform_version: "#1 SMP".to_string(),
            python_full_version: Version::from_str("3.11.4").unwrap(),
            python_version: Version::from_str("3.11").unwrap(),
            sys_platform: "linux".to_string(),
        }
    }

    #[test]
    fn full_requirement() {
        let requirement = Requirement::from_str(
            r#"Requests [Security, tests] >= 2.8.1, == 2.8.* ; python_version > "3.8""#,
        )
        .unwrap();
        assert_eq!(requirement.name.as_str(), "requests");
        assert_eq!(
            requirement
                .extras
                .iter()
                .map(ExtraName::as_str)
                .collect::<Vec<_>>(),
            ["security", "tests"]
        );
        let Some(VersionOrUrl::VersionSpecifier(specifiers)) = &requirement.version_or_url else {
            panic!("expected version specifiers");
        };
        assert!(specifiers.contains(&Version::from_str("2.8.5").unwrap()));
        assert!(!specifiers.contains(&Version::from_str("2.9.0").unwrap()));
        assert_eq!(
            requirement.to_string(),
            r#"requests[security,tests]>=2.8.1, ==2.8.* ; python_version > "3.8""#
        );
        assert!(requirement.evaluate_markers(&linux_311(), &[]));
    }

    #[test]
    fn bare_and_parenthesized() {
        let requirement = Requirement::from_str("flask").unwrap();
        assert_eq!(requirement.version_or_url, None);
        assert!(requirement.marker.is_true());
        assert_eq!(requirement.to_string(), "flask");

        let requirement = Requirement::from_str("werkzeug (>=2.0,<3)").unwrap();
        assert_eq!(requirement.to_string(), "werkzeug>=2.0, <3");
    }

    #[test]
    fn direct_url() {
        let requirement = Requirement::from_str(
            "flask @ https://files.example.com/flask-3.0.0-py3-none-any.whl ; sys_platform == 'linux'",
        )
        .unwrap();
        let Some(VersionOrUrl::Url(url)) = &requirement.version_or_url else {
            panic!("expected a URL");
        };
        assert_eq!(url.host_str(), Some("files.example.com"));
        assert_eq!(
            requirement.to_string(),
            r#"flask @ https://files.example.com/flask-3.0.0-py3-none-any.whl ; sys_platform == "linux""#
        );
    }

    #[test]
    fn display_round_trips() {
        for input in [
            "numpy",
            "black[d]>=23.1",
            r#"colorama>=0.4 ; sys_platform == "win32""#,
            r#"pkg @ git+https://github.com/example/pkg@v1.0 ; extra == "git""#,
        ] {
            let requirement = Requirement::from_str(input).unwrap();
            assert_eq!(requirement.to_string(), input);
            assert_eq!(Requirement::from_str(&requirement.to_string()).unwrap(), requirement);
        }
    }

    #[test]
    fn serde_as_string() {
        let requirement: Requirement =
            serde_json::from_str(r#""idna >=2.5, <4""#).unwrap();
        assert_eq!(
            serde_json::to_string(&requirement).unwrap(),
            r#""idna>=2.5, <4""#
        );
    }

    #[test]
    fn errors() {
        let err = Requirement::from_str("_flask").unwrap_err();
        assert_eq!(
            err.message(),
            "Expected package name starting with an alphanumeric character, found `_`"
        );

        let err = Requirement::from_str("flask[async").unwrap_err();
        assert_eq!(err.message(), "Expected `]`, found end of input");

        let err = Requirement::from_str("flask (>=2.0").unwrap_err();
        insta::assert_snapshot!(err, @r"
        Expected `)`, found end of input
        flask (>=2.0
                    ^
        ");

        let err = Requirement::from_str("flask >=2.0 ; os_name == 'nt' garbage").unwrap_err();
        assert_eq!(
            err.message(),
            "Unexpected character `g`, expected `and`, `or` or end of input"
        );
    }
}
