pub use extra_name::ExtraName;
pub use package_name::PackageName;

mod extra_name;
mod package_name;

/// Lowercase the name and collapse runs of `-`, `_` and `.` into a single `-`.
///
/// See: <https://packaging.python.org/en/latest/specifications/name-normalization/>
pub(crate) fn normalize(name: &str) -> Result<String, InvalidNameError> {
    let mut normalized = String::with_capacity(name.len());
    let mut previous = None;

    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z' => normalized.push(byte.to_ascii_lowercase() as char),
            b'a'..=b'z' | b'0'..=b'9' => normalized.push(byte as char),
            b'-' | b'_' | b'.' => match previous {
                None => return Err(InvalidNameError(name.to_string())),
                Some(b'-' | b'_' | b'.') => {}
                Some(_) => normalized.push('-'),
            },
            _ => return Err(InvalidNameError(name.to_string())),
        }
        previous = Some(byte);
    }

    match previous {
        None | Some(b'-' | b'_' | b'.') => Err(InvalidNameError(name.to_string())),
        Some(_) => Ok(normalized),
    }
}

/// An invalid [`PackageName`] or [`ExtraName`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Not a valid package or extra name: \"{0}\". Names must start and end with a letter or \
    digit and may only contain -, _, ., and alphanumeric characters."
)]
pub struct InvalidNameError(String);

impl InvalidNameError {
    /// Returns the rejected name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
