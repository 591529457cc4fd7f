//! Custom filters for command templating

/// Quote a value for POSIX shells
///
/// Usage: `${setup.fullname | shell_quote}` renders `'Alice A'`; embedded
/// single quotes become `'\''`.
pub fn shell_quote(value: String) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
