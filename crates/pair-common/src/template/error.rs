//! Template error types

use std::fmt;

/// Errors that can occur during template operations
#[derive(Debug)]
pub enum TemplateError {
    /// Template rendering failed (syntax, undefined variable, filter)
    Render(minijinja::Error),
    /// The delimiter configuration was rejected
    Syntax(String),
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Render(e) => write!(f, "template render error: {}", e),
            Self::Syntax(msg) => write!(f, "template syntax error: {}", msg),
        }
    }
}

impl std::error::Error for TemplateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Render(e) => Some(e),
            _ => None,
        }
    }
}

impl From<minijinja::Error> for TemplateError {
    fn from(err: minijinja::Error) -> Self {
        Self::Render(err)
    }
}

impl From<TemplateError> for crate::Error {
    fn from(err: TemplateError) -> Self {
        crate::Error::templating(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_display() {
        let err = TemplateError::Syntax("unclosed brace".to_string());
        assert!(err.to_string().contains("syntax error"));
    }

    #[test]
    fn converts_into_templating_error() {
        let err: crate::Error = TemplateError::Syntax("not a map".to_string()).into();
        assert!(matches!(err, crate::Error::Templating { .. }));
        assert!(err.to_string().contains("not a map"));
    }
}
