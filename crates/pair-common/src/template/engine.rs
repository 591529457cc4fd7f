//! Template engine with `${...}` delimiters
//!
//! minijinja with a custom syntax configuration so that Go-style
//! `{{ ... }}` text passes through as literal output.

use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, UndefinedBehavior, Value};
use serde::Serialize;

use super::error::TemplateError;
use super::filters;

/// Placeholder for escaped `$${` during preprocessing
const ESCAPED_PLACEHOLDER: &str = "\x00__PAIR_ESCAPED_DOLLAR_BRACE__\x00";

/// Renders command templates against a serializable context
///
/// Undefined variables are an error rather than an empty string, so a
/// typo in a command template fails the expansion instead of producing a
/// half-configured node.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create a new engine with `${...}` / `{%...%}` / `{#...#}` delimiters
    pub fn new() -> Result<Self, TemplateError> {
        let syntax = SyntaxConfig::builder()
            .variable_delimiters("${", "}")
            .block_delimiters("{%", "%}")
            .comment_delimiters("{#", "#}")
            .build()
            .map_err(|e| TemplateError::Syntax(e.to_string()))?;

        let mut env = Environment::new();
        env.set_syntax(syntax);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.add_filter("shell_quote", filters::shell_quote);

        Ok(Self { env })
    }

    /// Render a template string with the given context
    ///
    /// `$${foo}` renders as `${foo}`.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError` if the syntax is invalid, a referenced
    /// variable is undefined, or a filter fails.
    pub fn render<C: Serialize>(&self, template: &str, ctx: &C) -> Result<String, TemplateError> {
        let preprocessed = template.replace("$${", ESCAPED_PLACEHOLDER);

        let rendered = self
            .env
            .render_str(&preprocessed, Value::from_serialize(ctx))
            .map_err(TemplateError::from)?;

        Ok(rendered.replace(ESCAPED_PLACEHOLDER, "${"))
    }
}
