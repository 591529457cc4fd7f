//! Substitution pass for cloud-init command text
//!
//! Cloud-init commands already contain `{{ .controlPlaneEndpoint }}` and
//! `{{ .apiKey }}` placeholders that the Cluster API controllers fill in
//! on the node. Our own substitutions therefore use a different syntax so
//! the two never collide:
//!
//! - `${...}` variables
//! - `{%...%}` blocks (`{% for %}`, `{% if %}`)
//! - `{#...#}` comments
//! - `$${` renders a literal `${`
//!
//! Filters: `shell_quote` on top of the minijinja builtins (`join`,
//! `lower`, ...).

mod engine;
mod error;
mod filters;

pub use engine::TemplateEngine;
pub use error::TemplateError;
