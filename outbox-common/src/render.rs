//! Template rendering abstraction.
//!
//! The engine never renders templates itself; it asks a [`Renderer`] for a
//! finished string at compose time and persists the result, so delivery can
//! replay a record without the template (or its variables) still existing.
//!
//! [`StaticRenderer`] is the in-repo implementation: registered template
//! strings with plain `{{ name }}` substitution. It covers tests and small
//! deployments; anything richer belongs to the embedding application.

use std::collections::HashMap;

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors produced while rendering a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The requested template is not registered.
    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    /// The template engine failed.
    #[error("render failed: {0}")]
    Failed(String),
}

/// Renders a template identifier plus variables into a finished body.
pub trait Renderer: Send + Sync + std::fmt::Debug {
    /// Render `view` with `variables`.
    ///
    /// # Errors
    /// Returns [`RenderError`] if the view is unknown or rendering fails.
    fn render(&self, view: &str, variables: &Map<String, Value>) -> Result<String, RenderError>;

    /// Whether `view` exists.
    fn exists(&self, view: &str) -> bool;
}

/// A fixed set of registered template strings.
#[derive(Debug, Clone, Default)]
pub struct StaticRenderer {
    templates: HashMap<String, String>,
}

impl StaticRenderer {
    /// An empty renderer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template under `view`.
    #[must_use]
    pub fn with_template(mut self, view: impl Into<String>, template: impl Into<String>) -> Self {
        self.templates.insert(view.into(), template.into());
        self
    }
}

impl Renderer for StaticRenderer {
    fn render(&self, view: &str, variables: &Map<String, Value>) -> Result<String, RenderError> {
        let template = self
            .templates
            .get(view)
            .ok_or_else(|| RenderError::UnknownTemplate(view.to_string()))?;

        let mut rendered = template.clone();
        for (key, value) in variables {
            let replacement = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            rendered = rendered.replace(&format!("{{{{ {key} }}}}"), &replacement);
            rendered = rendered.replace(&format!("{{{{{key}}}}}"), &replacement);
        }

        Ok(rendered)
    }

    fn exists(&self, view: &str) -> bool {
        self.templates.contains_key(view)
    }
}
