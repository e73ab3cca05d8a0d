//! Template expansion
//!
//! Declaration files go through a Tera pass before KDL parsing, so literal
//! attribute values can interpolate project variables: `cidr "{{ base }}.0.0/16"`.

use crate::error::{ManifestError, Result};
use kdl::KdlDocument;
use std::collections::HashMap;
use std::path::Path;
use tera::{Context, Tera};
use tracing::{debug, info};

/// Variable context collected from declaration files.
pub type Variables = HashMap<String, serde_json::Value>;

/// Template processor over one project load.
pub struct TemplateProcessor {
    tera: Tera,
    context: Context,
}

impl TemplateProcessor {
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
            context: Context::new(),
        }
    }

    pub fn add_variable(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), &value);
    }

    pub fn add_variables(&mut self, variables: Variables) {
        for (key, value) in variables {
            self.context.insert(key, &value);
        }
    }

    /// Add environment variables with the KUMO_ prefix.
    ///
    /// Only prefixed variables are exposed so arbitrary environment content
    /// cannot leak into declarations.
    #[tracing::instrument(skip(self))]
    pub fn add_env_variables(&mut self) {
        const ALLOWED_PREFIX: &str = "KUMO_";
        let mut count = 0;

        for (key, value) in std::env::vars() {
            if key.starts_with(ALLOWED_PREFIX) {
                debug!(key = %key, "Adding environment variable");
                self.context.insert(key, &serde_json::Value::String(value));
                count += 1;
            }
        }

        info!(env_var_count = count, "Added filtered environment variables");
    }

    /// Load KEY=VALUE pairs from a .env file. No prefix filter: the file was
    /// placed explicitly.
    #[tracing::instrument(skip(self))]
    pub fn add_env_file_variables(&mut self, env_file_path: &Path) -> Result<()> {
        let content =
            std::fs::read_to_string(env_file_path).map_err(|e| ManifestError::IoError {
                path: env_file_path.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut count = 0;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = strip_quotes(value.trim());
                self.context
                    .insert(key, &serde_json::Value::String(value.to_string()));
                count += 1;
            }
        }

        info!(
            env_file = %env_file_path.display(),
            variable_count = count,
            "Loaded variables from .env file"
        );
        Ok(())
    }

    /// Expand a string template.
    pub fn render_str(&mut self, template: &str) -> Result<String> {
        self.tera
            .render_str(template, &self.context)
            .map_err(|e| ManifestError::TemplateRender(tera_error_detail(&e)))
    }

    /// Read a file and expand it.
    pub fn render_file(&mut self, path: &Path) -> Result<String> {
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::IoError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.render_str(&content)
    }
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Collect `variables { ... }` blocks out of raw declaration content.
///
/// Runs before template expansion, which is why values must be plain
/// strings rather than templates themselves.
pub fn extract_variables(content: &str) -> Result<Variables> {
    let doc: KdlDocument = content.parse()?;
    let mut variables = Variables::new();

    for node in doc.nodes() {
        if node.name().value() != "variables" {
            continue;
        }
        if let Some(children) = node.children() {
            for var in children.nodes() {
                let key = var.name().value().to_string();
                if let Some(value) = var.entries().first().and_then(|e| e.value().as_string()) {
                    variables.insert(key, serde_json::Value::String(value.to_string()));
                }
            }
        }
    }

    Ok(variables)
}

fn strip_quotes(value: &str) -> &str {
    let len = value.len();
    if len >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        &value[1..len - 1]
    } else {
        value
    }
}

/// Pull the chained causes out of a Tera error so the user sees more than
/// "Failed to render __tera_one_off".
fn tera_error_detail(error: &tera::Error) -> String {
    let mut detail = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        detail.push_str(&format!("\n  caused by: {}", cause));
        source = std::error::Error::source(cause);
    }
    detail
}
