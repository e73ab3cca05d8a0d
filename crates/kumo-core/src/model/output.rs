//! Output declarations

use super::resource::AttrValue;
use serde::{Deserialize, Serialize};

/// A named output exposing a resource attribute (or a literal) after
/// reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDecl {
    pub name: String,
    pub value: AttrValue,
}

impl OutputDecl {
    pub fn new(name: impl Into<String>, value: AttrValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}
