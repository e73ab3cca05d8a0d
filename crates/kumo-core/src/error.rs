use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("file read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error: {path}\nreason: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("invalid declaration: {0}")]
    InvalidDeclaration(String),

    #[error("duplicate resource: {0}")]
    DuplicateResource(String),

    #[error("duplicate output: {0}")]
    DuplicateOutput(String),

    #[error("invalid reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },

    #[error("resource '{from}' references undeclared resource '{to}'")]
    UnknownReference { from: String, to: String },

    #[error("output '{output}' references undeclared resource '{to}'")]
    UnknownOutputReference { output: String, to: String },

    #[error("resource '{resource}' uses undeclared provider '{provider}'")]
    UnknownProvider { resource: String, provider: String },

    #[error("dependency cycle detected between: {}", members.join(", "))]
    DependencyCycle { members: Vec<String> },

    #[error("template error: {0}")]
    TemplateRender(String),

    #[error(
        "project root not found\nsearched from: {0}\nhint: run inside a directory containing kumo.kdl"
    )]
    ProjectRootNotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, ManifestError>;
