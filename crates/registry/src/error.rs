use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Which of the two namespaces a registry name lives in.
/// 登錄名稱所屬的類型：條目或資料夾。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Entry,
    Folder,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Entry => f.write_str("entry"),
            NodeKind::Folder => f.write_str("folder"),
        }
    }
}

/// Errors raised while addressing, reading or writing a registry.
/// 存取、讀取或寫入登錄樹時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry IO error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed registry XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("<{element}> element is missing the `{attribute}` attribute")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error("registry XML has no root element")]
    MissingRoot,
    #[error("registry XML ended before </{0}>")]
    UnexpectedEof(String),
    #[error("`{name}` already names a registry {existing}")]
    KindConflict { name: String, existing: NodeKind },
    #[error("invalid registry path `{0}`")]
    InvalidPath(String),
    #[error("unsupported registry file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("invalid folder pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}
