//! Hierarchical registry tree with typed values and its XML encoding.
//! 具型別數值的階層式登錄樹與其 XML 編碼。

mod error;
mod tree;
mod util;
mod value;
mod xml;

pub use error::{NodeKind, RegistryError};
pub use tree::{array_element_key, Node, Registry};
pub use util::write_atomic;
pub use value::{Decode, Value};
pub use xml::XML_EXTENSIONS;
