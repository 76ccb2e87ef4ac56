//! XML encoding of a [`Registry`].
//! 登錄樹的 XML 編碼與解碼。
//!
//! The document is a root element (conventionally `<registry>`) holding nested
//! `<folder key="…">` and `<entry key="…" value="…" />` elements. Anything else
//! is skipped together with its content.

use std::fs;
use std::path::Path;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::error::RegistryError;
use crate::tree::Registry;
use crate::util::write_atomic;
use crate::value::Value;

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n";

const DOCTYPE: &str = "<!DOCTYPE registry [\n\
<!ELEMENT registry (entry*,folder*)>\n\
<!ELEMENT folder (entry*,folder*)>\n\
<!ELEMENT entry EMPTY>\n\
<!ATTLIST folder key CDATA #REQUIRED>\n\
<!ATTLIST entry key CDATA #REQUIRED>\n\
<!ATTLIST entry value CDATA #REQUIRED>\n\
]>\n";

/// File extensions understood by [`Registry::read_from_file`].
pub const XML_EXTENSIONS: &[&str] = &["xml", "itksnap"];

impl Registry {
    /// Parses a registry document.
    /// 解析登錄 XML 文件。
    pub fn from_xml_str(xml: &str) -> Result<Self, RegistryError> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        // Open folders, innermost last. Slot 0 is the document root.
        let mut stack: Vec<(String, Registry)> = Vec::new();
        let mut root_name: Option<String> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    if root_name.is_none() {
                        root_name = Some(element_name(&start));
                        stack.push((String::new(), Registry::new()));
                        continue;
                    }
                    match start.name().as_ref() {
                        b"folder" => {
                            let key = required_attribute(&start, "folder", "key")?;
                            stack.push((key, Registry::new()));
                        }
                        b"entry" => {
                            let (key, value) = read_entry(&start)?;
                            current(&mut stack)?.push_entry(key, value);
                            reader.read_to_end(start.name())?;
                        }
                        _ => {
                            reader.read_to_end(start.name())?;
                        }
                    }
                }
                Event::Empty(start) => {
                    if root_name.is_none() {
                        return Ok(Registry::new());
                    }
                    match start.name().as_ref() {
                        b"folder" => {
                            let key = required_attribute(&start, "folder", "key")?;
                            current(&mut stack)?.push_folder(key, Registry::new());
                        }
                        b"entry" => {
                            let (key, value) = read_entry(&start)?;
                            current(&mut stack)?.push_entry(key, value);
                        }
                        _ => {}
                    }
                }
                Event::End(_) => {
                    if let Some((key, folder)) = stack.pop() {
                        match stack.last_mut() {
                            Some((_, parent)) => parent.push_folder(key, folder),
                            None => return Ok(folder),
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        match root_name {
            None => Err(RegistryError::MissingRoot),
            Some(root) => {
                let open = stack
                    .last()
                    .filter(|(key, _)| !key.is_empty())
                    .map(|(key, _)| key.clone())
                    .unwrap_or(root);
                Err(RegistryError::UnexpectedEof(open))
            }
        }
    }

    /// Reads a registry XML file.
    /// 讀取登錄 XML 檔案。
    pub fn read_xml_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "reading registry");
        let contents = fs::read_to_string(path)?;
        Self::from_xml_str(&contents)
    }

    /// Reads a registry, choosing the encoding from the file extension. Only
    /// the XML encoding is supported.
    /// 依副檔名選擇格式讀取；目前僅支援 XML。
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        if has_xml_extension(path) {
            Self::read_xml_file(path)
        } else {
            Err(RegistryError::UnsupportedFormat(path.to_path_buf()))
        }
    }

    /// Serializes the tree. Null entries are left out; folders are always
    /// written, even when empty.
    /// 序列化為 XML；null 條目會略過，空資料夾仍會輸出。
    pub fn to_xml_string(&self) -> String {
        self.to_xml_string_with_header(None)
    }

    /// Same as [`Registry::to_xml_string`] with a comment line after the
    /// declaration.
    pub fn to_xml_string_with_header(&self, header: Option<&str>) -> String {
        let mut out = String::from(XML_DECLARATION);
        if let Some(header) = header {
            out.push_str(&format!("<!-- {} -->\n", header.replace("--", "- -")));
        }
        out.push_str(DOCTYPE);
        out.push_str("<registry>\n");
        self.write_xml(&mut out, 1);
        out.push_str("</registry>\n");
        out
    }

    /// Writes the XML encoding to `path`.
    /// 將 XML 寫入 `path`。
    pub fn write_xml_file(
        &self,
        path: impl AsRef<Path>,
        header: Option<&str>,
    ) -> Result<(), RegistryError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "writing registry");
        write_atomic(path, self.to_xml_string_with_header(header).as_bytes())?;
        Ok(())
    }

    fn write_xml(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        for (name, value) in self.entries() {
            if let Some(raw) = value.as_str() {
                out.push_str(&format!(
                    "{indent}<entry key=\"{}\" value=\"{}\" />\n",
                    escape(name),
                    escape(raw)
                ));
            }
        }
        for (name, folder) in self.folders() {
            out.push_str(&format!("{indent}<folder key=\"{}\">\n", escape(name)));
            folder.write_xml(out, depth + 1);
            out.push_str(&format!("{indent}</folder>\n"));
        }
    }
}

fn has_xml_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            XML_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

fn current(stack: &mut [(String, Registry)]) -> Result<&mut Registry, RegistryError> {
    stack
        .last_mut()
        .map(|(_, folder)| folder)
        .ok_or(RegistryError::MissingRoot)
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn read_entry(start: &BytesStart<'_>) -> Result<(String, Value), RegistryError> {
    let key = required_attribute(start, "entry", "key")?;
    let value = attribute(start, b"value")?.unwrap_or_default();
    Ok((key, Value::from_raw(value)))
}

fn required_attribute(
    start: &BytesStart<'_>,
    element: &'static str,
    name: &'static str,
) -> Result<String, RegistryError> {
    attribute(start, name.as_bytes())?.ok_or(RegistryError::MissingAttribute {
        element,
        attribute: name,
    })
}

fn attribute(start: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, RegistryError> {
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
