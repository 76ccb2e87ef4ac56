use std::fmt;

use regex::Regex;

use crate::error::{NodeKind, RegistryError};
use crate::value::{Decode, Value};

const ARRAY_SIZE: &str = "ArraySize";

/// A named child of a registry folder.
/// 登錄資料夾中的具名子節點。
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Entry(Value),
    Folder(Registry),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Entry(_) => NodeKind::Entry,
            Node::Folder(_) => NodeKind::Folder,
        }
    }
}

/// Hierarchical key/value tree addressed with dotted paths.
/// 以點號路徑定址的階層式鍵值樹。
///
/// Every name at one level is bound to exactly one [`Node`], so an entry and a
/// folder can never share a name. Children keep their insertion order.
///
/// Two families of accessors exist:
/// * [`Registry::entry`] / [`Registry::folder`] create every missing segment,
///   including the terminal node;
/// * [`Registry::get_entry`], [`Registry::get_folder`], [`Registry::has_entry`]
///   and [`Registry::has_folder`] only look and never change the tree.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    children: Vec<(String, Node)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry at `path`, creating it and any missing folders.
    /// 取得 `path` 的條目；缺少的資料夾與條目都會自動建立。
    pub fn entry(&mut self, path: &str) -> Result<&mut Value, RegistryError> {
        if let Some((head, rest)) = path.split_once('.') {
            return self.folder(head)?.entry(rest);
        }
        let index = self.get_or_insert(path, || Node::Entry(Value::null()))?;
        match &mut self.children[index].1 {
            Node::Entry(value) => Ok(value),
            Node::Folder(_) => Err(RegistryError::KindConflict {
                name: path.to_string(),
                existing: NodeKind::Folder,
            }),
        }
    }

    /// Returns the folder at `path`, creating it and any missing parents.
    /// 取得 `path` 的資料夾；缺少的層級會自動建立。
    pub fn folder(&mut self, path: &str) -> Result<&mut Registry, RegistryError> {
        if let Some((head, rest)) = path.split_once('.') {
            return self.folder(head)?.folder(rest);
        }
        let index = self.get_or_insert(path, || Node::Folder(Registry::new()))?;
        match &mut self.children[index].1 {
            Node::Folder(folder) => Ok(folder),
            Node::Entry(_) => Err(RegistryError::KindConflict {
                name: path.to_string(),
                existing: NodeKind::Entry,
            }),
        }
    }

    /// Looks up an entry without creating anything.
    /// 查詢條目，不建立任何節點。
    pub fn get_entry(&self, path: &str) -> Option<&Value> {
        match path.split_once('.') {
            Some((head, rest)) => self.get_folder(head)?.get_entry(rest),
            None => match self.child(path)? {
                Node::Entry(value) => Some(value),
                Node::Folder(_) => None,
            },
        }
    }

    /// Looks up a folder without creating anything.
    /// 查詢資料夾，不建立任何節點。
    pub fn get_folder(&self, path: &str) -> Option<&Registry> {
        match path.split_once('.') {
            Some((head, rest)) => self.get_folder(head)?.get_folder(rest),
            None => match self.child(path)? {
                Node::Folder(folder) => Some(folder),
                Node::Entry(_) => None,
            },
        }
    }

    /// Mutable lookup of an existing folder; never creates.
    pub fn get_folder_mut(&mut self, path: &str) -> Option<&mut Registry> {
        match path.split_once('.') {
            Some((head, rest)) => self.get_folder_mut(head)?.get_folder_mut(rest),
            None => match self.child_mut(path)? {
                Node::Folder(folder) => Some(folder),
                Node::Entry(_) => None,
            },
        }
    }

    pub fn has_entry(&self, path: &str) -> bool {
        self.get_entry(path).is_some()
    }

    pub fn has_folder(&self, path: &str) -> bool {
        self.get_folder(path).is_some()
    }

    /// Detaches a direct child, whatever its kind.
    /// 移除直接子節點（條目或資料夾）。
    pub fn remove(&mut self, name: &str) -> Option<Node> {
        let index = self.position(name)?;
        Some(self.children.remove(index).1)
    }

    /// Drops every entry and folder of this node.
    /// 清除此層的所有條目與資料夾。
    pub fn clear(&mut self) {
        self.children.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Direct entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.children.iter().filter_map(|(name, node)| match node {
            Node::Entry(value) => Some((name.as_str(), value)),
            Node::Folder(_) => None,
        })
    }

    /// Direct folders in insertion order.
    pub fn folders(&self) -> impl Iterator<Item = (&str, &Registry)> {
        self.children.iter().filter_map(|(name, node)| match node {
            Node::Folder(folder) => Some((name.as_str(), folder)),
            Node::Entry(_) => None,
        })
    }

    pub fn entry_keys(&self) -> Vec<&str> {
        self.entries().map(|(name, _)| name).collect()
    }

    pub fn folder_keys(&self) -> Vec<&str> {
        self.folders().map(|(name, _)| name).collect()
    }

    /// Names of direct child folders matched by `pattern` (searched, not
    /// anchored).
    /// 以正規表示式搜尋直接子資料夾名稱。
    pub fn find_folders_from_pattern(&self, pattern: &str) -> Result<Vec<&str>, RegistryError> {
        let regex = Regex::new(pattern)?;
        Ok(self.folders_matching(&regex))
    }

    pub fn folders_matching(&self, regex: &Regex) -> Vec<&str> {
        self.folders()
            .map(|(name, _)| name)
            .filter(|name| regex.is_match(name))
            .collect()
    }

    /// Merges `other` into this tree: folders are unioned recursively, entries
    /// are replaced by `other`'s. When the two trees disagree on the kind of a
    /// name, `other` wins.
    /// 合併另一棵樹：資料夾遞迴聯集，條目以 `other` 覆寫。
    pub fn update(&mut self, other: &Registry) {
        for (name, theirs) in other.folders() {
            match self.child_mut(name) {
                Some(Node::Folder(mine)) => mine.update(theirs),
                Some(node) => *node = Node::Folder(theirs.clone()),
                None => self
                    .children
                    .push((name.to_string(), Node::Folder(theirs.clone()))),
            }
        }
        for (name, theirs) in other.entries() {
            match self.child_mut(name) {
                Some(node) => *node = Node::Entry(theirs.clone()),
                None => self
                    .children
                    .push((name.to_string(), Node::Entry(theirs.clone()))),
            }
        }
    }

    /// Every dotted key below this node, depth first, folders before entries.
    /// A non-empty `prefix` is joined to the keys with a dot.
    /// 深度優先列出所有完整鍵名（資料夾先於條目）。
    pub fn collect_keys(&self, prefix: &str) -> Vec<String> {
        let prefix = match prefix {
            "" => String::new(),
            p if p.ends_with('.') => p.to_string(),
            p => format!("{p}."),
        };
        let mut keys = Vec::new();
        self.collect_into(&prefix, &mut keys);
        keys
    }

    fn collect_into(&self, prefix: &str, keys: &mut Vec<String>) {
        for (name, folder) in self.folders() {
            folder.collect_into(&format!("{prefix}{name}."), keys);
        }
        for (name, _) in self.entries() {
            keys.push(format!("{prefix}{name}"));
        }
    }

    /// Stores `items` as `ArraySize` plus `Element[i]` entries.
    /// 以 `ArraySize` 與 `Element[i]` 條目儲存陣列。
    pub fn put_array<T: fmt::Display>(&mut self, items: &[T]) -> Result<(), RegistryError> {
        self.entry(ARRAY_SIZE)?.set(items.len());
        for (index, item) in items.iter().enumerate() {
            self.entry(&array_element_key(index))?.set(item);
        }
        Ok(())
    }

    /// Reads an array written by [`Registry::put_array`]. Missing or
    /// unparsable elements read as `default_element`. The length never
    /// exceeds one past the highest `Element[i]` present.
    /// 讀回陣列；缺少或無法解析的元素以預設值代替，長度不超過實際存在的最大索引加一。
    pub fn get_array<T: Decode + Clone>(&self, default_element: T) -> Vec<T> {
        let bound = self
            .children
            .iter()
            .filter_map(|(name, _)| name.strip_prefix("Element[")?.strip_suffix(']'))
            .filter_map(|index| index.parse::<usize>().ok())
            .max()
            .map_or(0, |last| last + 1);
        let size = self
            .get_entry(ARRAY_SIZE)
            .map(|value| value.get(0usize))
            .unwrap_or(0)
            .min(bound);
        (0..size)
            .map(|index| match self.get_entry(&array_element_key(index)) {
                Some(value) => value.get(default_element.clone()),
                None => default_element.clone(),
            })
            .collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.children.iter().position(|(key, _)| key == name)
    }

    fn child(&self, name: &str) -> Option<&Node> {
        self.children
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, node)| node)
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children
            .iter_mut()
            .find(|(key, _)| key == name)
            .map(|(_, node)| node)
    }

    fn get_or_insert(
        &mut self,
        name: &str,
        make: impl FnOnce() -> Node,
    ) -> Result<usize, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::InvalidPath(name.to_string()));
        }
        if let Some(index) = self.position(name) {
            return Ok(index);
        }
        self.children.push((name.to_string(), make()));
        Ok(self.children.len() - 1)
    }

    pub(crate) fn push_entry(&mut self, name: String, value: Value) {
        match self.child_mut(&name) {
            Some(node) => *node = Node::Entry(value),
            None => self.children.push((name, Node::Entry(value))),
        }
    }

    pub(crate) fn push_folder(&mut self, name: String, folder: Registry) {
        match self.child_mut(&name) {
            Some(node) => *node = Node::Folder(folder),
            None => self.children.push((name, Node::Folder(folder))),
        }
    }

    fn write_dump(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        let mut folders: Vec<_> = self.folders().collect();
        folders.sort_by(|a, b| a.0.cmp(b.0));
        for (name, folder) in folders {
            writeln!(f, "{indent}{name}:")?;
            folder.write_dump(f, depth + 1)?;
        }
        let mut entries: Vec<_> = self
            .entries()
            .filter_map(|(name, value)| value.as_str().map(|raw| (name, raw)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (name, raw) in entries {
            writeln!(f, "{indent}{name} = {raw}")?;
        }
        Ok(())
    }
}

/// Key of the `index`-th element written by [`Registry::put_array`].
pub fn array_element_key(index: usize) -> String {
    format!("Element[{index}]")
}

impl PartialEq for Registry {
    fn eq(&self, other: &Self) -> bool {
        self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .all(|(name, node)| other.child(name) == Some(node))
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_dump(f, 0)
    }
}
