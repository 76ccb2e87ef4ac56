//! Comma-separated tag lists stored in a layer's `Tags` entry.
//! 圖層 `Tags` 條目中以逗號分隔的標籤。

use std::collections::BTreeSet;

use snapws_registry::{Registry, RegistryError};

pub const TAGS: &str = "Tags";

/// Tags of a layer folder: split on commas, trimmed, empties dropped.
/// 讀取標籤：以逗號切割、去除空白並略過空字串。
pub fn tags(folder: &Registry) -> BTreeSet<String> {
    folder
        .get_entry(TAGS)
        .and_then(|value| value.as_str())
        .map(parse_tags)
        .unwrap_or_default()
}

pub fn parse_tags(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Writes `tags` back in canonical form, sorted and joined with `", "`.
/// 以排序後的 `", "` 連接形式寫回。
pub fn put_tags(folder: &mut Registry, tags: &BTreeSet<String>) -> Result<(), RegistryError> {
    let joined = tags.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
    folder.entry(TAGS)?.set(joined);
    Ok(())
}

pub fn add_tag(folder: &mut Registry, tag: &str) -> Result<(), RegistryError> {
    let mut current = tags(folder);
    current.extend(parse_tags(tag));
    put_tags(folder, &current)
}

/// Removes `tag`; the entry is rewritten even when the tag was absent.
pub fn remove_tag(folder: &mut Registry, tag: &str) -> Result<(), RegistryError> {
    let mut current = tags(folder);
    current.remove(tag.trim());
    put_tags(folder, &current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_sorted_and_joined() {
        let mut folder = Registry::new();
        add_tag(&mut folder, "b").unwrap();
        add_tag(&mut folder, "a").unwrap();
        assert_eq!(folder.get_entry(TAGS).unwrap().as_str(), Some("a, b"));
    }

    #[test]
    fn messy_input_is_normalized() {
        let mut folder = Registry::new();
        folder.entry(TAGS).unwrap().set(" t2 ,, t1,t2 ,");
        let read = tags(&folder);
        assert_eq!(read.into_iter().collect::<Vec<_>>(), vec!["t1", "t2"]);

        remove_tag(&mut folder, "t2").unwrap();
        assert_eq!(folder.get_entry(TAGS).unwrap().as_str(), Some("t1"));
        remove_tag(&mut folder, "t1").unwrap();
        assert_eq!(folder.get_entry(TAGS).unwrap().as_str(), Some(""));
        assert!(tags(&folder).is_empty());
    }

    #[test]
    fn missing_entry_reads_as_no_tags() {
        assert!(tags(&Registry::new()).is_empty());
    }
}
