use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Semantic role stored in a layer's `Role` entry.
/// 影像圖層的語意角色。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum LayerRole {
    Main,
    Segmentation,
    Overlay,
    /// Any role name this crate does not interpret.
    Other(String),
}

impl LayerRole {
    pub fn as_str(&self) -> &str {
        match self {
            LayerRole::Main => "MainRole",
            LayerRole::Segmentation => "SegmentationRole",
            LayerRole::Overlay => "OverlayRole",
            LayerRole::Other(name) => name,
        }
    }

    /// Reads a stored role name; unknown names are kept verbatim.
    pub fn parse(name: &str) -> Self {
        match name {
            "MainRole" => LayerRole::Main,
            "SegmentationRole" => LayerRole::Segmentation,
            "OverlayRole" => LayerRole::Overlay,
            other => LayerRole::Other(other.to_string()),
        }
    }
}

impl fmt::Display for LayerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LayerRole> for String {
    fn from(role: LayerRole) -> Self {
        role.as_str().to_string()
    }
}

/// Role query used when searching or adding layers. Besides concrete roles it
/// has two aliases: `AnatomicalRole` (main or overlay) and `AnyRole`.
/// 搜尋或新增圖層時使用的角色條件，含 `AnatomicalRole` 與 `AnyRole` 兩種別名。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoleSelector {
    Role(LayerRole),
    Anatomical,
    Any,
}

impl RoleSelector {
    pub const MAIN: RoleSelector = RoleSelector::Role(LayerRole::Main);
    pub const SEGMENTATION: RoleSelector = RoleSelector::Role(LayerRole::Segmentation);
    pub const OVERLAY: RoleSelector = RoleSelector::Role(LayerRole::Overlay);

    /// Whether a layer holding `role` satisfies this selector.
    /// 判斷圖層角色是否符合此條件。
    pub fn matches(&self, role: &LayerRole) -> bool {
        match self {
            RoleSelector::Role(wanted) => wanted == role,
            RoleSelector::Anatomical => matches!(role, LayerRole::Main | LayerRole::Overlay),
            RoleSelector::Any => true,
        }
    }

    /// Shorthand letters used by layer specifiers (`M`, `S`, `O`, `A`), case
    /// insensitive.
    /// 圖層簡寫字母對應的角色。
    pub fn from_letter(letters: &str) -> Option<Self> {
        match letters.to_ascii_uppercase().as_str() {
            "M" => Some(RoleSelector::MAIN),
            "S" => Some(RoleSelector::SEGMENTATION),
            "O" => Some(RoleSelector::OVERLAY),
            "A" => Some(RoleSelector::Anatomical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RoleSelector::Role(role) => role.as_str(),
            RoleSelector::Anatomical => "AnatomicalRole",
            RoleSelector::Any => "AnyRole",
        }
    }
}

impl From<LayerRole> for RoleSelector {
    fn from(role: LayerRole) -> Self {
        RoleSelector::Role(role)
    }
}

impl FromStr for RoleSelector {
    type Err = Infallible;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Ok(match name {
            "AnatomicalRole" => RoleSelector::Anatomical,
            "AnyRole" => RoleSelector::Any,
            other => RoleSelector::Role(LayerRole::parse(other)),
        })
    }
}

impl fmt::Display for RoleSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete role for an anatomical image: the first one becomes the main
/// layer, later ones are overlays.
/// 解析 `AnatomicalRole`：尚無主影像時為主影像，否則為疊加層。
pub fn resolve_anatomical(main_exists: bool) -> LayerRole {
    if main_exists {
        LayerRole::Overlay
    } else {
        LayerRole::Main
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_names_round_trip() {
        for name in ["MainRole", "SegmentationRole", "OverlayRole", "LabelRole"] {
            assert_eq!(LayerRole::parse(name).as_str(), name);
        }
        assert_eq!(
            LayerRole::parse("LabelRole"),
            LayerRole::Other("LabelRole".into())
        );
    }

    #[test]
    fn anatomical_matches_main_and_overlay_only() {
        let anatomical = RoleSelector::Anatomical;
        assert!(anatomical.matches(&LayerRole::Main));
        assert!(anatomical.matches(&LayerRole::Overlay));
        assert!(!anatomical.matches(&LayerRole::Segmentation));
        assert!(RoleSelector::Any.matches(&LayerRole::Other("X".into())));
        assert!(!RoleSelector::MAIN.matches(&LayerRole::Overlay));
    }

    #[test]
    fn letters_and_names_parse() {
        assert_eq!(RoleSelector::from_letter("s"), Some(RoleSelector::SEGMENTATION));
        assert_eq!(RoleSelector::from_letter("A"), Some(RoleSelector::Anatomical));
        assert_eq!(RoleSelector::from_letter("Q"), None);
        assert_eq!(RoleSelector::from_letter("MM"), None);
        assert_eq!("AnyRole".parse(), Ok(RoleSelector::Any));
        assert_eq!("OverlayRole".parse(), Ok(RoleSelector::OVERLAY));
    }

    #[test]
    fn anatomical_resolution_depends_on_main() {
        assert_eq!(resolve_anatomical(false), LayerRole::Main);
        assert_eq!(resolve_anatomical(true), LayerRole::Overlay);
    }
}
