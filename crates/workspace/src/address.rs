//! Positional and role-based addressing of layer folders.
//! 依位置與角色定位圖層資料夾。
//!
//! Image layers live at `Layers.Layer[NNN]` and mesh layers at
//! `MeshLayers.Layer[NNN]`, densely numbered from zero. Counts are always
//! probed from the live tree.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use snapws_registry::Registry;
use thiserror::Error;

use crate::role::{LayerRole, RoleSelector};

pub const ROLE: &str = "Role";
pub const ABSOLUTE_PATH: &str = "AbsolutePath";
pub const MESH_TIME_POINTS: &str = "MeshTimePoints";

static LAYER_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(Layers|MeshLayers)\.Layer\[(\d+)\]$").expect("static layer key pattern")
});
static LAYER_SPEC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-zA-Z]+):?(-?\d+)?$").expect("static layer spec pattern"));
static TIME_POINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"TimePoint\[\d+\]").expect("static time point pattern"));
static POLY_DATA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"PolyData\[\d+\]").expect("static poly data pattern"));

/// Errors raised while turning user input into layer keys.
/// 將使用者輸入轉換為圖層鍵時的錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("layer specification {0} not found in workspace")]
    UnresolvedSpec(String),
    #[error("layer {0} not found in workspace")]
    LayerNotFound(LayerKey),
    #[error("`{0}` is not a layer key")]
    InvalidKey(String),
}

/// The two layer collections of a workspace.
/// 工作區中的兩種圖層集合。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Image,
    Mesh,
}

impl LayerKind {
    /// Top-level folder holding this kind of layer.
    pub fn root_folder(self) -> &'static str {
        match self {
            LayerKind::Image => "Layers",
            LayerKind::Mesh => "MeshLayers",
        }
    }
}

/// Typed handle to a layer folder. Formats as the padded tree key, e.g.
/// `Layers.Layer[002]`.
/// 圖層資料夾的型別化代號；輸出為補零的樹狀鍵。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerKey {
    pub kind: LayerKind,
    pub index: usize,
}

impl LayerKey {
    pub fn image(index: usize) -> Self {
        Self {
            kind: LayerKind::Image,
            index,
        }
    }

    pub fn mesh(index: usize) -> Self {
        Self {
            kind: LayerKind::Mesh,
            index,
        }
    }

    /// Dotted key of a child below this layer folder.
    pub fn child(&self, name: &str) -> String {
        format!("{self}.{name}")
    }
}

impl fmt::Display for LayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.Layer[{:03}]", self.kind.root_folder(), self.index)
    }
}

impl FromStr for LayerKey {
    type Err = AddressError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let captures = LAYER_KEY
            .captures(key)
            .ok_or_else(|| AddressError::InvalidKey(key.to_string()))?;
        let index = captures[2]
            .parse()
            .map_err(|_| AddressError::InvalidKey(key.to_string()))?;
        let kind = match &captures[1] {
            "Layers" => LayerKind::Image,
            _ => LayerKind::Mesh,
        };
        Ok(Self { kind, index })
    }
}

pub fn time_point_key(time_point: u32) -> String {
    format!("TimePoint[{time_point:03}]")
}

pub fn poly_data_key(index: usize) -> String {
    format!("PolyData[{index:03}]")
}

/// Number of consecutive layer folders of `kind`, stopping at the first gap.
/// 逐一探測連續的圖層資料夾數量，遇到缺口即停止。
pub fn layer_count(tree: &Registry, kind: LayerKind) -> usize {
    (0..)
        .take_while(|&index| tree.has_folder(&LayerKey { kind, index }.to_string()))
        .count()
}

/// Role stored in the image layer at `key`, if the layer has one.
pub fn layer_role(tree: &Registry, key: LayerKey) -> Option<LayerRole> {
    tree.get_entry(&key.child(ROLE))
        .and_then(|value| value.as_str())
        .map(LayerRole::parse)
}

/// Finds the image layer whose ordinal among layers matching `selector` is
/// `pos`. Non-negative positions count from the first layer (0 = first
/// match); negative positions count from the last (-1 = last match).
/// Returns `None` when there are not enough matches.
/// 依角色條件與序位尋找圖層；負數序位自尾端起算。找不到時回傳 `None`。
pub fn find_layer_by_role(tree: &Registry, selector: &RoleSelector, pos: i32) -> Option<LayerKey> {
    let count = layer_count(tree, LayerKind::Image);
    let selects = |index: &usize| {
        layer_role(tree, LayerKey::image(*index))
            .map(|role| selector.matches(&role))
            .unwrap_or(matches!(selector, RoleSelector::Any))
    };
    let found = if pos >= 0 {
        (0..count).filter(selects).nth(pos as usize)
    } else {
        (0..count)
            .rev()
            .filter(selects)
            .nth(pos.unsigned_abs() as usize - 1)
    };
    found.map(LayerKey::image)
}

/// Translates a shorthand layer specifier into a key.
/// 將圖層簡寫轉換為圖層鍵。
///
/// * `"3"`, `"003"`: the image layer with that index;
/// * `"M"`, `"S:1"`, `"o:-1"`, `"A:2"`: the `pos`-th layer of a role, where
///   `M`/`S`/`O`/`A` stand for main, segmentation, overlay and anatomical.
pub fn layer_spec_to_key(tree: &Registry, spec: &str) -> Result<LayerKey, AddressError> {
    let unresolved = || AddressError::UnresolvedSpec(spec.to_string());

    if !spec.is_empty() && spec.bytes().all(|b| b.is_ascii_digit()) {
        let index = spec.parse().map_err(|_| unresolved())?;
        let key = LayerKey::image(index);
        return if tree.has_folder(&key.to_string()) {
            Ok(key)
        } else {
            Err(AddressError::LayerNotFound(key))
        };
    }

    let captures = LAYER_SPEC.captures(spec).ok_or_else(unresolved)?;
    let selector = RoleSelector::from_letter(&captures[1]).ok_or_else(unresolved)?;
    let pos = match captures.get(2) {
        Some(pos) => pos.as_str().parse().map_err(|_| unresolved())?,
        None => 0,
    };
    find_layer_by_role(tree, &selector, pos).ok_or_else(unresolved)
}

/// A valid image layer has both an `AbsolutePath` and a `Role` entry.
/// 有效的影像圖層須同時具備 `AbsolutePath` 與 `Role`。
pub fn is_valid_layer(tree: &Registry, key: LayerKey) -> bool {
    key.kind == LayerKind::Image
        && tree
            .get_folder(&key.to_string())
            .map(|folder| folder.has_entry(ABSOLUTE_PATH) && folder.has_entry(ROLE))
            .unwrap_or(false)
}

/// A valid mesh layer has at least one time point and every time point holds
/// at least one poly-data folder.
/// 有效的網格圖層至少有一個時間點，且每個時間點至少有一個 PolyData。
pub fn is_valid_mesh_layer(tree: &Registry, key: LayerKey) -> bool {
    if key.kind != LayerKind::Mesh {
        return false;
    }
    let Some(time_points) = tree.get_folder(&key.child(MESH_TIME_POINTS)) else {
        return false;
    };
    let names = time_points.folders_matching(&TIME_POINT);
    !names.is_empty()
        && names.iter().all(|name| {
            time_points
                .get_folder(name)
                .map(|tp| !tp.folders_matching(&POLY_DATA).is_empty())
                .unwrap_or(false)
        })
}

/// Names of the time-point folders below a mesh layer folder.
pub(crate) fn time_point_names(mesh_layer: &Registry) -> Vec<&str> {
    mesh_layer
        .get_folder(MESH_TIME_POINTS)
        .map(|tps| tps.folders_matching(&TIME_POINT))
        .unwrap_or_default()
}

/// Names of the poly-data folders below a time-point folder.
pub(crate) fn poly_data_names(time_point: &Registry) -> Vec<&str> {
    time_point.folders_matching(&POLY_DATA)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_roles(roles: &[&str]) -> Registry {
        let mut tree = Registry::new();
        for (index, role) in roles.iter().enumerate() {
            let key = LayerKey::image(index);
            tree.entry(&key.child(ROLE)).unwrap().set(role);
            tree.entry(&key.child(ABSOLUTE_PATH))
                .unwrap()
                .set(format!("/img/{index}.png"));
        }
        tree
    }

    #[test]
    fn keys_format_and_parse() {
        assert_eq!(LayerKey::image(3).to_string(), "Layers.Layer[003]");
        assert_eq!(LayerKey::mesh(12).to_string(), "MeshLayers.Layer[012]");
        assert_eq!("MeshLayers.Layer[007]".parse(), Ok(LayerKey::mesh(7)));
        assert_eq!("Layers.Layer[1000]".parse(), Ok(LayerKey::image(1000)));
        assert!("Layers.Layer[x]".parse::<LayerKey>().is_err());
        assert!("Other.Layer[001]".parse::<LayerKey>().is_err());
        assert_eq!(time_point_key(1), "TimePoint[001]");
        assert_eq!(poly_data_key(0), "PolyData[000]");
    }

    #[test]
    fn count_stops_at_first_gap() {
        let mut tree = tree_with_roles(&["MainRole", "OverlayRole"]);
        tree.folder("Layers.Layer[003]").unwrap();
        assert_eq!(layer_count(&tree, LayerKind::Image), 2);
        assert_eq!(layer_count(&tree, LayerKind::Mesh), 0);
    }

    #[test]
    fn role_scan_forward_and_backward() {
        let tree = tree_with_roles(&[
            "MainRole",
            "SegmentationRole",
            "OverlayRole",
            "SegmentationRole",
        ]);
        let seg = RoleSelector::SEGMENTATION;
        assert_eq!(find_layer_by_role(&tree, &seg, 0), Some(LayerKey::image(1)));
        assert_eq!(find_layer_by_role(&tree, &seg, 1), Some(LayerKey::image(3)));
        assert_eq!(find_layer_by_role(&tree, &seg, 2), None);
        assert_eq!(find_layer_by_role(&tree, &seg, -1), Some(LayerKey::image(3)));
        assert_eq!(find_layer_by_role(&tree, &seg, -2), Some(LayerKey::image(1)));
        assert_eq!(find_layer_by_role(&tree, &seg, -3), None);

        let anatomical = RoleSelector::Anatomical;
        assert_eq!(
            find_layer_by_role(&tree, &anatomical, 1),
            Some(LayerKey::image(2))
        );
        assert_eq!(
            find_layer_by_role(&tree, &RoleSelector::Any, -1),
            Some(LayerKey::image(3))
        );
    }

    #[test]
    fn single_main_layer_found_from_both_ends() {
        let tree = tree_with_roles(&["MainRole", "OverlayRole"]);
        let first = find_layer_by_role(&tree, &RoleSelector::MAIN, 0);
        let last = find_layer_by_role(&tree, &RoleSelector::MAIN, -1);
        assert_eq!(first, Some(LayerKey::image(0)));
        assert_eq!(first, last);

        let empty = Registry::new();
        assert_eq!(find_layer_by_role(&empty, &RoleSelector::MAIN, 0), None);
        assert_eq!(find_layer_by_role(&empty, &RoleSelector::MAIN, -1), None);
    }

    #[test]
    fn specs_resolve_to_keys() {
        let tree = tree_with_roles(&[
            "MainRole",
            "SegmentationRole",
            "OverlayRole",
            "SegmentationRole",
        ]);
        assert_eq!(layer_spec_to_key(&tree, "2"), Ok(LayerKey::image(2)));
        assert_eq!(layer_spec_to_key(&tree, "000"), Ok(LayerKey::image(0)));
        assert_eq!(layer_spec_to_key(&tree, "M"), Ok(LayerKey::image(0)));
        assert_eq!(layer_spec_to_key(&tree, "S:-1"), Ok(LayerKey::image(3)));
        assert_eq!(layer_spec_to_key(&tree, "s1"), Ok(LayerKey::image(3)));
        assert_eq!(layer_spec_to_key(&tree, "O:0"), Ok(LayerKey::image(2)));
        assert_eq!(layer_spec_to_key(&tree, "A:-1"), Ok(LayerKey::image(2)));
    }

    #[test]
    fn bad_specs_are_errors() {
        let tree = tree_with_roles(&["MainRole"]);
        assert_eq!(
            layer_spec_to_key(&tree, "Q"),
            Err(AddressError::UnresolvedSpec("Q".into()))
        );
        assert_eq!(
            layer_spec_to_key(&tree, "S"),
            Err(AddressError::UnresolvedSpec("S".into()))
        );
        assert_eq!(
            layer_spec_to_key(&tree, "7"),
            Err(AddressError::LayerNotFound(LayerKey::image(7)))
        );
        assert!(layer_spec_to_key(&tree, "M:x").is_err());
        assert!(layer_spec_to_key(&tree, "").is_err());
    }

    #[test]
    fn layer_validity() {
        let mut tree = tree_with_roles(&["MainRole"]);
        tree.entry("Layers.Layer[001].Role").unwrap().set("OverlayRole");
        assert!(is_valid_layer(&tree, LayerKey::image(0)));
        assert!(!is_valid_layer(&tree, LayerKey::image(1)));
        assert!(!is_valid_layer(&tree, LayerKey::image(2)));
    }

    #[test]
    fn mesh_validity_requires_poly_data_in_every_time_point() {
        let mut tree = Registry::new();
        let mesh = LayerKey::mesh(0);
        assert!(!is_valid_mesh_layer(&tree, mesh));

        tree.folder(&mesh.child(MESH_TIME_POINTS)).unwrap();
        assert!(!is_valid_mesh_layer(&tree, mesh));

        let tp1 = format!("{}.{}", mesh.child(MESH_TIME_POINTS), time_point_key(1));
        tree.entry(&format!("{tp1}.{}.{ABSOLUTE_PATH}", poly_data_key(0)))
            .unwrap()
            .set("/mesh/a.vtk");
        assert!(is_valid_mesh_layer(&tree, mesh));

        let tp2 = format!("{}.{}", mesh.child(MESH_TIME_POINTS), time_point_key(2));
        tree.folder(&tp2).unwrap();
        assert!(!is_valid_mesh_layer(&tree, mesh));
        assert!(!is_valid_mesh_layer(&tree, LayerKey::image(0)));
    }
}
