use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use snapws_registry::{array_element_key, Registry, RegistryError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::address::{
    self, layer_role, poly_data_key, poly_data_names, time_point_key, time_point_names,
    AddressError, LayerKey, LayerKind, ABSOLUTE_PATH, MESH_TIME_POINTS, ROLE,
};
use crate::codec::{Blake3Hasher, CodecError, ContentHasher, ImageCodec, RasterCodec};
use crate::paths;
use crate::role::{resolve_anatomical, LayerRole, RoleSelector};
use crate::tags;

pub const SAVE_LOCATION: &str = "SaveLocation";
pub const WORKSPACE_EXTENSION: &str = "itksnap";
pub const WORKSPACE_HEADER: &str = "ITK-SNAP (itksnap.org) Project File";

const MAIN_DIMENSIONS: &str = "ProjectMetaData.Files.Grey.Dimensions";
const IO_HINTS: &str = "IOHints";
const IMAGE_NICKNAME: &str = "LayerMetaData.CustomNickName";
const MESH_NICKNAME: &str = "Nickname";
const LABEL_TABLE: &str = "IRIS.LabelTable";

/// Errors raised by workspace operations.
/// 工作區操作的錯誤。
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("workspace IO error: {0}")]
    Io(#[from] io::Error),
    #[error("a workspace cannot have more than one image in the MainRole role")]
    DuplicateMain,
    #[error("cannot add image in {0} role to a workspace without main image")]
    MissingMainLayer(LayerRole),
    #[error("{0} cannot be assigned to a layer")]
    InvalidRole(RoleSelector),
    #[error("time point must be >= 1, got {0}")]
    InvalidTimePoint(u32),
    #[error("main layer not found in workspace")]
    NoMainLayer,
    #[error("layer {key} has no {entry} entry")]
    MissingEntry { key: LayerKey, entry: &'static str },
    #[error("workspace has not been loaded from or saved to a file")]
    NoFileLocation,
}

/// One row of [`Workspace::layers`].
/// 圖層摘要。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSummary {
    pub key: String,
    pub kind: LayerKind,
    pub index: usize,
    pub role: Option<LayerRole>,
    pub nickname: Option<String>,
    pub tags: Vec<String>,
    pub path: Option<PathBuf>,
}

/// Files produced by [`Workspace::export`].
/// 匯出產生的檔案清單。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportReport {
    pub workspace: PathBuf,
    pub layers: Vec<PathBuf>,
}

impl ExportReport {
    /// Workspace file first, then every layer image.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.workspace.as_path()).chain(self.layers.iter().map(PathBuf::as_path))
    }
}

/// Name under which a workspace is submitted for a processing ticket, e.g.
/// `ticket_00000123_results.itksnap`.
pub fn ticket_workspace_name(ticket: u64, suffix: &str) -> String {
    format!("ticket_{ticket:08}{suffix}.{WORKSPACE_EXTENSION}")
}

/// An imaging workspace: the registry tree plus where it lives on disk.
/// 影像工作區：登錄樹以及其在磁碟上的位置。
///
/// `directory` is where the file was last loaded from or saved to;
/// `saved_directory` is the `SaveLocation` recorded inside the tree. When the
/// two differ the workspace has been moved and recorded layer paths are
/// reinterpreted relative to the new directory.
pub struct Workspace {
    registry: Registry,
    file_path: Option<PathBuf>,
    directory: Option<PathBuf>,
    saved_directory: Option<PathBuf>,
    codec: Box<dyn ImageCodec>,
    hasher: Box<dyn ContentHasher>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    /// Empty workspace using the raster codec and the BLAKE3 hasher.
    /// 建立空白工作區。
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            file_path: None,
            directory: None,
            saved_directory: None,
            codec: Box::new(RasterCodec),
            hasher: Box::new(Blake3Hasher),
        }
    }

    pub fn with_codec(mut self, codec: impl ImageCodec + 'static) -> Self {
        self.codec = Box::new(codec);
        self
    }

    pub fn with_hasher(mut self, hasher: impl ContentHasher + 'static) -> Self {
        self.hasher = Box::new(hasher);
        self
    }

    /// Loads a workspace file.
    /// 從檔案載入工作區。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let mut workspace = Self::new();
        workspace.reload(path)?;
        Ok(workspace)
    }

    /// Replaces the tree with the contents of `path`, keeping the collaborators.
    pub fn reload(&mut self, path: impl AsRef<Path>) -> Result<(), WorkspaceError> {
        let file_path = paths::absolute(path.as_ref())?;
        self.registry = Registry::read_from_file(&file_path)?;
        self.saved_directory = self
            .registry
            .get_entry(SAVE_LOCATION)
            .and_then(|value| value.as_str())
            .filter(|raw| !raw.is_empty())
            .map(|raw| paths::normalize(Path::new(raw)));
        self.directory = file_path.parent().map(Path::to_path_buf);
        info!(
            path = %file_path.display(),
            layers = self.layer_count(),
            moved = self.is_moved(),
            "loaded workspace"
        );
        self.file_path = Some(file_path);
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Directory the workspace was last loaded from or saved to.
    /// 工作區最近載入或儲存的目錄。
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn saved_directory(&self) -> Option<&Path> {
        self.saved_directory.as_deref()
    }

    /// Whether the file now lives somewhere other than its recorded
    /// `SaveLocation`.
    /// 工作區檔案是否已搬離記錄的 `SaveLocation`。
    pub fn is_moved(&self) -> bool {
        match (&self.directory, &self.saved_directory) {
            (Some(current), Some(saved)) => current != saved,
            _ => false,
        }
    }

    pub fn layer_count(&self) -> usize {
        address::layer_count(&self.registry, LayerKind::Image)
    }

    pub fn mesh_layer_count(&self) -> usize {
        address::layer_count(&self.registry, LayerKind::Mesh)
    }

    pub fn find_layer_by_role(&self, selector: &RoleSelector, pos: i32) -> Option<LayerKey> {
        address::find_layer_by_role(&self.registry, selector, pos)
    }

    pub fn layer_spec_to_key(&self, spec: &str) -> Result<LayerKey, WorkspaceError> {
        Ok(address::layer_spec_to_key(&self.registry, spec)?)
    }

    pub fn has_main_layer(&self) -> bool {
        self.find_layer_by_role(&RoleSelector::MAIN, 0).is_some()
    }

    pub fn main_layer_key(&self) -> Result<LayerKey, WorkspaceError> {
        self.find_layer_by_role(&RoleSelector::MAIN, 0)
            .ok_or(WorkspaceError::NoMainLayer)
    }

    pub fn is_valid_layer(&self, key: LayerKey) -> bool {
        address::is_valid_layer(&self.registry, key)
    }

    pub fn is_valid_mesh_layer(&self, key: LayerKey) -> bool {
        address::is_valid_mesh_layer(&self.registry, key)
    }

    /// Folder of an existing layer of either kind.
    /// 取得既有圖層的資料夾。
    pub fn layer_folder(&self, key: LayerKey) -> Result<&Registry, WorkspaceError> {
        self.registry
            .get_folder(&key.to_string())
            .ok_or(WorkspaceError::Address(AddressError::LayerNotFound(key)))
    }

    pub fn layer_folder_mut(&mut self, key: LayerKey) -> Result<&mut Registry, WorkspaceError> {
        self.registry
            .get_folder_mut(&key.to_string())
            .ok_or(WorkspaceError::Address(AddressError::LayerNotFound(key)))
    }

    pub fn mesh_layer_folder(&self, index: usize) -> Result<&Registry, WorkspaceError> {
        self.layer_folder(LayerKey::mesh(index))
    }

    /// Appends an image layer and returns its key.
    /// 新增影像圖層並回傳其鍵。
    ///
    /// `AnatomicalRole` becomes the main layer when there is none yet and an
    /// overlay otherwise. Every role other than main needs an existing main
    /// layer. For the main layer the image dimensions are recorded under
    /// `ProjectMetaData.Files.Grey.Dimensions`.
    pub fn add_layer(
        &mut self,
        selector: &RoleSelector,
        path: impl AsRef<Path>,
    ) -> Result<LayerKey, WorkspaceError> {
        let main_exists = self.has_main_layer();
        let role = match selector {
            RoleSelector::Role(LayerRole::Main) if main_exists => {
                return Err(WorkspaceError::DuplicateMain)
            }
            RoleSelector::Role(role) => role.clone(),
            RoleSelector::Anatomical => resolve_anatomical(main_exists),
            RoleSelector::Any => return Err(WorkspaceError::InvalidRole(selector.clone())),
        };
        if role != LayerRole::Main && !main_exists {
            return Err(WorkspaceError::MissingMainLayer(role));
        }

        let key = LayerKey::image(self.layer_count());
        self.write_layer(key, &role, path.as_ref())?;
        info!(%key, %role, "added layer");
        Ok(key)
    }

    /// Puts `path` into the first layer matching `selector`, replacing that
    /// layer's contents in place, or appends a new layer when none matches.
    /// 取代符合角色的第一個圖層；若不存在則新增。
    pub fn set_layer(
        &mut self,
        selector: &RoleSelector,
        path: impl AsRef<Path>,
    ) -> Result<LayerKey, WorkspaceError> {
        if let RoleSelector::Any = selector {
            return Err(WorkspaceError::InvalidRole(selector.clone()));
        }
        let Some(key) = self.find_layer_by_role(selector, 0) else {
            return self.add_layer(selector, path);
        };
        let role = match selector {
            RoleSelector::Role(role) => role.clone(),
            _ => layer_role(&self.registry, key)
                .ok_or(WorkspaceError::MissingEntry { key, entry: ROLE })?,
        };
        self.write_layer(key, &role, path.as_ref())?;
        info!(%key, %role, "replaced layer");
        Ok(key)
    }

    fn write_layer(
        &mut self,
        key: LayerKey,
        role: &LayerRole,
        path: &Path,
    ) -> Result<(), WorkspaceError> {
        let absolute = paths::absolute(path)?;
        let dimensions = match role {
            LayerRole::Main => Some(self.codec.read_dimensions(&absolute)?),
            _ => None,
        };

        let folder = self.registry.folder(&key.to_string())?;
        folder.clear();
        folder.entry(ABSOLUTE_PATH)?.set(absolute.display());
        folder.entry(ROLE)?.set(role);
        if let Some(dimensions) = dimensions {
            debug!(%key, ?dimensions, "recorded main image dimensions");
            folder.entry(MAIN_DIMENSIONS)?.set_list(dimensions);
        }
        Ok(())
    }

    /// Appends a standalone mesh layer holding one poly-data file at
    /// `time_point` (1-based).
    /// 新增獨立網格圖層；時間點自 1 起算。
    pub fn add_mesh_layer(
        &mut self,
        path: impl AsRef<Path>,
        time_point: u32,
    ) -> Result<LayerKey, WorkspaceError> {
        if !self.has_main_layer() {
            return Err(WorkspaceError::NoMainLayer);
        }
        if time_point < 1 {
            return Err(WorkspaceError::InvalidTimePoint(time_point));
        }

        let absolute = paths::absolute(path.as_ref())?;
        let key = LayerKey::mesh(self.mesh_layer_count());
        let layer = self.registry.folder(&key.to_string())?;
        layer.entry("MeshType")?.set("StandaloneMesh");
        layer.entry(MESH_NICKNAME)?.set("");
        layer.entry(tags::TAGS)?.set("");

        let tp = layer.folder(&format!("{MESH_TIME_POINTS}.{}", time_point_key(time_point)))?;
        tp.entry("TimePoint")?.set(time_point);
        tp.folder(&poly_data_key(0))?
            .entry(ABSOLUTE_PATH)?
            .set(absolute.display());

        info!(%key, time_point, path = %absolute.display(), "added mesh layer");
        Ok(key)
    }

    /// Mesh layers keep their nickname in `Nickname`, image layers in
    /// `LayerMetaData.CustomNickName`.
    pub fn set_layer_nickname(&mut self, key: LayerKey, name: &str) -> Result<(), WorkspaceError> {
        let entry = nickname_entry(key.kind);
        self.layer_folder_mut(key)?.entry(entry)?.set(name);
        info!(%key, name, "set layer nickname");
        Ok(())
    }

    pub fn layer_nickname(&self, key: LayerKey) -> Option<&str> {
        self.registry
            .get_entry(&key.child(nickname_entry(key.kind)))
            .and_then(|value| value.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn layer_tags(&self, key: LayerKey) -> Result<BTreeSet<String>, WorkspaceError> {
        Ok(tags::tags(self.layer_folder(key)?))
    }

    pub fn add_layer_tag(&mut self, key: LayerKey, tag: &str) -> Result<(), WorkspaceError> {
        tags::add_tag(self.layer_folder_mut(key)?, tag)?;
        info!(%key, tag, "added tag");
        Ok(())
    }

    pub fn remove_layer_tag(&mut self, key: LayerKey, tag: &str) -> Result<(), WorkspaceError> {
        tags::remove_tag(self.layer_folder_mut(key)?, tag)?;
        info!(%key, tag, "removed tag");
        Ok(())
    }

    /// Layers carrying `tag`: image layers in index order, then mesh layers.
    /// 列出帶有指定標籤的圖層：先影像圖層，再網格圖層。
    pub fn find_layers_by_tag(&self, tag: &str) -> Vec<LayerKey> {
        let images = (0..self.layer_count()).map(LayerKey::image);
        let meshes = (0..self.mesh_layer_count()).map(LayerKey::mesh);
        images
            .chain(meshes)
            .filter(|key| {
                self.registry
                    .get_folder(&key.to_string())
                    .map(|folder| tags::tags(folder).contains(tag))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Resets `IRIS.LabelTable` to the single clear label. Returns `false`
    /// when the workspace has no label table.
    /// 將標籤表重設為僅含清除標籤。
    pub fn clear_labels(&mut self) -> Result<bool, WorkspaceError> {
        let Some(labels) = self.registry.get_folder_mut(LABEL_TABLE) else {
            return Ok(false);
        };
        labels.clear();
        labels.entry("NumberOfElements")?.set(1);
        let clear = labels.folder(&array_element_key(0))?;
        clear.entry("Index")?.set(0);
        clear.entry("Alpha")?.set(255);
        clear.entry("Red")?.set(0);
        clear.entry("Green")?.set(0);
        clear.entry("Blue")?.set(0);
        clear.entry("Visible")?.set(1);
        clear.entry("Label")?.set("Clear Label");
        info!("reset label table");
        Ok(true)
    }

    /// Summary of every image layer followed by every mesh layer.
    /// 所有圖層的摘要。
    pub fn layers(&self) -> Vec<LayerSummary> {
        let images = (0..self.layer_count()).map(LayerKey::image);
        let meshes = (0..self.mesh_layer_count()).map(LayerKey::mesh);
        images
            .chain(meshes)
            .filter_map(|key| {
                let folder = self.registry.get_folder(&key.to_string())?;
                let path = match key.kind {
                    LayerKind::Image => folder.get_entry(ABSOLUTE_PATH),
                    LayerKind::Mesh => first_poly_data_entry(folder),
                };
                Some(LayerSummary {
                    key: key.to_string(),
                    kind: key.kind,
                    index: key.index,
                    role: layer_role(&self.registry, key),
                    nickname: self.layer_nickname(key).map(str::to_string),
                    tags: tags::tags(folder).into_iter().collect(),
                    path: path.and_then(|value| value.as_str()).map(PathBuf::from),
                })
            })
            .collect()
    }

    /// Where the file of an image layer actually is. For a moved workspace
    /// the recorded path is re-anchored under the current directory when a
    /// file exists there; otherwise the recorded path is returned.
    /// 圖層檔案的實際位置；工作區搬移後優先使用新目錄下存在的檔案。
    pub fn resolve_actual_path(&self, key: LayerKey) -> Result<PathBuf, WorkspaceError> {
        let recorded = self
            .registry
            .get_entry(&key.child(ABSOLUTE_PATH))
            .and_then(|value| value.as_str())
            .ok_or(WorkspaceError::MissingEntry {
                key,
                entry: ABSOLUTE_PATH,
            })?;
        Ok(self.resolve_recorded(Path::new(recorded)))
    }

    fn resolve_recorded(&self, recorded: &Path) -> PathBuf {
        let (Some(saved), Some(current)) = (&self.saved_directory, &self.directory) else {
            return recorded.to_path_buf();
        };
        if saved == current {
            return recorded.to_path_buf();
        }
        match paths::relocate(recorded, saved, current) {
            Some(relocated) => {
                debug!(
                    recorded = %recorded.display(),
                    relocated = %relocated.display(),
                    "relocated layer path"
                );
                relocated
            }
            None => {
                warn!(
                    recorded = %recorded.display(),
                    "no relocated file found, keeping recorded path"
                );
                recorded.to_path_buf()
            }
        }
    }

    /// Dotted keys of every `AbsolutePath` entry (image layers and mesh
    /// poly-data) with the stored path.
    fn recorded_paths(&self) -> Vec<(String, PathBuf)> {
        let mut found = Vec::new();
        for key in (0..self.layer_count()).map(LayerKey::image) {
            let entry = key.child(ABSOLUTE_PATH);
            if let Some(raw) = self.registry.get_entry(&entry).and_then(|v| v.as_str()) {
                found.push((entry, PathBuf::from(raw)));
            }
        }
        for key in (0..self.mesh_layer_count()).map(LayerKey::mesh) {
            let Some(layer) = self.registry.get_folder(&key.to_string()) else {
                continue;
            };
            for tp in time_point_names(layer) {
                let tp_key = format!("{}.{tp}", key.child(MESH_TIME_POINTS));
                let Some(tp_folder) = self.registry.get_folder(&tp_key) else {
                    continue;
                };
                for pd in poly_data_names(tp_folder) {
                    let entry = format!("{tp_key}.{pd}.{ABSOLUTE_PATH}");
                    if let Some(raw) = self.registry.get_entry(&entry).and_then(|v| v.as_str()) {
                        found.push((entry, PathBuf::from(raw)));
                    }
                }
            }
        }
        found
    }

    fn resolved_paths(&self) -> Vec<(String, PathBuf)> {
        self.recorded_paths()
            .into_iter()
            .map(|(entry, recorded)| (entry, self.resolve_recorded(&recorded)))
            .collect()
    }

    /// Writes the workspace to `path`. Layer paths are rewritten to their
    /// resolved locations and `SaveLocation` is set to the new directory.
    /// 儲存工作區：改寫圖層路徑並記錄新的 `SaveLocation`。
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), WorkspaceError> {
        let file_path = paths::absolute(path.as_ref())?;
        let directory = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or(WorkspaceError::NoFileLocation)?;

        let mut next = self.registry.clone();
        for (entry, resolved) in self.resolved_paths() {
            next.entry(&entry)?.set(resolved.display());
        }
        next.entry(SAVE_LOCATION)?.set(directory.display());
        next.write_xml_file(&file_path, Some(WORKSPACE_HEADER))?;

        info!(path = %file_path.display(), "saved workspace");
        self.registry = next;
        self.file_path = Some(file_path);
        self.saved_directory = Some(directory.clone());
        self.directory = Some(directory);
        Ok(())
    }

    /// Saves back to the file the workspace was loaded from.
    pub fn save_in_place(&mut self) -> Result<(), WorkspaceError> {
        let path = self
            .file_path
            .clone()
            .ok_or(WorkspaceError::NoFileLocation)?;
        self.save(path)
    }

    /// Writes a self-contained copy of the workspace to `target`.
    /// 將工作區匯出為自足的副本。
    ///
    /// Each image layer is re-encoded next to `target` as
    /// `layer_NNN_<base>.<ext>`, where `<base>` is the content hash of the
    /// pixels when `scramble` is set and the original base name otherwise.
    /// The copy points at the new files and drops their `IOHints`. This
    /// workspace is left untouched.
    pub fn export(
        &self,
        target: impl AsRef<Path>,
        scramble: bool,
    ) -> Result<ExportReport, WorkspaceError> {
        let target = paths::absolute(target.as_ref())?;
        let target_dir = target
            .parent()
            .map(Path::to_path_buf)
            .ok_or(WorkspaceError::NoFileLocation)?;
        let extension = self.codec.canonical_extension();
        fs::create_dir_all(&target_dir)?;

        let mut copy = self.registry.clone();
        for (entry, resolved) in self.resolved_paths() {
            copy.entry(&entry)?.set(resolved.display());
        }

        let mut layers = Vec::new();
        for key in (0..self.layer_count()).map(LayerKey::image) {
            let source = self.resolve_actual_path(key)?;
            let image = self.codec.read_pixels(&source)?;
            let base = if scramble {
                self.hasher.hash(&image.pixels)
            } else {
                paths::base_name(&source)
            };
            let file = target_dir.join(format!("layer_{:03}_{base}.{extension}", key.index));
            self.codec.write_canonical(&image, &file)?;
            debug!(%key, source = %source.display(), file = %file.display(), "exported layer");

            let folder = copy.folder(&key.to_string())?;
            folder.entry(ABSOLUTE_PATH)?.set(file.display());
            folder.remove(IO_HINTS);
            layers.push(file);
        }

        copy.entry(SAVE_LOCATION)?.set(target_dir.display());
        copy.write_xml_file(&target, Some(WORKSPACE_HEADER))?;
        info!(
            target = %target.display(),
            layers = layers.len(),
            scramble,
            "exported workspace"
        );
        Ok(ExportReport {
            workspace: target,
            layers,
        })
    }
}

fn nickname_entry(kind: LayerKind) -> &'static str {
    match kind {
        LayerKind::Image => IMAGE_NICKNAME,
        LayerKind::Mesh => MESH_NICKNAME,
    }
}

fn first_poly_data_entry(mesh_layer: &Registry) -> Option<&snapws_registry::Value> {
    let tp = *time_point_names(mesh_layer).first()?;
    let tp_folder = mesh_layer.get_folder(MESH_TIME_POINTS)?.get_folder(tp)?;
    let pd = *poly_data_names(tp_folder).first()?;
    tp_folder.get_entry(&format!("{pd}.{ABSOLUTE_PATH}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DecodedImage;
    use tempfile::tempdir;

    /// Treats every file as a one-row grey image of its bytes.
    struct BytesCodec;

    impl ImageCodec for BytesCodec {
        fn read_dimensions(&self, path: &Path) -> Result<Vec<u64>, CodecError> {
            Ok(vec![fs::read(path)?.len() as u64, 1, 1])
        }

        fn read_pixels(&self, path: &Path) -> Result<DecodedImage, CodecError> {
            let pixels = fs::read(path)?;
            Ok(DecodedImage {
                dimensions: vec![pixels.len() as u64, 1, 1],
                channels: 1,
                pixels,
            })
        }

        fn write_canonical(&self, image: &DecodedImage, path: &Path) -> Result<(), CodecError> {
            fs::write(path, &image.pixels)?;
            Ok(())
        }

        fn canonical_extension(&self) -> &'static str {
            "raw"
        }
    }

    fn fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    fn workspace_with_main(dir: &Path) -> Workspace {
        let mut ws = Workspace::new().with_codec(BytesCodec);
        let main = fixture(dir, "main.nii.gz", b"abcd");
        ws.add_layer(&RoleSelector::MAIN, &main).unwrap();
        ws
    }

    #[test]
    fn main_layer_records_path_role_and_dimensions() {
        let dir = tempdir().unwrap();
        let ws = workspace_with_main(dir.path());
        let key = ws.main_layer_key().unwrap();
        assert_eq!(key, LayerKey::image(0));

        let folder = ws.layer_folder(key).unwrap();
        assert_eq!(folder.get_entry(ROLE).unwrap().as_str(), Some("MainRole"));
        assert_eq!(
            folder.get_entry(ABSOLUTE_PATH).unwrap().as_str().map(PathBuf::from),
            Some(dir.path().join("main.nii.gz"))
        );
        assert_eq!(
            folder.get_entry(MAIN_DIMENSIONS).unwrap().get_list(vec![0u64]),
            vec![4, 1, 1]
        );
        assert!(ws.is_valid_layer(key));
    }

    #[test]
    fn role_rules_are_enforced() {
        let dir = tempdir().unwrap();
        let overlay = fixture(dir.path(), "overlay.png", b"o");
        let mut ws = Workspace::new().with_codec(BytesCodec);

        assert!(matches!(
            ws.add_layer(&RoleSelector::OVERLAY, &overlay),
            Err(WorkspaceError::MissingMainLayer(LayerRole::Overlay))
        ));
        assert!(matches!(
            ws.add_mesh_layer(&overlay, 1),
            Err(WorkspaceError::NoMainLayer)
        ));
        assert!(matches!(ws.main_layer_key(), Err(WorkspaceError::NoMainLayer)));

        let main = fixture(dir.path(), "main.png", b"m");
        assert_eq!(
            ws.add_layer(&RoleSelector::Anatomical, &main).unwrap(),
            LayerKey::image(0)
        );
        assert!(matches!(
            ws.add_layer(&RoleSelector::MAIN, &main),
            Err(WorkspaceError::DuplicateMain)
        ));
        assert!(matches!(
            ws.add_layer(&RoleSelector::Any, &main),
            Err(WorkspaceError::InvalidRole(RoleSelector::Any))
        ));

        let key = ws.add_layer(&RoleSelector::Anatomical, &overlay).unwrap();
        assert_eq!(
            ws.find_layer_by_role(&RoleSelector::OVERLAY, 0),
            Some(key)
        );
        assert_eq!(ws.layer_count(), 2);
    }

    #[test]
    fn set_layer_replaces_in_place() {
        let dir = tempdir().unwrap();
        let mut ws = workspace_with_main(dir.path());
        let seg1 = fixture(dir.path(), "seg1.png", b"s1");
        let seg2 = fixture(dir.path(), "seg2.png", b"s2");

        let first = ws.set_layer(&RoleSelector::SEGMENTATION, &seg1).unwrap();
        ws.add_layer_tag(first, "old").unwrap();
        let second = ws.set_layer(&RoleSelector::SEGMENTATION, &seg2).unwrap();

        assert_eq!(first, second);
        assert_eq!(ws.layer_count(), 2);
        assert!(ws.layer_tags(second).unwrap().is_empty());
        assert_eq!(ws.resolve_actual_path(second).unwrap(), seg2);

        let main2 = fixture(dir.path(), "main2.png", b"xyz");
        assert_eq!(
            ws.set_layer(&RoleSelector::MAIN, &main2).unwrap(),
            LayerKey::image(0)
        );
        assert_eq!(
            ws.registry()
                .get_entry(&LayerKey::image(0).child(MAIN_DIMENSIONS))
                .unwrap()
                .as_str(),
            Some("3 1 1")
        );
    }

    #[test]
    fn mesh_layers_have_time_points() {
        let dir = tempdir().unwrap();
        let mut ws = workspace_with_main(dir.path());
        let mesh = fixture(dir.path(), "surface.vtk", b"vtk");

        assert!(matches!(
            ws.add_mesh_layer(&mesh, 0),
            Err(WorkspaceError::InvalidTimePoint(0))
        ));
        let key = ws.add_mesh_layer(&mesh, 3).unwrap();
        assert_eq!(key.to_string(), "MeshLayers.Layer[000]");
        assert!(ws.is_valid_mesh_layer(key));

        let layer = ws.mesh_layer_folder(0).unwrap();
        assert_eq!(layer.get_entry("MeshType").unwrap().as_str(), Some("StandaloneMesh"));
        assert_eq!(
            layer
                .get_entry("MeshTimePoints.TimePoint[003].TimePoint")
                .unwrap()
                .get_int(0),
            3
        );
        assert!(ws.mesh_layer_folder(1).is_err());
    }

    #[test]
    fn nicknames_and_tags() {
        let dir = tempdir().unwrap();
        let mut ws = workspace_with_main(dir.path());
        let mesh = ws
            .add_mesh_layer(fixture(dir.path(), "m.vtk", b"m"), 1)
            .unwrap();
        let main = ws.main_layer_key().unwrap();

        ws.set_layer_nickname(main, "T1").unwrap();
        ws.set_layer_nickname(mesh, "Surface").unwrap();
        assert_eq!(
            ws.registry()
                .get_entry("Layers.Layer[000].LayerMetaData.CustomNickName")
                .unwrap()
                .as_str(),
            Some("T1")
        );
        assert_eq!(ws.layer_nickname(mesh), Some("Surface"));

        ws.add_layer_tag(main, "b").unwrap();
        ws.add_layer_tag(main, "a").unwrap();
        ws.add_layer_tag(mesh, "a").unwrap();
        assert_eq!(
            ws.registry().get_entry("Layers.Layer[000].Tags").unwrap().as_str(),
            Some("a, b")
        );
        assert_eq!(ws.find_layers_by_tag("a"), vec![main, mesh]);
        ws.remove_layer_tag(main, "a").unwrap();
        assert_eq!(ws.find_layers_by_tag("a"), vec![mesh]);
        assert!(ws.set_layer_nickname(LayerKey::image(5), "x").is_err());
    }

    #[test]
    fn clear_labels_leaves_clear_label_only() {
        let dir = tempdir().unwrap();
        let mut ws = workspace_with_main(dir.path());
        assert!(!ws.clear_labels().unwrap());

        let table = ws.registry_mut().folder(LABEL_TABLE).unwrap();
        table.entry("NumberOfElements").unwrap().set(3);
        table.entry("Element[2].Label").unwrap().set("Liver");
        assert!(ws.clear_labels().unwrap());

        let table = ws.registry().get_folder(LABEL_TABLE).unwrap();
        assert_eq!(table.get_entry("NumberOfElements").unwrap().get_int(0), 1);
        assert!(!table.has_folder("Element[2]"));
        assert_eq!(
            table.get_entry("Element[0].Label").unwrap().as_str(),
            Some("Clear Label")
        );
        assert_eq!(table.get_entry("Element[0].Alpha").unwrap().get_int(0), 255);
    }

    #[test]
    fn save_records_location_and_reload_is_not_moved() {
        let dir = tempdir().unwrap();
        let mut ws = workspace_with_main(dir.path());
        let file = dir.path().join("case.itksnap");
        ws.save(&file).unwrap();

        assert!(!ws.is_moved());
        let loaded = Workspace::load(&file).unwrap();
        assert_eq!(loaded.saved_directory(), Some(dir.path()));
        assert!(!loaded.is_moved());
        assert_eq!(loaded.layer_count(), 1);
    }

    #[test]
    fn failed_save_leaves_workspace_unchanged() {
        let dir = tempdir().unwrap();
        let mut ws = workspace_with_main(dir.path());
        ws.save(dir.path().join("a.itksnap")).unwrap();
        let before = ws.registry().clone();
        fixture(dir.path(), "blocker", b"file");

        assert!(ws
            .save(dir.path().join("blocker").join("sub").join("b.itksnap"))
            .is_err());
        assert_eq!(ws.registry(), &before);
        let location = dir.path().display().to_string();
        assert_eq!(
            ws.registry()
                .get_entry(SAVE_LOCATION)
                .and_then(|value| value.as_str()),
            Some(location.as_str())
        );
        assert_eq!(ws.saved_directory(), Some(dir.path()));
        assert_eq!(ws.file_path(), Some(dir.path().join("a.itksnap").as_path()));
        assert!(!ws.is_moved());
    }

    #[test]
    fn moved_workspace_resolves_relocated_files() {
        let dir = tempdir().unwrap();
        let original = dir.path().join("original");
        fs::create_dir_all(&original).unwrap();
        let mut ws = workspace_with_main(&original);
        let seg = fixture(&original, "seg.png", b"s");
        ws.add_layer(&RoleSelector::SEGMENTATION, &seg).unwrap();
        ws.save(original.join("case.itksnap")).unwrap();

        let moved = dir.path().join("moved");
        fs::create_dir_all(&moved).unwrap();
        fs::copy(original.join("case.itksnap"), moved.join("case.itksnap")).unwrap();
        fs::copy(original.join("main.nii.gz"), moved.join("main.nii.gz")).unwrap();

        let mut loaded = Workspace::load(moved.join("case.itksnap"))
            .unwrap()
            .with_codec(BytesCodec);
        assert!(loaded.is_moved());
        assert_eq!(
            loaded.resolve_actual_path(LayerKey::image(0)).unwrap(),
            moved.join("main.nii.gz")
        );
        assert_eq!(loaded.resolve_actual_path(LayerKey::image(1)).unwrap(), seg);

        loaded.save_in_place().unwrap();
        assert!(!loaded.is_moved());
        assert_eq!(
            loaded
                .registry()
                .get_entry("Layers.Layer[000].AbsolutePath")
                .unwrap()
                .as_str()
                .map(PathBuf::from),
            Some(moved.join("main.nii.gz"))
        );
    }

    #[test]
    fn export_writes_copies_and_leaves_source_alone() {
        let dir = tempdir().unwrap();
        let mut ws = workspace_with_main(dir.path());
        let seg = fixture(dir.path(), "seg.png", b"labels");
        let seg_key = ws.add_layer(&RoleSelector::SEGMENTATION, &seg).unwrap();
        ws.registry_mut()
            .entry(&seg_key.child("IOHints.Format"))
            .unwrap()
            .set("PNG");
        let before = ws.registry().clone();

        let target = dir.path().join("out").join(ticket_workspace_name(123, ""));
        let report = ws.export(&target, false).unwrap();

        assert_eq!(ws.registry(), &before);
        assert_eq!(
            report.layers,
            vec![
                dir.path().join("out").join("layer_000_main.raw"),
                dir.path().join("out").join("layer_001_seg.raw"),
            ]
        );
        assert_eq!(report.files().count(), 3);
        assert_eq!(fs::read(&report.layers[1]).unwrap(), b"labels");

        let exported = Registry::read_from_file(&report.workspace).unwrap();
        assert!(!exported.has_folder("Layers.Layer[001].IOHints"));
        assert_eq!(
            exported.get_entry(SAVE_LOCATION).unwrap().as_str().map(PathBuf::from),
            Some(dir.path().join("out"))
        );
        assert_eq!(
            report.workspace.file_name().unwrap(),
            "ticket_00000123.itksnap"
        );
    }

    #[test]
    fn scrambled_export_uses_content_hash() {
        let dir = tempdir().unwrap();
        let ws = workspace_with_main(dir.path());
        let report = ws.export(dir.path().join("anon.itksnap"), true).unwrap();
        let expected = format!("layer_000_{}.raw", Blake3Hasher.hash(b"abcd"));
        assert_eq!(
            report.layers[0].file_name().unwrap().to_str(),
            Some(expected.as_str())
        );
    }
}
