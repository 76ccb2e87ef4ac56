//! Imaging workspace model on top of the registry tree.
//! 建立在登錄樹之上的影像工作區模型。

pub mod address;
pub mod codec;
pub mod paths;
pub mod role;
pub mod tags;
mod workspace;

pub use address::{
    find_layer_by_role, is_valid_layer, is_valid_mesh_layer, layer_count, layer_spec_to_key,
    AddressError, LayerKey, LayerKind,
};
pub use codec::{Blake3Hasher, CodecError, ContentHasher, DecodedImage, ImageCodec, RasterCodec};
pub use role::{resolve_anatomical, LayerRole, RoleSelector};
pub use workspace::{
    ticket_workspace_name, ExportReport, LayerSummary, Workspace, WorkspaceError, SAVE_LOCATION,
    WORKSPACE_EXTENSION, WORKSPACE_HEADER,
};
