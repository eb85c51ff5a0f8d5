use crate::assets::{Asset, AssetBase, AssetRef, AssetType, TypedAsset};
use crate::gpu::GpuBuffer;
use crate::ulid::Ulid;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::any::Any;
use std::fmt;

/// Resource data carried by an [`AssetCell`]
pub trait Payload: Default + Send + Sync + 'static {
    const ASSET_TYPE: AssetType;

    /// Get approximate memory size in bytes
    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
    }
}

/// Asset made of the common header and a lockable payload.
///
/// Importers fill the payload through [`AssetCell::write`] while the asset is
/// loading; readers should check [`Asset::is_loaded`] first.
pub struct AssetCell<P: Payload> {
    base: AssetBase,
    data: RwLock<P>,
}

impl<P: Payload> AssetCell<P> {
    pub fn new(id: Ulid) -> Self {
        Self {
            base: AssetBase::new(id),
            data: RwLock::new(P::default()),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, P> {
        self.data.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, P> {
        self.data.write()
    }
}

impl<P: Payload> Asset for AssetCell<P> {
    fn base(&self) -> &AssetBase {
        &self.base
    }

    fn asset_type(&self) -> AssetType {
        P::ASSET_TYPE
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn swap_payload(&self, other: &dyn Asset) -> bool {
        let Some(other) = other.downcast_ref::<Self>() else {
            return false;
        };
        if std::ptr::eq(self, other) {
            return true;
        }
        std::mem::swap(&mut *self.data.write(), &mut *other.data.write());
        true
    }

    fn memory_size(&self) -> usize {
        std::mem::size_of::<AssetBase>() + self.data.read().memory_size()
    }
}

impl<P: Payload> TypedAsset for AssetCell<P> {
    const ASSET_TYPE: AssetType = P::ASSET_TYPE;

    fn create(id: Ulid) -> Self {
        Self::new(id)
    }
}

impl<P: Payload + fmt::Debug> fmt::Debug for AssetCell<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetCell")
            .field("base", &self.base)
            .field("data", &*self.data.read())
            .finish()
    }
}

/// Texture format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureFormat {
    #[default]
    Rgba8Srgb,
    Rgba8Unorm,
    R8Unorm,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            TextureFormat::Rgba8Srgb | TextureFormat::Rgba8Unorm => 4,
            TextureFormat::R8Unorm => 1,
        }
    }
}

/// 2D texture
#[derive(Debug, Default)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub gpu: Option<GpuBuffer>,
}

impl Payload for TextureData {
    const ASSET_TYPE: AssetType = AssetType::Texture2D;

    fn memory_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// Compiled shader stage
#[derive(Debug, Default)]
pub struct ShaderData {
    pub entry_point: String,
    pub bytecode: Vec<u8>,
    pub gpu: Option<GpuBuffer>,
}

#[derive(Debug, Default)]
pub struct VertexShaderData(pub ShaderData);

#[derive(Debug, Default)]
pub struct FragmentShaderData(pub ShaderData);

impl Payload for VertexShaderData {
    const ASSET_TYPE: AssetType = AssetType::VertexShader;

    fn memory_size(&self) -> usize {
        self.0.bytecode.len()
    }
}

impl Payload for FragmentShaderData {
    const ASSET_TYPE: AssetType = AssetType::FragmentShader;

    fn memory_size(&self) -> usize {
        self.0.bytecode.len()
    }
}

/// Pipeline description kept by a material until its shaders are ready
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDesc {
    pub vertex_shader: Ulid,
    pub fragment_shader: Ulid,
    #[serde(default)]
    pub textures: Vec<Ulid>,
    #[serde(default)]
    pub depth_test: bool,
}

/// Material: a pipeline plus the shaders and textures it uses
#[derive(Debug, Default)]
pub struct MaterialData {
    pub vertex_shader: AssetRef<VertexShader>,
    pub fragment_shader: AssetRef<FragmentShader>,
    pub textures: SmallVec<[AssetRef<Texture2D>; 4]>,
    /// Pending description while waiting on dependencies, cleared once built
    pub pending: Option<PipelineDesc>,
    /// Id of the pipeline object created from the description
    pub pipeline: Option<u64>,
}

impl Payload for MaterialData {
    const ASSET_TYPE: AssetType = AssetType::Material;
}

/// Parameter overrides on top of a material
#[derive(Debug, Default)]
pub struct MaterialInstanceData {
    pub material: AssetRef<Material>,
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl Payload for MaterialInstanceData {
    const ASSET_TYPE: AssetType = AssetType::MaterialInstance;
}

#[derive(Debug, Default)]
pub struct MeshData {
    pub vertex_count: u32,
    pub index_count: u32,
    pub vertex_buffer: Option<GpuBuffer>,
    pub index_buffer: Option<GpuBuffer>,
}

impl Payload for MeshData {
    const ASSET_TYPE: AssetType = AssetType::Mesh;
}

/// Position of one glyph inside an atlas
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GlyphRect {
    pub codepoint: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Default)]
pub struct FontAtlasData {
    pub width: u32,
    pub height: u32,
    pub glyphs: Vec<GlyphRect>,
    pub texture: Option<GpuBuffer>,
}

impl Payload for FontAtlasData {
    const ASSET_TYPE: AssetType = AssetType::FontAtlas;

    fn memory_size(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Scene document plus the assets it keeps alive
#[derive(Debug, Default)]
pub struct SceneData {
    pub document: serde_json::Value,
    pub dependencies: Vec<AssetRef>,
}

impl Payload for SceneData {
    const ASSET_TYPE: AssetType = AssetType::Scene;
}

pub type Texture2D = AssetCell<TextureData>;
pub type VertexShader = AssetCell<VertexShaderData>;
pub type FragmentShader = AssetCell<FragmentShaderData>;
pub type Material = AssetCell<MaterialData>;
pub type MaterialInstance = AssetCell<MaterialInstanceData>;
pub type Mesh = AssetCell<MeshData>;
pub type FontAtlas = AssetCell<FontAtlasData>;
pub type Scene = AssetCell<SceneData>;
