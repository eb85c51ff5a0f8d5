use crate::assets::{Asset, AssetImporter, AssetType, TypedAsset};
use crate::ulid::Ulid;
use std::fmt;
use std::sync::Arc;

/// Builds an empty instance of one asset type
pub type AssetConstructor = fn(Ulid) -> Box<dyn Asset>;

fn construct<A: TypedAsset>(id: Ulid) -> Box<dyn Asset> {
    Box::new(A::create(id))
}

/// Constructor and importer registered for one asset type
#[derive(Clone)]
pub struct AssetTypeInfo {
    pub constructor: AssetConstructor,
    pub importer: Arc<dyn AssetImporter>,
}

impl fmt::Debug for AssetTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetTypeInfo").finish_non_exhaustive()
    }
}

/// Per-type dispatch table, indexed by [`AssetType`]
pub struct AssetTypeRegistry {
    types: [Option<AssetTypeInfo>; AssetType::COUNT],
}

impl AssetTypeRegistry {
    pub fn new() -> Self {
        Self {
            types: std::array::from_fn(|_| None),
        }
    }

    /// Register `A` with its importer, replacing any previous registration
    pub fn register<A: TypedAsset>(&mut self, importer: impl AssetImporter + 'static) -> &mut Self {
        self.register_with(A::ASSET_TYPE, construct::<A>, Arc::new(importer))
    }

    pub fn register_with(
        &mut self,
        asset_type: AssetType,
        constructor: AssetConstructor,
        importer: Arc<dyn AssetImporter>,
    ) -> &mut Self {
        let slot = &mut self.types[asset_type.index()];
        if slot.is_some() {
            tracing::debug!("Replacing registration for asset type {asset_type}");
        }
        *slot = Some(AssetTypeInfo {
            constructor,
            importer,
        });
        self
    }

    pub fn get(&self, asset_type: AssetType) -> Option<&AssetTypeInfo> {
        self.types[asset_type.index()].as_ref()
    }

    pub fn is_registered(&self, asset_type: AssetType) -> bool {
        self.get(asset_type).is_some()
    }

    /// Registered types in declaration order
    pub fn registered(&self) -> impl Iterator<Item = AssetType> + '_ {
        AssetType::ALL
            .into_iter()
            .filter(|ty| self.is_registered(*ty))
    }
}

impl Default for AssetTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AssetTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.registered()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetLoadResult, LoadContext, Mesh, Texture2D};

    #[test]
    fn test_register_and_construct() {
        let mut registry = AssetTypeRegistry::new();
        registry.register::<Texture2D>(|_: &dyn Asset, _: &mut LoadContext<'_, '_>| {
            AssetLoadResult::Success
        });

        assert!(registry.is_registered(AssetType::Texture2D));
        assert!(!registry.is_registered(AssetType::Mesh));

        let id = Ulid::generate();
        let info = registry.get(AssetType::Texture2D).unwrap();
        let asset = (info.constructor)(id);
        assert_eq!(asset.id(), id);
        assert!(asset.is::<Texture2D>());
        assert!(!asset.is::<Mesh>());
    }

    #[test]
    fn test_registered_order() {
        let mut registry = AssetTypeRegistry::new();
        let importer = |_: &dyn Asset, _: &mut LoadContext<'_, '_>| AssetLoadResult::Failure;
        registry.register::<Mesh>(importer).register::<Texture2D>(importer);
        let types: Vec<_> = registry.registered().collect();
        assert_eq!(types, vec![AssetType::Texture2D, AssetType::Mesh]);
    }
}
