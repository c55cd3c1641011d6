//! The asset contract and its type-erased counterpart.
use std::any::Any;
use std::sync::Arc;

use crate::core::{AssetId, Dynamic, File};
use crate::error::EngineError;
use crate::parents::Parents;

/// A typed unit of work producing one installation artifact.
///
/// An asset starts out "empty" (usually its `Default` value), declares which
/// other assets it needs, and is populated exactly once by [`generate`]. The
/// engine guarantees that every identity listed by [`dependencies`] has been
/// generated before `generate` is called, and that it is visible through the
/// [`Parents`] snapshot.
///
/// ```rust
/// use assetgraph::{Asset, AssetId, Parents};
///
/// #[derive(Default)]
/// struct ClusterName(String);
///
/// impl Asset for ClusterName {
///     const ID: AssetId = AssetId::new("cluster-name");
///
///     fn generate(&mut self, _: &Parents) -> anyhow::Result<()> {
///         self.0 = "demo".into();
///         Ok(())
///     }
/// }
/// ```
///
/// [`generate`]: Asset::generate
/// [`dependencies`]: Asset::dependencies
pub trait Asset: Send + Sync + 'static {
    /// Identity under which the generated instance is cached.
    const ID: AssetId;

    /// Identities which have to be generated before this asset. Order only
    /// affects the order of side effects, never the result.
    fn dependencies(&self) -> Vec<AssetId> {
        Vec::new()
    }

    /// Populates the asset from the generated `parents`.
    ///
    /// This must not resolve other assets on its own, the engine does that.
    /// Any retry policy for external calls belongs here, the engine never
    /// retries a failed generation.
    fn generate(&mut self, parents: &Parents) -> anyhow::Result<()>;

    /// Files produced by this asset. Empty until generated.
    fn files(&self) -> &[File] {
        &[]
    }
}

/// Object-safe view of an [`Asset`] used by the engine to store assets of
/// different types in a single cache.
pub(crate) trait AnyAsset: Send + Sync {
    fn id(&self) -> AssetId;

    fn type_name(&self) -> &'static str;

    fn dependencies(&self) -> Vec<AssetId>;

    fn generate(&mut self, parents: &Parents) -> anyhow::Result<()>;

    fn files(&self) -> &[File];

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

// A blanket implementation to automatically bridge the two. This is where the
// type erasure actually happens.
impl<T> AnyAsset for T
where
    T: Asset,
{
    fn id(&self) -> AssetId {
        T::ID
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn dependencies(&self) -> Vec<AssetId> {
        T::dependencies(self)
    }

    fn generate(&mut self, parents: &Parents) -> anyhow::Result<()> {
        T::generate(self, parents)
    }

    fn files(&self) -> &[File] {
        T::files(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A generated asset whose concrete type is not known statically.
///
/// Returned by [`Engine::ensure_id`](crate::Engine::ensure_id), for callers
/// which pick their targets at runtime, e.g. by name from a command line.
#[derive(Clone)]
pub struct Instance(pub(crate) Dynamic);

impl Instance {
    pub fn id(&self) -> AssetId {
        self.0.id()
    }

    /// Rust type name of the generated asset.
    pub fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    pub fn files(&self) -> &[File] {
        self.0.files()
    }

    pub fn downcast_ref<T: Asset>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref()
    }

    pub fn downcast<T: Asset>(self) -> Result<Arc<T>, EngineError> {
        let id = self.id();

        self.0
            .into_any()
            .downcast::<T>()
            .map_err(|_| EngineError::TypeMismatch(id, std::any::type_name::<T>()))
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id())
            .field("type", &self.type_name())
            .finish()
    }
}
