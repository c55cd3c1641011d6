use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use crate::asset::Asset;
use crate::cancel::Cancellation;
use crate::core::{AssetId, Dynamic};
use crate::error::{MissingDependency, ParentsError};

/// Which generated assets are visible to a single `generate` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    /// Only the dependencies the asset itself declares.
    #[default]
    Direct,
    /// The declared dependencies and everything they depend on, transitively.
    Transitive,
}

/// Read-only snapshot of the generated dependencies of one asset.
///
/// A snapshot is created by the engine right before an asset is generated
/// and dropped right after. Looking up an identity which is not part of the
/// snapshot is a programming error in the asset and is reported as
/// [`MissingDependency`], even if the asset chooses to ignore the returned
/// error.
pub struct Parents {
    requester: AssetId,
    assets: BTreeMap<AssetId, Dynamic>,
    cancellation: Cancellation,
    violation: OnceLock<MissingDependency>,
}

impl Parents {
    /// Creates an empty snapshot for `requester`.
    ///
    /// Useful to exercise the `generate` of a single asset in isolation,
    /// filling in its parents by hand with [`Parents::add`].
    pub fn new(requester: AssetId) -> Self {
        Self::with_cancellation(requester, Cancellation::new())
    }

    pub(crate) fn with_cancellation(requester: AssetId, cancellation: Cancellation) -> Self {
        Self {
            requester,
            assets: BTreeMap::new(),
            cancellation,
            violation: OnceLock::new(),
        }
    }

    /// Adds an already generated asset to the snapshot.
    pub fn add<T: Asset>(&mut self, asset: T) -> &mut Self {
        self.assets.insert(T::ID, Arc::new(asset));
        self
    }

    pub(crate) fn insert(&mut self, id: AssetId, asset: Dynamic) {
        self.assets.insert(id, asset);
    }

    /// Identity of the asset this snapshot was built for.
    pub fn requester(&self) -> AssetId {
        self.requester
    }

    /// Retrieves the generated instance of the dependency `T`.
    pub fn get<T: Asset>(&self) -> Result<&T, ParentsError> {
        let Some(asset) = self.assets.get(&T::ID) else {
            let missing = MissingDependency {
                requester: self.requester,
                requested: T::ID,
            };
            let _ = self.violation.set(missing.clone());
            return Err(missing.into());
        };

        asset
            .as_any()
            .downcast_ref::<T>()
            .ok_or(ParentsError::WrongType(T::ID, std::any::type_name::<T>()))
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.assets.contains_key(&id)
    }

    /// Identities visible in this snapshot, in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.assets.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Cancellation token of the current run. Long running generators
    /// should check it between external calls.
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    /// The first undeclared lookup made through this snapshot, if any.
    pub(crate) fn take_violation(&mut self) -> Option<MissingDependency> {
        self.violation.take()
    }
}

impl std::fmt::Debug for Parents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parents")
            .field("requester", &self.requester)
            .field("assets", &self.assets.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct InstallConfig {
        region: String,
    }

    impl Asset for InstallConfig {
        const ID: AssetId = AssetId::new("install-config");

        fn generate(&mut self, _: &Parents) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Default, Debug)]
    struct RootCa;

    impl Asset for RootCa {
        const ID: AssetId = AssetId::new("tls/root-ca");

        fn generate(&mut self, _: &Parents) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_get_declared() {
        let mut parents = Parents::new(AssetId::new("master"));
        parents.add(InstallConfig {
            region: "us-east".into(),
        });

        let config = parents.get::<InstallConfig>().unwrap();
        assert_eq!(config.region, "us-east");
        assert!(parents.contains(InstallConfig::ID));
        assert_eq!(parents.len(), 1);
        assert!(parents.take_violation().is_none());
    }

    #[test]
    fn test_get_undeclared_is_recorded() {
        let mut parents = Parents::new(AssetId::new("master"));
        parents.add(InstallConfig::default());

        let err = parents.get::<RootCa>().unwrap_err();
        assert!(matches!(err, ParentsError::Missing(_)));

        // a second lookup keeps the first violation
        let _ = parents.get::<RootCa>();

        let violation = parents.take_violation().unwrap();
        assert_eq!(violation.requester, AssetId::new("master"));
        assert_eq!(violation.requested, RootCa::ID);
    }

    #[test]
    fn test_get_wrong_type() {
        let mut parents = Parents::new(AssetId::new("master"));
        parents.insert(RootCa::ID, Arc::new(InstallConfig::default()));

        let err = parents.get::<RootCa>().unwrap_err();
        assert!(matches!(err, ParentsError::WrongType(id, _) if id == RootCa::ID));
        assert!(parents.take_violation().is_none());
    }

    #[test]
    fn test_undeclared_lookup_from_workers() {
        let mut parents = Parents::new(AssetId::new("master"));
        parents.add(InstallConfig::default());

        let shared = &parents;
        rayon::scope(|s| {
            for _ in 0..4 {
                s.spawn(move |_| {
                    assert!(shared.get::<InstallConfig>().is_ok());
                    assert!(shared.get::<RootCa>().is_err());
                });
            }
        });

        let violation = parents.take_violation().unwrap();
        assert_eq!(violation.requested, RootCa::ID);
        assert!(parents.take_violation().is_none());
    }

    #[test]
    fn test_ids_sorted() {
        let mut parents = Parents::new(AssetId::new("master"));
        parents.add(RootCa).add(InstallConfig::default());

        let ids: Vec<_> = parents.ids().collect();
        assert_eq!(ids, vec![InstallConfig::ID, RootCa::ID]);
    }
}
