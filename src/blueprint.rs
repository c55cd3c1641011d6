use std::collections::BTreeMap;

use petgraph::graph::DiGraph;

use crate::asset::{AnyAsset, Asset};
use crate::cache::Cache;
use crate::core::AssetId;
use crate::engine::{Engine, Options};
use crate::error::{Cycle, EngineError};

type Factory = Box<dyn Fn() -> Box<dyn AnyAsset> + Send + Sync>;

/// The blueprint of an installation.
///
/// `Blueprint` is the registry of every asset variant the engine may need to
/// generate. Each registration maps an [`AssetId`] to a factory producing a
/// fresh, empty instance of the asset; the engine instantiates an asset when
/// it is first requested, either directly or as somebody's dependency.
///
/// Once every asset is registered, convert the blueprint into an [`Engine`]
/// with [`Blueprint::finish`].
///
/// # Example
///
/// ```rust
/// use assetgraph::{Asset, AssetId, Blueprint, Parents};
///
/// #[derive(Default)]
/// struct PullSecret(String);
///
/// impl Asset for PullSecret {
///     const ID: AssetId = AssetId::new("pull-secret");
///
///     fn generate(&mut self, _: &Parents) -> anyhow::Result<()> {
///         self.0 = "{}".into();
///         Ok(())
///     }
/// }
///
/// let mut blueprint = Blueprint::new();
/// blueprint.add::<PullSecret>();
///
/// let mut engine = blueprint.finish();
/// let secret = engine.ensure::<PullSecret>().unwrap();
/// assert_eq!(secret.0, "{}");
/// ```
#[derive(Default)]
pub struct Blueprint {
    factories: BTreeMap<AssetId, Factory>,
}

impl Blueprint {
    /// Creates a new, empty blueprint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T`, instantiated through its `Default` implementation.
    pub fn add<T>(&mut self) -> &mut Self
    where
        T: Asset + Default,
    {
        self.add_with(T::default)
    }

    /// Registers `T`, instantiated by calling `factory`.
    ///
    /// Registering an identity a second time replaces the earlier factory.
    pub fn add_with<T, F>(&mut self, factory: F) -> &mut Self
    where
        T: Asset,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let factory: Factory = Box::new(move || Box::new(factory()));

        if self.factories.insert(T::ID, factory).is_some() {
            tracing::warn!(asset = %T::ID, "replacing a registered asset");
        }

        self
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.factories.contains_key(&id)
    }

    /// Registered identities, sorted.
    pub fn ids(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.factories.keys().copied()
    }

    pub(crate) fn instantiate(&self, id: AssetId) -> Result<Box<dyn AnyAsset>, EngineError> {
        self.factories
            .get(&id)
            .map(|factory| factory())
            .ok_or(EngineError::Unregistered(id))
    }

    /// Checks the registered assets without generating anything: every
    /// declared dependency has to be registered and the dependency graph has
    /// to be free of cycles.
    pub fn validate(&self) -> Result<(), EngineError> {
        let mut graph = DiGraph::<AssetId, ()>::new();
        let nodes: BTreeMap<_, _> = self.ids().map(|id| (id, graph.add_node(id))).collect();

        for (&id, &target) in &nodes {
            for dependency in self.instantiate(id)?.dependencies() {
                let Some(&source) = nodes.get(&dependency) else {
                    tracing::error!(asset = %id, dependency = %dependency, "unregistered dependency");
                    return Err(EngineError::Unregistered(dependency));
                };
                graph.update_edge(source, target, ());
            }
        }

        if let Err(cycle) = petgraph::algo::toposort(&graph, None) {
            let id = graph[cycle.node_id()];

            // Walk the resolver from a node on the cycle to name the whole path.
            return match crate::engine::plan::resolve(id, self, &Cache::new()) {
                Err(err @ EngineError::Cycle(_)) => Err(err),
                _ => Err(EngineError::Cycle(Cycle { path: vec![id, id] })),
            };
        }

        Ok(())
    }

    /// Builds an engine with the default [`Options`].
    pub fn finish(self) -> Engine {
        Engine::new(self, Options::default())
    }

    pub fn finish_with(self, options: Options) -> Engine {
        Engine::new(self, options)
    }
}

/// Renders the registered assets as a Mermaid flowchart.
impl std::fmt::Display for Blueprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        for (index, (id, factory)) in self.factories.iter().enumerate() {
            let asset = factory();
            let name = id.name().replace('"', "\\\"");
            writeln!(f, "    {index}[\"{name}\"]")?;

            for dependency in asset.dependencies() {
                match self.factories.keys().position(|key| *key == dependency) {
                    Some(source) => writeln!(f, "    {source} --> {index}")?,
                    None => writeln!(f, "    missing_{index}[\"{dependency}?\"] --> {index}")?,
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blueprint")
            .field("assets", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Parents;

    macro_rules! asset {
        ($name:ident, $id:literal, [$($dep:ident),*]) => {
            #[derive(Default)]
            struct $name;

            impl Asset for $name {
                const ID: AssetId = AssetId::new($id);

                fn dependencies(&self) -> Vec<AssetId> {
                    vec![$($dep::ID),*]
                }

                fn generate(&mut self, _: &Parents) -> anyhow::Result<()> {
                    Ok(())
                }
            }
        };
    }

    asset!(Config, "config", []);
    asset!(RootCa, "root-ca", [Config]);
    asset!(Master, "master", [Config, RootCa]);
    asset!(Ping, "ping", [Pong]);
    asset!(Pong, "pong", [Ping]);
    asset!(Narcissus, "narcissus", [Narcissus]);

    #[test]
    fn test_validate_ok() {
        let mut blueprint = Blueprint::new();
        blueprint.add::<Config>().add::<RootCa>().add::<Master>();

        assert!(blueprint.validate().is_ok());
        assert!(blueprint.contains(Master::ID));
        assert_eq!(blueprint.ids().count(), 3);
    }

    #[test]
    fn test_validate_unregistered() {
        let mut blueprint = Blueprint::new();
        blueprint.add::<Master>().add::<Config>();

        let err = blueprint.validate().unwrap_err();
        assert!(matches!(err, EngineError::Unregistered(id) if id == RootCa::ID));
    }

    #[test]
    fn test_validate_cycle() {
        let mut blueprint = Blueprint::new();
        blueprint.add::<Ping>().add::<Pong>();

        let EngineError::Cycle(cycle) = blueprint.validate().unwrap_err() else {
            panic!("expected a cycle");
        };
        assert_eq!(cycle.participants(), vec![Ping::ID, Pong::ID]);
    }

    #[test]
    fn test_validate_self_cycle() {
        let mut blueprint = Blueprint::new();
        blueprint.add::<Narcissus>();

        let EngineError::Cycle(cycle) = blueprint.validate().unwrap_err() else {
            panic!("expected a cycle");
        };
        assert_eq!(cycle.path, vec![Narcissus::ID, Narcissus::ID]);
    }

    #[test]
    fn test_replace_registration() {
        let mut blueprint = Blueprint::new();
        blueprint.add::<Config>().add_with(|| Config);

        assert_eq!(blueprint.ids().count(), 1);
    }

    #[test]
    fn test_display_mermaid() {
        let mut blueprint = Blueprint::new();
        blueprint.add::<Config>().add::<Master>();

        let rendered = blueprint.to_string();
        // sorted: config = 0, master = 1
        assert!(rendered.starts_with("graph LR\n"));
        assert!(rendered.contains("    0[\"config\"]\n"));
        assert!(rendered.contains("    1[\"master\"]\n"));
        assert!(rendered.contains("    0 --> 1\n"));
        assert!(rendered.contains("missing_1[\"root-ca?\"] --> 1"));
    }
}
