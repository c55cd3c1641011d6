//! Dependency resolution.
//!
//! Resolving a root walks its dependency closure depth-first, in declared
//! order, using an explicit stack instead of recursion. Every identity is
//! marked as in progress while its dependencies are being walked; reaching
//! an identity which is still in progress means the walk went around a
//! cycle. Identities already present in the cache are not walked at all.
//!
//! The result is a [`Plan`]: the assets which still have to be generated,
//! each listed after all of its dependencies. Nothing is generated while
//! planning, so a cycle is reported before any side effect happens.

use std::collections::HashMap;

use crate::asset::AnyAsset;
use crate::blueprint::Blueprint;
use crate::cache::Cache;
use crate::core::AssetId;
use crate::error::{Cycle, EngineError};

/// An instantiated asset waiting to be generated.
pub(crate) struct Pending {
    pub id: AssetId,
    pub asset: Box<dyn AnyAsset>,
    pub dependencies: Vec<AssetId>,
}

pub(crate) struct Plan {
    /// Dependencies always come before their dependents.
    pub order: Vec<Pending>,
}

impl Plan {
    pub(crate) fn ids(&self) -> Vec<AssetId> {
        self.order.iter().map(|pending| pending.id).collect()
    }
}

enum Mark {
    InProgress,
    Planned,
}

struct Frame {
    id: AssetId,
    asset: Box<dyn AnyAsset>,
    dependencies: Vec<AssetId>,
    next: usize,
}

impl Frame {
    fn new(id: AssetId, blueprint: &Blueprint) -> Result<Self, EngineError> {
        let asset = blueprint.instantiate(id)?;
        let dependencies = asset.dependencies();

        Ok(Self {
            id,
            asset,
            dependencies,
            next: 0,
        })
    }
}

pub(crate) fn resolve(
    root: AssetId,
    blueprint: &Blueprint,
    cache: &Cache,
) -> Result<Plan, EngineError> {
    let mut order = Vec::new();

    if cache.contains(root) {
        return Ok(Plan { order });
    }

    let mut marks = HashMap::from([(root, Mark::InProgress)]);
    let mut stack = vec![Frame::new(root, blueprint)?];

    while let Some(frame) = stack.last_mut() {
        let next = frame.dependencies.get(frame.next).copied();
        frame.next += 1;

        let Some(dependency) = next else {
            // every dependency of the top frame is planned or cached
            if let Some(Frame {
                id,
                asset,
                dependencies,
                ..
            }) = stack.pop()
            {
                tracing::debug!(asset = %id, "planned");
                marks.insert(id, Mark::Planned);
                order.push(Pending {
                    id,
                    asset,
                    dependencies,
                });
            }
            continue;
        };

        if cache.contains(dependency) {
            continue;
        }

        match marks.get(&dependency) {
            Some(Mark::Planned) => {}
            Some(Mark::InProgress) => {
                let start = stack
                    .iter()
                    .position(|frame| frame.id == dependency)
                    .unwrap_or(0);

                let mut path: Vec<_> = stack[start..].iter().map(|frame| frame.id).collect();
                path.push(dependency);

                return Err(EngineError::Cycle(Cycle { path }));
            }
            None => {
                marks.insert(dependency, Mark::InProgress);
                stack.push(Frame::new(dependency, blueprint)?);
            }
        }
    }

    Ok(Plan { order })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{Asset, Parents};

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

    asset!(A, "a", []);
    asset!(B, "b", [A]);
    asset!(C, "c", [A, B]);
    asset!(Twice, "twice", [A, A]);
    asset!(X, "x", [Y]);
    asset!(Y, "y", [Z]);
    asset!(Z, "z", [X]);
    asset!(Entry, "entry", [A, X]);
    asset!(Selfish, "selfish", [Selfish]);
    asset!(Orphan, "orphan", [Nowhere]);
    asset!(Nowhere, "nowhere", []);

    fn blueprint() -> Blueprint {
        let mut blueprint = Blueprint::new();
        blueprint
            .add::<A>()
            .add::<B>()
            .add::<C>()
            .add::<Twice>()
            .add::<X>()
            .add::<Y>()
            .add::<Z>()
            .add::<Entry>()
            .add::<Selfish>()
            .add::<Orphan>();
        blueprint
    }

    #[test]
    fn test_declared_order() {
        let plan = resolve(C::ID, &blueprint(), &Cache::new()).unwrap();
        assert_eq!(plan.ids(), vec![A::ID, B::ID, C::ID]);
        assert_eq!(plan.order[2].dependencies, vec![A::ID, B::ID]);
    }

    #[test]
    fn test_duplicate_declaration_planned_once() {
        let plan = resolve(Twice::ID, &blueprint(), &Cache::new()).unwrap();
        assert_eq!(plan.ids(), vec![A::ID, Twice::ID]);
    }

    #[test]
    fn test_cached_are_skipped() {
        let mut cache = Cache::new();
        cache.put(A::ID, Arc::new(A)).unwrap();

        let plan = resolve(C::ID, &blueprint(), &cache).unwrap();
        assert_eq!(plan.ids(), vec![B::ID, C::ID]);

        cache.put(C::ID, Arc::new(C)).unwrap();
        let plan = resolve(C::ID, &blueprint(), &cache).unwrap();
        assert!(plan.order.is_empty());
    }

    #[test]
    fn test_cycle_path() {
        let Err(EngineError::Cycle(cycle)) = resolve(Entry::ID, &blueprint(), &Cache::new())
        else {
            panic!("expected a cycle");
        };

        // the entry point is not part of the cycle
        assert_eq!(cycle.path, vec![X::ID, Y::ID, Z::ID, X::ID]);
        assert!(!cycle.contains(Entry::ID));
    }

    #[test]
    fn test_self_cycle() {
        let Err(EngineError::Cycle(cycle)) = resolve(Selfish::ID, &blueprint(), &Cache::new())
        else {
            panic!("expected a cycle");
        };

        assert_eq!(cycle.path, vec![Selfish::ID, Selfish::ID]);
    }

    #[test]
    fn test_unregistered_dependency() {
        let result = resolve(Orphan::ID, &blueprint(), &Cache::new());
        assert!(matches!(result, Err(EngineError::Unregistered(id)) if id == Nowhere::ID));
    }

    #[test]
    fn test_unregistered_root() {
        let result = resolve(Nowhere::ID, &blueprint(), &Cache::new());
        assert!(matches!(result, Err(EngineError::Unregistered(id)) if id == Nowhere::ID));
    }
}
