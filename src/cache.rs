use std::collections::HashMap;

use crate::core::{AssetId, Dynamic};
use crate::error::EngineError;

/// Generated assets of one engine, keyed by identity.
///
/// The cache is not synchronized on its own. It is owned by exactly one
/// [`Engine`](crate::Engine) and only ever mutated by the thread driving it.
#[derive(Default)]
pub(crate) struct Cache {
    entries: HashMap<AssetId, Dynamic>,
}

impl Cache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, id: AssetId) -> Option<&Dynamic> {
        self.entries.get(&id)
    }

    pub(crate) fn contains(&self, id: AssetId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Stores a freshly generated asset. An identity can only be stored once.
    pub(crate) fn put(&mut self, id: AssetId, asset: Dynamic) -> Result<(), EngineError> {
        if self.entries.contains_key(&id) {
            tracing::error!(asset = %id, "attempted to overwrite a generated asset");
            return Err(EngineError::DuplicateGeneration(id));
        }

        self.entries.insert(id, asset);
        Ok(())
    }

    pub(crate) fn remove(&mut self, id: AssetId) -> Option<Dynamic> {
        self.entries.remove(&id)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// All cached entries, sorted by identity.
    pub(crate) fn entries(&self) -> Vec<(AssetId, &Dynamic)> {
        let mut entries: Vec<_> = self.entries.iter().map(|(id, a)| (*id, a)).collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{Asset, Parents};

    #[derive(Default)]
    struct Token(u32);

    impl Asset for Token {
        const ID: AssetId = AssetId::new("token");

        fn generate(&mut self, _: &Parents) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_put_get() {
        let mut cache = Cache::new();
        assert!(cache.get(Token::ID).is_none());

        cache.put(Token::ID, Arc::new(Token(7))).unwrap();

        let asset = cache.get(Token::ID).unwrap();
        assert_eq!(asset.as_any().downcast_ref::<Token>().unwrap().0, 7);
        assert!(cache.contains(Token::ID));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_put_twice_is_rejected() {
        let mut cache = Cache::new();
        cache.put(Token::ID, Arc::new(Token(1))).unwrap();

        let err = cache.put(Token::ID, Arc::new(Token(2))).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateGeneration(id) if id == Token::ID));

        // the first instance survives
        let asset = cache.get(Token::ID).unwrap();
        assert_eq!(asset.as_any().downcast_ref::<Token>().unwrap().0, 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cache = Cache::new();
        cache.put(Token::ID, Arc::new(Token(1))).unwrap();

        assert!(cache.remove(Token::ID).is_some());
        assert!(cache.remove(Token::ID).is_none());

        cache.put(Token::ID, Arc::new(Token(2))).unwrap();
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
