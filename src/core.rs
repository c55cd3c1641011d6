use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::asset::AnyAsset;

/// A type-erased, thread-safe generated asset.
pub(crate) type Dynamic = Arc<dyn AnyAsset>;

/// Stable identity of an asset variant.
///
/// The identity is the cache key of the engine: two requests for the same
/// `AssetId` always resolve to the same generated instance within one engine
/// lifetime.
///
/// ```rust
/// use assetgraph::AssetId;
///
/// const ROOT_CA: AssetId = AssetId::new("tls/root-ca");
/// assert_eq!(ROOT_CA.name(), "tls/root-ca");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(&'static str);

impl AssetId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Human readable name of the asset.
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl std::fmt::Debug for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AssetId({})", self.0)
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// A 32-byte BLAKE3 hash used to fingerprint the files written by assets.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub(crate) struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub(crate) fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub(crate) fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for byte in self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

/// A single file produced by an asset, e.g. an ignition config or a
/// certificate. The file name is relative to the directory the engine
/// persists into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    pub filename: Utf8PathBuf,
    pub data: Vec<u8>,
}

impl File {
    pub fn new(filename: impl Into<Utf8PathBuf>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }

    pub fn filename(&self) -> &Utf8Path {
        &self.filename
    }

    /// Content interpreted as UTF-8, if it is valid.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    pub(crate) fn hash(&self) -> Hash32 {
        Hash32::hash(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_id_display() {
        let id = AssetId::new("rhcos/bootstrap-image");
        assert_eq!(id.to_string(), "rhcos/bootstrap-image");
        assert_eq!(format!("{id:?}"), "AssetId(rhcos/bootstrap-image)");
    }

    #[test]
    fn test_asset_id_ordering() {
        let mut ids = vec![AssetId::new("b"), AssetId::new("c"), AssetId::new("a")];
        ids.sort();
        assert_eq!(ids, vec![AssetId::new("a"), AssetId::new("b"), AssetId::new("c")]);
    }

    #[test]
    fn test_hash_hex() {
        let hash = Hash32::hash(b"");
        assert_eq!(
            hash.to_hex(),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn test_file_text() {
        let file = File::new("master.ign", "{}");
        assert_eq!(file.text(), Some("{}"));
        assert_eq!(file.filename(), "master.ign");

        let binary = File::new("blob", vec![0xff, 0xfe]);
        assert_eq!(binary.text(), None);
    }
}
