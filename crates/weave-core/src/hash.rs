//! Content hashing for deterministic execution checks.
//!
//! Produces a SHA-256 hash of texture data so graph outputs can be compared
//! bit-exactly across runs and execution modes.

use sha2::{Digest, Sha256};

use crate::texture::Texture;

/// A content hash digest (SHA-256, 32 bytes).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash {
    bytes: [u8; 32],
}

impl ContentHash {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// First eight hex digits, for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

fn update_texture(hasher: &mut Sha256, texture: &Texture) {
    // Dimensions and format are part of the digest so equal data in
    // different shapes hashes differently.
    hasher.update(texture.width.to_le_bytes());
    hasher.update(texture.height.to_le_bytes());
    hasher.update([texture.format.channel_count() as u8]);
    for v in &texture.data {
        hasher.update(v.to_le_bytes());
    }
}

fn finish(hasher: Sha256) -> ContentHash {
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    ContentHash::from_bytes(bytes)
}

/// Compute the content hash of a single texture.
pub fn hash_texture(texture: &Texture) -> ContentHash {
    let mut hasher = Sha256::new();
    update_texture(&mut hasher, texture);
    finish(hasher)
}

/// Compute the content hash of a sequence of labelled textures.
pub fn hash_textures<'a>(items: impl IntoIterator<Item = (&'a str, &'a Texture)>) -> ContentHash {
    let mut hasher = Sha256::new();
    for (label, texture) in items {
        hasher.update((label.len() as u64).to_le_bytes());
        hasher.update(label.as_bytes());
        update_texture(&mut hasher, texture);
    }
    finish(hasher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::TextureFormat;

    #[test]
    fn test_hash_deterministic() {
        let a = Texture::solid(8, 8, [0.1, 0.2, 0.3, 1.0]);
        let b = Texture::solid(8, 8, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(hash_texture(&a), hash_texture(&b));
    }

    #[test]
    fn test_hash_different_content() {
        let a = Texture::solid(8, 8, [0.1, 0.2, 0.3, 1.0]);
        let b = Texture::solid(8, 8, [0.1, 0.2, 0.4, 1.0]);
        assert_ne!(hash_texture(&a), hash_texture(&b));
    }

    #[test]
    fn test_hash_different_shape() {
        let a = Texture::new(4, 2, TextureFormat::R32Float);
        let b = Texture::new(2, 4, TextureFormat::R32Float);
        assert_ne!(hash_texture(&a), hash_texture(&b));
    }

    #[test]
    fn test_labels_participate() {
        let tex = Texture::scalar(1, 1, 1.0);
        let a = hash_textures([("a.out", &tex)]);
        let b = hash_textures([("b.out", &tex)]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_format() {
        let hash = hash_texture(&Texture::scalar(2, 2, 0.0));
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash.short(), &hex[..8]);
        assert_eq!(format!("{}", hash), hex);
    }
}
