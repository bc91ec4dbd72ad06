//! Random naming for stored objects and local assets.
//!
//! Randomness is injected through [`RandomSource`] so pipelines can be driven
//! with deterministic bytes in tests.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};

/// Number of random bytes behind every key and asset name.
pub const KEY_BYTES: usize = 32;

pub trait RandomSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]);
}

/// Operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, buf: &mut [u8]) {
        OsRng.fill_bytes(buf);
    }
}

/// Opaque object key: 64 lowercase hex characters, independent of any id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn derive(random: &dyn RandomSource) -> Self {
        let mut bytes = [0u8; KEY_BYTES];
        random.fill(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Location of a processed video under this key.
    pub fn video_object_path(&self) -> String {
        format!("videos/{}.mp4", self.0)
    }
}

/// URL-safe random file stem for locally served assets.
pub fn asset_name(random: &dyn RandomSource) -> String {
    let mut bytes = [0u8; KEY_BYTES];
    random.fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
