//! Artifact signing and provenance
//!
//! A [`SecurityProvider`] signs the manifest's signing payload at publish
//! time and checks it again before an artifact is applied. The bundled
//! provider uses Ed25519 with base58-encoded keys and signatures.

use crate::error::{EngineError, EngineResult};
use chrono::Utc;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use std::path::Path;
use tm_core::{Manifest, PlatformInfo, Provenance, SignatureBlock};

/// Signature scheme identifier of [`Ed25519Provider`]
pub const ED25519: &str = "ed25519";

/// Facts about the build being signed
#[derive(Debug, Clone, Default)]
pub struct BuildInfo {
    /// Who or what produced the build
    pub builder: String,

    /// Source control revision, when known
    pub source_revision: Option<String>,
}

/// Signs and verifies manifests
pub trait SecurityProvider: Send + Sync {
    /// Signature scheme identifier
    fn algorithm(&self) -> &'static str;

    /// Encoded public key identifying the signer
    fn public_key(&self) -> String;

    /// Sign `payload`, returning an encoded signature token
    fn sign(&self, payload: &[u8]) -> EngineResult<String>;

    /// Check an encoded signature token against `payload`
    fn verify(&self, payload: &[u8], signature: &str) -> EngineResult<bool>;

    /// Describe how `manifest` was built
    fn generate_provenance(&self, manifest: &Manifest, build: &BuildInfo) -> Provenance {
        Provenance {
            builder: build.builder.clone(),
            built_at: Utc::now(),
            source_revision: build.source_revision.clone(),
            manifest_checksum: manifest.checksum.clone(),
            platform: PlatformInfo::current(),
        }
    }
}

/// Ed25519 signer/verifier
pub struct Ed25519Provider {
    signing: Option<SigningKey>,
    verifying: VerifyingKey,
}

impl Ed25519Provider {
    /// Provider that can sign, from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(seed);
        Self {
            verifying: signing.verifying_key(),
            signing: Some(signing),
        }
    }

    /// Provider that can sign, from a base58 seed
    pub fn from_seed_base58(encoded: &str) -> EngineResult<Self> {
        let seed: [u8; 32] = decode_fixed(encoded.trim(), "signing seed")?;
        Ok(Self::from_seed(&seed))
    }

    /// Provider that can sign, from a file holding a base58 seed
    pub fn from_seed_file(path: &Path) -> EngineResult<Self> {
        let encoded = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Security(format!("cannot read signing key {}: {e}", path.display()))
        })?;
        Self::from_seed_base58(&encoded)
    }

    /// Provider that can only verify, from a base58 public key
    pub fn verifier(public_key: &str) -> EngineResult<Self> {
        let bytes: [u8; 32] = decode_fixed(public_key.trim(), "public key")?;
        let verifying = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| EngineError::Security(format!("invalid public key: {e}")))?;
        Ok(Self {
            signing: None,
            verifying,
        })
    }

    /// Fresh key pair seeded from the operating system's RNG
    pub fn generate() -> EngineResult<Self> {
        let mut seed = [0u8; 32];
        getrandom::fill(&mut seed)
            .map_err(|e| EngineError::Security(format!("cannot generate signing key: {e}")))?;
        Ok(Self::from_seed(&seed))
    }

    /// Base58 seed, if this provider can sign
    pub fn seed_base58(&self) -> Option<String> {
        self.signing
            .as_ref()
            .map(|key| bs58::encode(key.to_bytes()).into_string())
    }

    /// Whether this provider holds a signing key
    pub fn can_sign(&self) -> bool {
        self.signing.is_some()
    }
}

fn decode_fixed<const N: usize>(encoded: &str, what: &str) -> EngineResult<[u8; N]> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| EngineError::Security(format!("invalid base58 {what}: {e}")))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        EngineError::Security(format!("{what} must be {N} bytes, got {}", bytes.len()))
    })
}

impl SecurityProvider for Ed25519Provider {
    fn algorithm(&self) -> &'static str {
        ED25519
    }

    fn public_key(&self) -> String {
        bs58::encode(self.verifying.to_bytes()).into_string()
    }

    fn sign(&self, payload: &[u8]) -> EngineResult<String> {
        let key = self.signing.as_ref().ok_or_else(|| {
            EngineError::Security("no signing key configured; provider can only verify".to_string())
        })?;
        Ok(bs58::encode(key.sign(payload).to_bytes()).into_string())
    }

    fn verify(&self, payload: &[u8], signature: &str) -> EngineResult<bool> {
        let bytes: [u8; 64] = decode_fixed(signature, "signature")?;
        let signature = Signature::from_bytes(&bytes);
        Ok(self.verifying.verify(payload, &signature).is_ok())
    }
}

/// Attach a signature block (with provenance) to `manifest`
pub fn sign_manifest(
    provider: &dyn SecurityProvider,
    manifest: &mut Manifest,
    build: &BuildInfo,
) -> EngineResult<()> {
    manifest.signature = None;
    let payload = manifest.signing_payload()?;
    let signature = provider.sign(&payload)?;
    let provenance = provider.generate_provenance(manifest, build);
    manifest.signature = Some(SignatureBlock {
        algorithm: provider.algorithm().to_string(),
        public_key: provider.public_key(),
        signature,
        provenance: Some(provenance),
    });
    Ok(())
}

/// Problems with `manifest`'s signature block, empty when it verifies
pub fn verify_manifest(provider: &dyn SecurityProvider, manifest: &Manifest) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(block) = &manifest.signature else {
        errors.push(format!("artifact {} is unsigned", manifest.version));
        return errors;
    };

    if block.algorithm != provider.algorithm() {
        errors.push(format!(
            "unsupported signature algorithm '{}' (expected '{}')",
            block.algorithm,
            provider.algorithm()
        ));
        return errors;
    }
    if block.public_key != provider.public_key() {
        errors.push(format!("artifact signed by untrusted key {}", block.public_key));
    }

    match manifest
        .signing_payload()
        .map_err(EngineError::from)
        .and_then(|payload| provider.verify(&payload, &block.signature))
    {
        Ok(true) => {}
        Ok(false) => errors.push("signature does not match manifest".to_string()),
        Err(e) => errors.push(e.to_string()),
    }

    if let Some(provenance) = &block.provenance {
        if provenance.manifest_checksum != manifest.checksum {
            errors.push(format!(
                "provenance describes checksum {} but manifest checksum is {}",
                provenance.manifest_checksum, manifest.checksum
            ));
        }
    }
    errors
}

#[cfg(test)]
#[path = "security_test.rs"]
mod tests;
