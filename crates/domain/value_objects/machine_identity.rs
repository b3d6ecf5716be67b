use anyhow::{Result, anyhow, bail};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// One-way keyed hash of a device fingerprint. The raw fingerprint is never
/// stored or logged; only the hex digest leaves this type.
#[derive(Clone)]
pub struct MachineHasher {
    mac: HmacSha256,
}

impl MachineHasher {
    pub fn new(secret: &str) -> Result<Self> {
        if secret.trim().is_empty() {
            bail!("machine hash secret must not be empty");
        }

        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|err| anyhow!("invalid machine hash secret: {err}"))?;

        Ok(Self { mac })
    }

    pub fn hash(&self, fingerprint: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(fingerprint.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for MachineHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineHasher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_hex_sha256() {
        let hasher = MachineHasher::new("server-secret").unwrap();

        let first = hasher.hash("cpu:1234|disk:abcd");
        let second = hasher.hash("cpu:1234|disk:abcd");

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!first.contains("cpu"));
    }

    #[test]
    fn different_fingerprints_or_secrets_differ() {
        let a = MachineHasher::new("secret-a").unwrap();
        let b = MachineHasher::new("secret-b").unwrap();

        assert_ne!(a.hash("device-1"), a.hash("device-2"));
        assert_ne!(a.hash("device-1"), b.hash("device-1"));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(MachineHasher::new("   ").is_err());
    }
}
