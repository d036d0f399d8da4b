#![forbid(unsafe_code)]

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::prefs::error::{PrefsError, PrefsResult};
use crate::prefs::serialize::serialize_for_mac;
use crate::prefs::value::{canonicalize, PrefValue};

type HmacSha256 = Hmac<Sha256>;

/// Seed the browser uses for the registry copy of the codes.
pub const REGISTRY_SEED: &str = "ChromeRegistryHashStoreValidationSeed";

/// One place codes are stored, together with the HMAC seed it uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustDomain {
    name: String,
    seed: Vec<u8>,
}

impl TrustDomain {
    pub fn new(name: impl Into<String>, seed: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            seed: seed.into(),
        }
    }

    /// The preferences file domain (empty seed by default).
    pub fn file(seed: impl Into<Vec<u8>>) -> Self {
        Self::new("file", seed)
    }

    pub fn registry(seed: impl Into<Vec<u8>>) -> Self {
        Self::new("registry", seed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn seed(&self) -> &[u8] {
        &self.seed
    }
}

/// Computes integrity codes for one trust domain and device.
#[derive(Clone)]
pub struct MacCalculator {
    domain: String,
    device_id: String,
    keyed: HmacSha256,
}

impl std::fmt::Debug for MacCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacCalculator")
            .field("domain", &self.domain)
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

impl MacCalculator {
    pub fn new(domain: &TrustDomain, device_id: impl Into<String>) -> PrefsResult<Self> {
        let keyed = HmacSha256::new_from_slice(domain.seed())
            .map_err(|e| PrefsError::Key(e.to_string()))?;
        Ok(Self {
            domain: domain.name().to_owned(),
            device_id: device_id.into(),
            keyed,
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// `HMAC(seed, device_id || path || serialize(canonicalize(value)))`,
    /// uppercase hex.
    pub fn compute_code(&self, path: &str, value: &PrefValue) -> String {
        let mut mac = self.keyed.clone();
        mac.update(self.device_id.as_bytes());
        mac.update(path.as_bytes());
        mac.update(serialize_for_mac(&canonicalize(value)).as_bytes());
        hex::encode_upper(mac.finalize().into_bytes())
    }

    /// Code over the whole code tree, with an empty path.
    pub fn compute_super_code(&self, tree: &PrefValue) -> String {
        self.compute_code("", tree)
    }

    pub fn matches(&self, path: &str, value: &PrefValue, code: &str) -> bool {
        self.compute_code(path, value).eq_ignore_ascii_case(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_uppercase_hex_sha256() {
        let calc = MacCalculator::new(&TrustDomain::file(""), "device").unwrap();
        let code = calc.compute_code("a.b", &PrefValue::Bool(true));
        assert_eq!(code.len(), 64);
        assert!(code.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert!(calc.matches("a.b", &PrefValue::Bool(true), &code.to_lowercase()));
        assert!(!calc.matches("a.b", &PrefValue::Bool(false), &code));
    }

    #[test]
    fn domains_disagree_on_codes() {
        let file = MacCalculator::new(&TrustDomain::file(""), "device").unwrap();
        let reg = MacCalculator::new(&TrustDomain::registry(REGISTRY_SEED), "device").unwrap();
        let v = PrefValue::Int(1);
        assert_ne!(file.compute_code("p", &v), reg.compute_code("p", &v));
        assert_eq!(reg.domain(), "registry");
    }
}
