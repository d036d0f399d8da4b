#![forbid(unsafe_code)]

//! Tamper-evident preference codes: canonical JSON, per-path HMAC codes in two
//! trust domains, the nested code tree and its super code.

mod error;
mod integrity;
mod mac;
mod serialize;
mod store;
mod tree;
mod value;

pub use error::{PrefsError, PrefsResult};
pub use integrity::{
    current_value, recalculate, verify, MacCheck, MacSet, ProtectedPrefs, VerifyReport,
};
pub use mac::{MacCalculator, TrustDomain, REGISTRY_SEED};
pub use serialize::serialize_for_mac;
pub use store::{FileMacStore, MacStore, RegistryMacStore};
pub use tree::{build_tree, flatten, MacNode, MacTree};
pub use value::{canonicalize, lookup, set_path, PrefValue};

/// `compute_code` with an explicit seed, for one-off calculations.
pub fn compute_code(
    seed: &[u8],
    device_id: &str,
    path: &str,
    value: &PrefValue,
) -> PrefsResult<String> {
    let calc = MacCalculator::new(&TrustDomain::new("adhoc", seed), device_id)?;
    Ok(calc.compute_code(path, value))
}

/// Super code over a whole code tree, with an explicit seed.
pub fn compute_super_code(seed: &[u8], device_id: &str, tree: &MacTree) -> PrefsResult<String> {
    let calc = MacCalculator::new(&TrustDomain::new("adhoc", seed), device_id)?;
    Ok(calc.compute_super_code(&tree.to_value()))
}
