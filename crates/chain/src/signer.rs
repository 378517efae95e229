//! Account signers.
//!
//! Maps each configured account role to a local private-key signer. Keys are
//! parsed once at startup; addresses are derived from them, never configured
//! separately.

use crate::access::{AccountRole, ChainError, ChainResult};
use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use std::collections::BTreeMap;
use tracing::info;

/// Signing keys indexed by account role.
#[derive(Clone, Default)]
pub struct AccountSigners {
    signers: BTreeMap<AccountRole, PrivateKeySigner>,
}

impl AccountSigners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a private key (with or without `0x` prefix) for `role`.
    pub fn insert(&mut self, role: AccountRole, private_key: &str) -> ChainResult<Address> {
        let key_str = private_key.trim().trim_start_matches("0x");
        let signer: PrivateKeySigner = key_str.parse().map_err(|e| ChainError::Signer {
            role: role.to_string(),
            reason: format!("{e}"),
        })?;
        let address = signer.address();
        info!(role = %role, address = %address, "Registered account signer");
        self.signers.insert(role, signer);
        Ok(address)
    }

    /// Builder-style [`AccountSigners::insert`].
    pub fn with_key(mut self, role: AccountRole, private_key: &str) -> ChainResult<Self> {
        self.insert(role, private_key)?;
        Ok(self)
    }

    /// Address of the signer bound to `role`.
    pub fn address_of(&self, role: &AccountRole) -> ChainResult<Address> {
        self.signers
            .get(role)
            .map(|s| s.address())
            .ok_or_else(|| ChainError::UnknownAccount(role.to_string()))
    }

    /// Wallet that signs for `role`.
    pub fn wallet(&self, role: &AccountRole) -> ChainResult<EthereumWallet> {
        self.signers
            .get(role)
            .cloned()
            .map(EthereumWallet::from)
            .ok_or_else(|| ChainError::UnknownAccount(role.to_string()))
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }
}

impl std::fmt::Debug for AccountSigners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.signers.iter().map(|(role, s)| (role, s.address())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (DO NOT USE IN PRODUCTION)
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_address_derived_from_key() {
        let signers = AccountSigners::new()
            .with_key(AccountRole::new("main"), DEV_KEY)
            .unwrap();

        let address = signers.address_of(&AccountRole::new("main")).unwrap();
        assert_eq!(
            format!("{address:?}").to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(signers.len(), 1);
    }

    #[test]
    fn test_key_without_prefix_accepted() {
        let mut signers = AccountSigners::new();
        let with = signers.insert(AccountRole::new("a"), DEV_KEY).unwrap();
        let without = signers
            .insert(AccountRole::new("b"), DEV_KEY.trim_start_matches("0x"))
            .unwrap();
        assert_eq!(with, without);
    }

    #[test]
    fn test_unknown_role_and_bad_key() {
        let mut signers = AccountSigners::new();
        assert!(matches!(
            signers.address_of(&AccountRole::new("nobody")),
            Err(ChainError::UnknownAccount(_))
        ));
        assert!(matches!(
            signers.insert(AccountRole::new("main"), "not-a-key"),
            Err(ChainError::Signer { .. })
        ));
    }

    #[test]
    fn test_debug_hides_keys() {
        let signers = AccountSigners::new()
            .with_key(AccountRole::new("main"), DEV_KEY)
            .unwrap();
        let rendered = format!("{signers:?}");
        assert!(!rendered.contains("ac0974bec39a17e3"));
        assert!(rendered.contains("main"));
    }
}
