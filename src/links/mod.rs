//! AWS recon links built on the pipeline.

pub mod access_key;
pub mod key_scanner;
pub mod known_account;

pub use access_key::{AccessKeyToAccountId, account_id_from_access_key};
pub use key_scanner::{
    ResourceKeyScanner, SCANNED_RESOURCE_TYPES, find_access_keys, key_scan_registry,
};
pub use known_account::{CANARY_TOKEN_ACCOUNTS, KnownAccountId, builtin_known_accounts};
