//! Key namespaces for wallet state inside the ledger KV store.

/// Root namespace storing general wallet metadata entries.
pub const META_NAMESPACE: &[u8] = b"wallet/meta/";
/// Namespace for address book entries, keyed by address bytes.
pub const ADDRESSES_NAMESPACE: &[u8] = b"wallet/addresses/";
/// Namespace for unspent outputs owned by the wallet, keyed by output id.
pub const UTXOS_NAMESPACE: &[u8] = b"wallet/utxos/";
/// Namespace for confirmed history entries, keyed by transaction id.
pub const HISTORY_NAMESPACE: &[u8] = b"wallet/history/";
/// Secondary index: height (BE) | block position (BE) | txid.
pub const HISTORY_BY_HEIGHT_NAMESPACE: &[u8] = b"wallet/history_height/";
/// Secondary index: address | height (BE) | block position (BE) | txid.
pub const HISTORY_BY_ADDRESS_NAMESPACE: &[u8] = b"wallet/history_address/";
/// Namespace for file contract revisions: contract id | revision number (BE).
pub const CONTRACTS_NAMESPACE: &[u8] = b"wallet/contracts/";
/// Namespace for block rewards: block height (BE) | output id.
pub const REWARDS_NAMESPACE: &[u8] = b"wallet/rewards/";
/// Namespace for unconfirmed transactions, keyed by transaction id.
pub const LIMBO_NAMESPACE: &[u8] = b"wallet/limbo/";
/// Namespace for local transaction memos.
pub const MEMOS_NAMESPACE: &[u8] = b"wallet/memos/";

/// Metadata entry storing the consensus cursor and chain height.
pub const META_CHAIN_STATE_KEY: &str = "chain_state";
/// Metadata entry storing the wallet kind fixed at creation.
pub const META_WALLET_KIND_KEY: &str = "wallet_kind";
/// Metadata entry storing the next unused seed derivation index.
pub const META_SEED_INDEX_KEY: &str = "seed_index";

/// Storage key carrying the schema version marker for the wallet layout.
pub const SCHEMA_VERSION_KEY: &[u8] = b"wallet/schema_version";

/// Current on-disk schema version supported by the wallet store.
pub const SCHEMA_VERSION_V1: u32 = 1;
pub const SCHEMA_VERSION_LATEST: u32 = SCHEMA_VERSION_V1;

/// Namespaces derived purely from chain data. Clearing them, together with
/// the chain state entry, forces a rescan from the beginning of the chain.
pub const CHAIN_DERIVED_NAMESPACES: &[&[u8]] = &[
    UTXOS_NAMESPACE,
    HISTORY_NAMESPACE,
    HISTORY_BY_HEIGHT_NAMESPACE,
    HISTORY_BY_ADDRESS_NAMESPACE,
    CONTRACTS_NAMESPACE,
    REWARDS_NAMESPACE,
];
