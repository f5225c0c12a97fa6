// Wire names understood by downstream clients and by the node.

// client → relay
pub const REGISTER_ACCOUNT: &str = "register_account";
pub const UNREGISTER_ACCOUNT: &str = "unregister_account";
pub const LISTEN_ALL: &str = "listen_all";
pub const UNLISTEN_ALL: &str = "unlisten_all";

// relay → node
pub const SUBSCRIBE: &str = "subscribe";
pub const UPDATE: &str = "update";

// relay → client
pub const IS_FILTERED: &str = "is_filtered";
