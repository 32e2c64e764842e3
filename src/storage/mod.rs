pub mod errors;
pub mod implementations;
pub mod traits;

pub use errors::*;
pub use traits::*;
pub use implementations::file_storage::FileStorage;
pub use implementations::in_memory::InMemoryStorage;

/// Namespaces the handlers write into
pub mod namespaces {
    pub const ACCOUNTS: &str = "accounts";
    pub const PROPOSALS: &str = "proposals";
    /// Keyed `<proposal id>/<log id>`
    pub const VOTES: &str = "votes";
    /// Keyed `<proposal id>/<event id>`
    pub const PROPOSAL_EVENTS: &str = "proposal_events";
    pub const GOVERNOR_LOGS: &str = "governor_logs";
    /// Cursor and processed-event markers
    pub const INDEXER: &str = "indexer";
}
