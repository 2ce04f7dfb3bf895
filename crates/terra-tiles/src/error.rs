//! Error types for the surface tile system.

/// Failures reported by archive-side collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The named archive, table of contents or capability table does not exist.
    #[error("archive not found: {name}")]
    Missing {
        /// Archive or file name.
        name: String,
    },

    /// The archive exists but its contents could not be interpreted.
    #[error("malformed archive {name}: {reason}")]
    Malformed {
        /// Archive or file name.
        name: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Reading a single block failed.
    #[error("failed to read {name} at offset {offset}: {source}")]
    Read {
        /// Archive name.
        name: String,
        /// Byte offset of the block.
        offset: u64,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the tile core itself.
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    /// The node pool reached its configured capacity.
    #[error("tile node pool exhausted ({capacity} nodes)")]
    PoolExhausted {
        /// Maximum number of live nodes.
        capacity: usize,
    },

    /// The node id does not refer to a live node.
    #[error("unknown tile node {0:?}")]
    UnknownNode(crate::node::NodeId),

    /// The background loader thread could not be started.
    #[error("failed to spawn tile loader thread: {0}")]
    LoaderSpawn(#[source] std::io::Error),
}
