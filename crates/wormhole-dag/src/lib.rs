//! Wormhole DAG
//!
//! Content-addressed graph primitives shared by the retrieval transports.
//!
//! # Design
//!
//! Blocks are named by a [`ContentId`]: a codec plus the Blake3 hash of the
//! block bytes. `raw` blocks are opaque payload and always leaves. `dag`
//! blocks encode a [`DagNode`] whose links name further blocks, so a root ID
//! commits to the whole graph beneath it.
//!
//! Graphs may share subgraphs (two parents linking the same child), so
//! anything walking them must track visited IDs.

mod builder;
mod cid;
mod error;
mod node;
mod store;

pub use builder::{read_all, BuiltDag, DagBuilder, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_LINKS};
pub use cid::{Codec, ContentId};
pub use error::{Error, Result};
pub use node::{Block, DagNode};
pub use store::{Blockstore, FlatfsStore, MemoryStore};
