//! # Kestrel Memory
//!
//! Conversation memory for the agent runtime.
//!
//! [`MemoryManager`] owns every [`Session`] in the process. Two optional
//! backends hang off it:
//!
//! - a [`VectorStore`] plus embedding model, used to index messages and
//!   answer [`MemoryManager::search_memory`]
//! - a [`SessionStore`], used to persist sessions and restore them with
//!   [`MemoryManager::load_session`]
//!
//! Backend work runs in the background and its failures are logged; the
//! in-memory append or read always succeeds.

pub mod manager;
pub mod session;
pub mod store;
pub mod vector;

pub use manager::MemoryManager;
pub use session::Session;
pub use store::{FileSessionStore, InMemorySessionStore, SessionStore};
pub use vector::{InMemoryVectorStore, VectorEntry, VectorMatch, VectorStore, cosine_similarity};
