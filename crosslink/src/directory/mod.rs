//! Directory of entities living on other nodes.
//!
//! Directed messages resolve recipients here before falling back to a
//! network lookup. The cache is fed by full listings (requested when this
//! node subscribes and answered by every peer), by join and leave
//! announcements, by positive lookup responses and by inbound directed
//! messages.

mod cache;
mod sync;

pub use cache::{DirectoryCache, DirectoryEntry};
pub use sync::DirectorySync;
