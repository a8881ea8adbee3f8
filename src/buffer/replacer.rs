use crate::common::FrameId;

/// Eviction policy consulted by the buffer pool.
///
/// A frame is a member of the replacer exactly while it is eligible for
/// eviction, i.e. while nobody holds it pinned. Implementations must be safe
/// to call from many threads and must never call back into the buffer pool.
pub trait Replacer: Send + Sync {
    /// Marks `frame_id` as the most recently unpinned candidate. Re-inserting
    /// a tracked frame moves it to the most-recent position.
    fn insert(&self, frame_id: FrameId);

    /// Removes and returns the frame the policy wants to evict next.
    fn victim(&self) -> Option<FrameId>;

    /// Stops tracking `frame_id` (it was pinned again). Returns whether it was present.
    fn erase(&self, frame_id: FrameId) -> bool;

    /// Number of eviction-eligible frames.
    fn size(&self) -> usize;
}
