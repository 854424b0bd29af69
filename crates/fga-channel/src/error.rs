//! Errors surfaced by slot acquisition, enqueue and the producer wait.

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The free list was empty at acquire time.
    #[error("no free slot available")]
    NoFreeSlot,
    /// The ring was at `capacity - 1` entries at enqueue time.
    #[error("ring queue is full")]
    QueueFull,
    /// The producer's wait was interrupted by a cancellation or shutdown
    /// signal before the consumer signaled completion. The slot has already
    /// been released back to the free list.
    #[error("producer wait cancelled")]
    Cancelled,
    /// The producer's wait exceeded its deadline without a signal.
    #[error("producer wait timed out")]
    TimedOut,
}
