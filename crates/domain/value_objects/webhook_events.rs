use uuid::Uuid;

/// Result of trying to take ownership of an external event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClaim {
    /// This caller owns the row and must finish it as completed or failed.
    Claimed { event_row_id: Uuid, attempt: i32 },
    AlreadyCompleted,
    InProgress,
}
