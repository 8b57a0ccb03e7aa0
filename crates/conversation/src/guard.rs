use uuid::Uuid;

/// Captured by every async continuation when it starts; compared against the
/// guard before the continuation may touch state. The generation makes a
/// ticket from an earlier visit to the same attempt stale as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTicket {
    attempt_id: Uuid,
    generation: u64,
}

impl AttemptTicket {
    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }
}

#[derive(Debug, Default)]
pub struct AttemptGuard {
    current: Option<AttemptTicket>,
    generation: u64,
}

impl AttemptGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `attempt_id` current and invalidates every outstanding ticket.
    pub fn begin(&mut self, attempt_id: Uuid) -> AttemptTicket {
        self.generation += 1;
        let ticket = AttemptTicket {
            attempt_id,
            generation: self.generation,
        };
        self.current = Some(ticket);
        ticket
    }

    /// Invalidates every outstanding ticket without selecting a new attempt.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.current = None;
    }

    pub fn current(&self) -> Option<AttemptTicket> {
        self.current
    }

    pub fn current_attempt(&self) -> Option<Uuid> {
        self.current.map(|ticket| ticket.attempt_id)
    }

    pub fn is_current(&self, ticket: &AttemptTicket) -> bool {
        self.current.as_ref() == Some(ticket)
    }
}
