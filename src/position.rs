//! Last-applied upload position for a meeting, and the accept/reject decision
//! for an incoming batch.
//!
//! The gap rule is a cheap at-least-once delivery check: a batch must start
//! exactly one past the tracked serial. Anything further ahead means an
//! upload was lost and the hub has to resend from its last acknowledged
//! position; anything at or behind the tracked serial is a retransmission.

/// Decision for an incoming batch based on its starting serial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The batch continues the stream (or is the first write)
    Apply,
    /// The batch starts at or behind the tracked serial; no forward progress,
    /// but the content may still be re-applied idempotently
    DuplicateIgnore,
    /// A hole exists between the tracked serial and the batch start
    Gap,
}

/// `(last_serial, last_time)` high-water mark for one meeting
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub last_serial: Option<i64>,
    pub last_time: Option<f64>,
}

impl Position {
    /// Initial position for a meeting with existing history. No validation;
    /// used when reattaching after a gap in service or a server restart.
    pub fn seed(serial: i64, time: f64) -> Position {
        Position {
            last_serial: Some(serial),
            last_time: Some(time),
        }
    }

    /// Decide what to do with a batch whose first entry carries `start_serial`
    pub fn accept(&self, start_serial: i64) -> Decision {
        match self.last_serial {
            None => Decision::Apply,
            Some(last) if start_serial > last + 1 => Decision::Gap,
            Some(last) if start_serial <= last => Decision::DuplicateIgnore,
            Some(_) => Decision::Apply,
        }
    }

    /// Record forward progress after a successful apply.
    /// The high-water mark never moves backward.
    pub fn advance(&mut self, new_serial: i64, new_time: f64) {
        if let Some(last) = self.last_serial {
            assert!(
                new_serial >= last,
                "position rollback: {} -> {}",
                last,
                new_serial
            );
        }
        self.last_serial = Some(new_serial);
        self.last_time = Some(new_time);
    }
}
