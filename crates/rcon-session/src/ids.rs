//! Command id allocation.

use rcon_protocol::MAX_COMMAND_ID;

/// Hands out command ids `1, 2, …, 80, 1, 2, …`.
///
/// Ids are not unique across in-flight commands. Responses are matched by
/// submission order, so the id only has to stay out of the reserved range.
#[derive(Debug, Clone, Default)]
pub struct CommandIds {
    last: i32,
}

impl CommandIds {
    /// Creates a counter whose first id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next id, wrapping back to 1 after the maximum.
    pub fn next_id(&mut self) -> i32 {
        self.last = if self.last >= MAX_COMMAND_ID {
            1
        } else {
            self.last + 1
        };
        self.last
    }

    /// Restarts the sequence. Called on every new connection.
    pub fn reset(&mut self) {
        self.last = 0;
    }
}
