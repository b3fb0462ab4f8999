//! Host-based tests for the telegraph core.
//!
//! The mocks from `telegraph_core::hal::mock` plus the capture sink here
//! let a complete two-core terminal run deterministically on the host:
//! no sockets, no alarms, explicit time.

use telegraph_core::runtime::StatusSink;
use telegraph_core::CodeTable;

#[cfg(test)]
mod end_to_end_tests;
#[cfg(test)]
mod pool_property_tests;
#[cfg(test)]
mod wire_session_tests;

/// Presentation sink recording everything it is told
#[derive(Default)]
pub struct CaptureSink {
    pub text: String,
    pub connections: Vec<bool>,
    pub senders: Vec<String>,
    pub speeds: Vec<(u8, u8)>,
    pub tables: Vec<CodeTable>,
    pub local_code: Vec<Vec<i32>>,
}

impl StatusSink for CaptureSink {
    fn decoded_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn connection(&mut self, connected: bool) {
        self.connections.push(connected);
    }

    fn current_sender(&mut self, id: &str) {
        self.senders.push(id.to_string());
    }

    fn speed(&mut self, text_wpm: u8, char_wpm: u8) {
        self.speeds.push((text_wpm, char_wpm));
    }

    fn table(&mut self, table: CodeTable) {
        self.tables.push(table);
    }

    fn local_code(&mut self, code: &[i32]) {
        self.local_code.push(code.to_vec());
    }
}
