//! # Message Dispatcher
//!
//! Renders every message the session receives onto the console stream.
//!
//! When the topic-echo flag is set, a diagnostic copy of the payload is
//! assembled in a fixed scratch buffer of [`ECHO_CAPACITY`] bytes and written
//! first, terminated by a newline. The regular output follows: the payload
//! bytes, then the configured delimiter unless delimiters are disabled.
//! Payloads are written with their exact length; they need not be text.

use core::fmt::Write as _;

use embedded_io::Write;
use heapless::{String, Vec};

use crate::client::MessageHandler;
use crate::config::DisplayOptions;
use crate::fmt::warn;
use crate::packet::Publish;

/// Size of the echo scratch buffer, terminator included.
pub const ECHO_CAPACITY: usize = 100;

/// A payload too long for the echo scratch buffer.
///
/// The echo line is skipped; the regular output is still written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EchoOverflow {
    pub len: usize,
}

pub struct Dispatcher<'a, W> {
    console: W,
    display: DisplayOptions<'a>,
    topic_echo: bool,
    overflows: u32,
}

impl<'a, W: Write> Dispatcher<'a, W> {
    pub fn new(console: W, display: DisplayOptions<'a>) -> Self {
        Self {
            console,
            topic_echo: display.show_topics,
            display,
            overflows: 0,
        }
    }

    pub fn topic_echo(&self) -> bool {
        self.topic_echo
    }

    pub fn set_topic_echo(&mut self, enabled: bool) {
        self.topic_echo = enabled;
    }

    /// Number of payloads whose echo was skipped.
    pub fn overflows(&self) -> u32 {
        self.overflows
    }

    pub fn console(&mut self) -> &mut W {
        &mut self.console
    }

    pub fn release(self) -> W {
        self.console
    }

    /// Writes one payload to the console.
    ///
    /// Console write failures are ignored, there is nowhere to report them.
    pub fn dispatch(&mut self, payload: &[u8]) -> Result<(), EchoOverflow> {
        let echoed = if self.topic_echo {
            self.echo(payload)
        } else {
            Ok(())
        };

        let _ = self.console.write_all(payload);
        if !self.display.no_delimiter {
            let _ = self.console.write_all(self.display.delimiter.as_bytes());
        }
        echoed
    }

    fn echo(&mut self, payload: &[u8]) -> Result<(), EchoOverflow> {
        let mut scratch: Vec<u8, ECHO_CAPACITY> = Vec::new();
        if scratch.extend_from_slice(payload).is_err() || scratch.push(b'\n').is_err() {
            let overflow = EchoOverflow { len: payload.len() };
            self.overflows = self.overflows.saturating_add(1);
            warn!("{} byte payload does not fit the echo buffer", overflow.len);

            let mut notice: String<64> = String::new();
            if write!(notice, "Echo skipped: {} byte payload.\r\n", overflow.len).is_ok() {
                let _ = self.console.write_all(notice.as_bytes());
            }
            return Err(overflow);
        }
        let _ = self.console.write_all(&scratch);
        Ok(())
    }
}

impl<W: Write> MessageHandler for Dispatcher<'_, W> {
    fn on_message(&mut self, msg: &Publish<'_>) {
        // Overflows are counted and already reported on the console.
        let _ = self.dispatch(msg.payload);
    }
}
