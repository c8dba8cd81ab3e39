//! Shared test doubles.

use core::convert::Infallible;
use std::string::String;
use std::vec::Vec;

/// An in-memory console stream.
#[derive(Default)]
pub struct TestConsole {
    pub out: Vec<u8>,
}

impl TestConsole {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.out).into_owned()
    }
}

impl embedded_io::ErrorType for TestConsole {
    type Error = Infallible;
}

impl embedded_io::Write for TestConsole {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
