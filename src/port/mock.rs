//! Scripted serial port for exercising the protocol engine without hardware.
//!
//! Replies are queued in order; each write pops the next one into the read
//! queue, mimicking a controller that answers every command line. Clones
//! share state, so a test can hand one clone to the engine and keep another
//! to inspect what was written.

use super::error::PortError;
use super::traits::{SerialPortAdapter, DEFAULT_BAUD_RATE};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockPortState {
    /// Bytes waiting to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// One entry per write; `None` means the device stays silent.
    replies: VecDeque<Option<Vec<u8>>>,
    /// Every write, in order.
    write_log: Vec<Vec<u8>>,
    /// Whether the next read/write should fail with a timeout.
    should_timeout: bool,
    timeout: Duration,
    baud_rate: u32,
    clear_count: usize,
}

/// Mock serial port implementation for testing.
///
/// # Example
/// ```
/// use feeder_tuner::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.queue_reply("ok\n");
///
/// port.write_bytes(b"M611 S1\n").unwrap();
/// let mut buffer = [0u8; 8];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"ok\n");
/// assert_eq!(port.written_lines(), vec!["M611 S1".to_string()]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockPortState>>,
}

impl MockSerialPort {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState {
                timeout: Duration::from_secs(1),
                baud_rate: DEFAULT_BAUD_RATE,
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockPortState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answer the next unanswered write with `reply`.
    pub fn queue_reply(&mut self, reply: impl AsRef<[u8]>) {
        self.state().replies.push_back(Some(reply.as_ref().to_vec()));
    }

    /// Leave the next unanswered write without a reply.
    pub fn queue_silence(&mut self) {
        self.state().replies.push_back(None);
    }

    /// Put bytes on the line immediately, independent of any write.
    pub fn enqueue_read(&mut self, data: &[u8]) {
        self.state().read_queue.extend(data);
    }

    /// Writes decoded as text with the line terminator stripped.
    pub fn written_lines(&self) -> Vec<String> {
        self.state()
            .write_log
            .iter()
            .map(|w| String::from_utf8_lossy(w).trim_end().to_string())
            .collect()
    }

    /// Set whether the next read/write operation should time out.
    pub fn set_should_timeout(&mut self, should_timeout: bool) {
        self.state().should_timeout = should_timeout;
    }

    /// How many times the buffers have been cleared.
    pub fn clear_count(&self) -> usize {
        self.state().clear_count
    }

    pub fn available_bytes(&self) -> usize {
        self.state().read_queue.len()
    }

    pub fn pending_replies(&self) -> usize {
        self.state().replies.len()
    }

    pub fn baud_rate(&self) -> u32 {
        self.state().baud_rate
    }

    /// Number of live clones of this port, including `self`.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.state)
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state();

        if state.should_timeout {
            state.should_timeout = false;
            return Err(PortError::timeout(state.timeout));
        }

        state.write_log.push(data.to_vec());
        if let Some(Some(reply)) = state.replies.pop_front() {
            state.read_queue.extend(reply);
        }

        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.state();

        if state.should_timeout {
            state.should_timeout = false;
            return Err(PortError::timeout(state.timeout));
        }

        let mut bytes_read = 0;
        for byte in buffer.iter_mut() {
            match state.read_queue.pop_front() {
                Some(queued) => {
                    *byte = queued;
                    bytes_read += 1;
                }
                None => break,
            }
        }

        if bytes_read == 0 {
            Err(PortError::Io(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "No data available",
            )))
        } else {
            Ok(bytes_read)
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.state().timeout = timeout;
        Ok(())
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), PortError> {
        self.state().baud_rate = baud_rate;
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<(), PortError> {
        let mut state = self.state();
        state.read_queue.clear();
        state.clear_count += 1;
        Ok(())
    }

    fn bytes_to_read(&self) -> Option<usize> {
        Some(self.available_bytes())
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .field("pending_replies", &self.pending_replies())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_follows_write() {
        let mut port = MockSerialPort::new("MOCK0");
        port.queue_reply("ok\n");
        assert_eq!(port.available_bytes(), 0);

        port.write_bytes(b"M602 N000\n").unwrap();
        assert_eq!(port.available_bytes(), 3);
    }

    #[test]
    fn test_silence_consumes_a_reply_slot() {
        let mut port = MockSerialPort::new("MOCK0");
        port.queue_silence();
        port.queue_reply("ok\n");

        port.write_bytes(b"M115\n").unwrap();
        assert_eq!(port.available_bytes(), 0);
        port.write_bytes(b"M611 S1\n").unwrap();
        assert_eq!(port.available_bytes(), 3);
    }

    #[test]
    fn test_empty_read_would_block() {
        let mut port = MockSerialPort::new("MOCK0");
        let mut buffer = [0u8; 10];
        match port.read_bytes(&mut buffer) {
            Err(e) => assert!(e.is_idle()),
            Ok(n) => panic!("expected WouldBlock, read {n} bytes"),
        }
    }

    #[test]
    fn test_clear_drops_stale_bytes() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(b"ok\n");
        port.clear_buffers().unwrap();
        assert_eq!(port.available_bytes(), 0);
        assert_eq!(port.clear_count(), 1);
    }

    #[test]
    fn test_timeout_simulation() {
        let mut port = MockSerialPort::new("MOCK0");
        port.set_timeout(Duration::from_millis(500)).unwrap();
        port.set_should_timeout(true);

        let mut buffer = [0u8; 10];
        assert!(matches!(port.read_bytes(&mut buffer), Err(PortError::Timeout(d)) if d == Duration::from_millis(500)));
    }

    #[test]
    fn test_clones_share_state() {
        let port = MockSerialPort::new("MOCK0");
        let mut engine_side = port.clone();
        assert_eq!(port.handle_count(), 2);

        engine_side.write_bytes(b"M115\n").unwrap();
        engine_side.set_baud_rate(57_600).unwrap();
        assert_eq!(port.written_lines(), vec!["M115".to_string()]);
        assert_eq!(port.baud_rate(), 57_600);

        drop(engine_side);
        assert_eq!(port.handle_count(), 1);
    }
}
