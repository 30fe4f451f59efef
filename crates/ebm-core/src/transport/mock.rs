//! Mock frame transport for testing.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use super::traits::{FrameTransport, TransportError};
use super::MacAddr;

#[derive(Default)]
struct MockState {
    rx_queue: VecDeque<Vec<u8>>,
    sent: Vec<(MacAddr, Vec<u8>)>,
    read_deadline: Option<Duration>,
    closed: bool,
}

/// Mock transport for unit testing engine logic.
///
/// Frames queued with [`push_frame`](Self::push_frame) are handed out by
/// `recv`; an empty queue behaves like a quiet wire, so a `recv` under a
/// read deadline fails with `Timeout` and one without a deadline blocks
/// until a frame arrives or the mock is closed.
pub struct MockTransport {
    state: Mutex<MockState>,
    wakeup: Condvar,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            wakeup: Condvar::new(),
        }
    }

    /// Queue a frame to be returned by a future `recv`.
    pub fn push_frame(&self, frame: &[u8]) {
        self.state.lock().unwrap().rx_queue.push_back(frame.to_vec());
        self.wakeup.notify_all();
    }

    /// Tear the transport down; blocked and future calls fail with `Closed`.
    pub fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.wakeup.notify_all();
    }

    /// All frames sent so far, with their destinations.
    pub fn sent(&self) -> Vec<(MacAddr, Vec<u8>)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTransport for MockTransport {
    fn send_to(&self, frame: &[u8], dest: MacAddr) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.sent.push((dest, frame.to_vec()));
        Ok(())
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(frame) = state.rx_queue.pop_front() {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                return Ok(n);
            }
            if state.closed {
                return Err(TransportError::Closed);
            }
            // A quiet wire: expire the deadline without waiting for wall
            // time so engine retry loops can be tested quickly.
            if state.read_deadline.is_some() {
                return Err(TransportError::Timeout);
            }
            state = self.wakeup.wait(state).unwrap();
        }
    }

    fn set_read_deadline(&self, timeout: Option<Duration>) -> Result<(), TransportError> {
        self.state.lock().unwrap().read_deadline = timeout;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_capture() {
        let mock = MockTransport::new();
        let dest = MacAddr([0xde, 0x21, 0x65, 1, 2, 3]);
        mock.send_to(b"hello", dest).unwrap();
        mock.send_to(b"world", dest).unwrap();
        assert_eq!(mock.sent_count(), 2);
        assert_eq!(mock.sent()[0], (dest, b"hello".to_vec()));
    }

    #[test]
    fn test_recv_queue_and_timeout() {
        let mock = MockTransport::new();
        mock.set_read_deadline(Some(Duration::from_secs(1))).unwrap();
        mock.push_frame(b"frame");
        let mut buf = [0u8; 16];
        assert_eq!(mock.recv(&mut buf).unwrap(), 5);
        assert_eq!(&buf[..5], b"frame");
        assert!(matches!(mock.recv(&mut buf), Err(TransportError::Timeout)));
    }

    #[test]
    fn test_close_unblocks_recv() {
        use std::sync::Arc;
        use std::thread;

        let mock = Arc::new(MockTransport::new());
        let reader = {
            let mock = Arc::clone(&mock);
            thread::spawn(move || {
                let mut buf = [0u8; 16];
                mock.recv(&mut buf)
            })
        };
        thread::sleep(Duration::from_millis(20));
        mock.close();
        assert!(matches!(reader.join().unwrap(), Err(TransportError::Closed)));
    }
}
