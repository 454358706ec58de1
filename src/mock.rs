// Scripted channel and fake clock for tests

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::bpl::{Channel, Clock};

#[derive(Default)]
struct MockState {
    reads: VecDeque<io::Result<Vec<u8>>>,
    writes: Vec<Vec<u8>>,
    fail_writes: bool,
    released: usize,
}

/// Channel half handed to the code under test
pub struct MockChannel {
    state: Rc<RefCell<MockState>>,
}

/// Test-side handle to inspect and script the channel
#[derive(Clone)]
pub struct MockLink {
    state: Rc<RefCell<MockState>>,
}

impl MockChannel {
    pub fn new() -> (MockChannel, MockLink) {
        let state = Rc::new(RefCell::new(MockState::default()));
        (
            MockChannel {
                state: state.clone(),
            },
            MockLink { state },
        )
    }
}

impl Channel for MockChannel {
    fn read(&mut self) -> io::Result<Vec<u8>> {
        self.state
            .borrow_mut()
            .reads
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        state.writes.push(bytes.to_vec());
        Ok(())
    }
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        self.state.borrow_mut().released += 1;
    }
}

impl MockLink {
    pub fn queue_read(&self, bytes: Vec<u8>) {
        self.state.borrow_mut().reads.push_back(Ok(bytes));
    }

    pub fn queue_read_error(&self, kind: io::ErrorKind) {
        self.state
            .borrow_mut()
            .reads
            .push_back(Err(io::Error::new(kind, "mock read failure")));
    }

    pub fn fail_writes(&self) {
        self.state.borrow_mut().fail_writes = true;
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.borrow().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.borrow_mut().writes.clear();
    }

    pub fn released(&self) -> usize {
        self.state.borrow().released
    }
}

/// Clock that only moves when something sleeps on it
pub struct FakeClock {
    start: Instant,
    now: Cell<Instant>,
}

impl FakeClock {
    pub fn new() -> Self {
        let start = Instant::now();
        Self {
            start,
            now: Cell::new(start),
        }
    }

    /// Total time slept so far
    pub fn elapsed(&self) -> Duration {
        self.now.get() - self.start
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}
