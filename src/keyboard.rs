// Operator key input: raw terminal via crossterm, or any byte stream

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// How often the terminal source checks the shutdown flag while idle
const KEY_POLL_INTERVAL: Duration = Duration::from_millis(50);

const ESC: u8 = 0x1B;
const CTRL_C: u8 = 0x03;

/// One discrete key-event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Char(char),
    /// Ctrl+C or an interrupt signal
    Interrupt,
    /// Any key without a binding
    Other,
}

impl Key {
    /// Decode one key from its terminal byte sequence.
    ///
    /// Arrow keys arrive as `ESC [ A|B|C|D`, everything else as one byte.
    pub fn parse(bytes: &[u8]) -> Option<Key> {
        let key = match bytes {
            [] => return None,
            [ESC, b'[', b'A'] => Key::Up,
            [ESC, b'[', b'B'] => Key::Down,
            [ESC, b'[', b'C'] => Key::Right,
            [ESC, b'[', b'D'] => Key::Left,
            [CTRL_C] => Key::Interrupt,
            [b] if b.is_ascii() && *b != ESC => Key::Char(*b as char),
            _ => Key::Other,
        };
        Some(key)
    }
}

/// Finite stream of key-events. `None` means the input is exhausted.
pub trait KeySource {
    fn next_key(&mut self) -> io::Result<Option<Key>>;

    /// Line terminator for status output while this source is active
    fn line_ending(&self) -> &'static str {
        "\n"
    }
}

impl<S: KeySource + ?Sized> KeySource for Box<S> {
    fn next_key(&mut self) -> io::Result<Option<Key>> {
        (**self).next_key()
    }

    fn line_ending(&self) -> &'static str {
        (**self).line_ending()
    }
}

/// Interactive keyboard in raw mode. Raw mode is restored on drop.
pub struct TerminalKeys {
    shutdown: Arc<AtomicBool>,
}

impl TerminalKeys {
    pub fn new(shutdown: Arc<AtomicBool>) -> io::Result<Self> {
        enable_raw_mode()?;
        debug!("Terminal raw mode enabled");
        Ok(Self { shutdown })
    }
}

impl KeySource for TerminalKeys {
    fn next_key(&mut self) -> io::Result<Option<Key>> {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(Some(Key::Interrupt));
            }
            if !event::poll(KEY_POLL_INTERVAL)? {
                continue;
            }

            if let Event::Key(KeyEvent {
                code,
                modifiers,
                kind,
                ..
            }) = event::read()?
            {
                if kind == KeyEventKind::Release {
                    continue;
                }

                let key = match code {
                    KeyCode::Up => Key::Up,
                    KeyCode::Down => Key::Down,
                    KeyCode::Left => Key::Left,
                    KeyCode::Right => Key::Right,
                    KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                        Key::Interrupt
                    }
                    KeyCode::Char(c) => Key::Char(c),
                    _ => Key::Other,
                };
                return Ok(Some(key));
            }
        }
    }

    fn line_ending(&self) -> &'static str {
        // Raw mode does not translate \n
        "\r\n"
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to restore terminal mode: {}", e);
        }
    }
}

/// Keys read from a byte stream, e.g. a piped script on stdin
pub struct ByteKeys<R: Read> {
    input: R,
    shutdown: Option<Arc<AtomicBool>>,
}

impl<R: Read> ByteKeys<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            shutdown: None,
        }
    }

    /// Like `new`, but yields `Key::Interrupt` once `shutdown` is set.
    ///
    /// The flag is checked between reads only; a read blocked on an idle
    /// stream is not woken by it.
    pub fn with_shutdown(input: R, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            input,
            shutdown: Some(shutdown),
        }
    }

    fn interrupted(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.input.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R: Read> KeySource for ByteKeys<R> {
    fn next_key(&mut self) -> io::Result<Option<Key>> {
        if self.interrupted() {
            return Ok(Some(Key::Interrupt));
        }
        let Some(first) = self.read_byte()? else {
            return Ok(None);
        };
        // The signal may have landed while the read was blocked
        if self.interrupted() {
            return Ok(Some(Key::Interrupt));
        }

        let mut sequence = vec![first];
        if first == ESC {
            for _ in 0..2 {
                match self.read_byte()? {
                    Some(b) => sequence.push(b),
                    None => break,
                }
            }
        }
        Ok(Key::parse(&sequence))
    }
}
