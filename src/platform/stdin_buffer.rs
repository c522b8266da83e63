//! Splits raw stdin bytes into complete key sequences.
//!
//! Escape sequences may arrive split across reads. An incomplete tail stays
//! buffered until the next read completes it or the flush timeout passes, in
//! which case it is emitted verbatim (a lone ESC becomes the Escape key).

use std::time::{Duration, Instant};

const ESC: u8 = 0x1b;
const PASTE_START: &str = "\x1b[200~";
const PASTE_END: &str = "\x1b[201~";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinEvent {
    Data(String),
    Paste(String),
}

impl StdinEvent {
    /// Paste content is re-wrapped so the key decoder can recognize it.
    pub fn into_wire(self) -> String {
        match self {
            StdinEvent::Data(data) => data,
            StdinEvent::Paste(content) => format!("{PASTE_START}{content}{PASTE_END}"),
        }
    }
}

#[derive(Debug)]
pub struct StdinBuffer {
    buffer: String,
    timeout: Duration,
    paste: Option<String>,
    flush_deadline: Option<Instant>,
}

impl StdinBuffer {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            buffer: String::new(),
            timeout: Duration::from_millis(timeout_ms),
            paste: None,
            flush_deadline: None,
        }
    }

    pub fn process(&mut self, data: &[u8]) -> Vec<StdinEvent> {
        self.flush_deadline = None;
        self.buffer.push_str(&String::from_utf8_lossy(data));

        let mut events = Vec::new();
        loop {
            if let Some(paste) = self.paste.as_mut() {
                paste.push_str(&self.buffer);
                self.buffer.clear();
                let Some(end) = paste.find(PASTE_END) else {
                    return events;
                };
                let rest = paste[end + PASTE_END.len()..].to_string();
                paste.truncate(end);
                if let Some(content) = self.paste.take() {
                    events.push(StdinEvent::Paste(content));
                }
                self.buffer = rest;
                continue;
            }

            if let Some(start) = self.buffer.find(PASTE_START) {
                let before = self.buffer[..start].to_string();
                let (sequences, _) = split_sequences(&before);
                events.extend(sequences.into_iter().map(StdinEvent::Data));
                self.buffer = self.buffer[start + PASTE_START.len()..].to_string();
                self.paste = Some(String::new());
                continue;
            }

            let (sequences, remainder) = split_sequences(&self.buffer);
            events.extend(sequences.into_iter().map(StdinEvent::Data));
            self.buffer = remainder;
            if !self.buffer.is_empty() {
                self.flush_deadline = Some(Instant::now() + self.timeout);
            }
            return events;
        }
    }

    /// Emits a stale incomplete tail once its deadline passed.
    pub fn flush_due(&mut self, now: Instant) -> Vec<StdinEvent> {
        match self.flush_deadline {
            Some(deadline) if now >= deadline && !self.buffer.is_empty() => {
                self.flush_deadline = None;
                vec![StdinEvent::Data(std::mem::take(&mut self.buffer))]
            }
            _ => Vec::new(),
        }
    }

    /// Poll timeout that wakes up in time for the next flush.
    pub fn next_timeout_ms(&self, now: Instant, default_ms: i32) -> i32 {
        match self.flush_deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(now).as_millis();
                remaining.min(default_ms.max(0) as u128) as i32
            }
            None => default_ms,
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.paste = None;
        self.flush_deadline = None;
    }
}

/// Splits `data` into complete sequences plus an incomplete escape tail.
pub fn split_sequences(data: &str) -> (Vec<String>, String) {
    let bytes = data.as_bytes();
    let mut sequences = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] != ESC {
            let Some(ch) = data[pos..].chars().next() else {
                break;
            };
            sequences.push(ch.to_string());
            pos += ch.len_utf8();
            continue;
        }

        match escape_len(&bytes[pos..]) {
            Some(len) => {
                sequences.push(data[pos..pos + len].to_string());
                pos += len;
            }
            None => return (sequences, data[pos..].to_string()),
        }
    }

    (sequences, String::new())
}

/// Length of the escape sequence at the start of `bytes`, `None` if incomplete.
fn escape_len(bytes: &[u8]) -> Option<usize> {
    match bytes.get(1) {
        None => None,
        Some(b'[') => {
            // CSI: parameters then a final byte in 0x40..=0x7e.
            bytes[2..]
                .iter()
                .position(|b| (0x40..=0x7e).contains(b))
                .map(|index| index + 3)
        }
        Some(b'O') => bytes.get(2).map(|_| 3),
        Some(&ESC) => {
            // ESC ESC [ ... is alt plus a CSI sequence.
            if bytes.len() == 2 {
                return None;
            }
            escape_len(&bytes[1..]).map(|len| len + 1)
        }
        Some(_) => {
            // ESC + one character (alt+key).
            let rest = std::str::from_utf8(&bytes[1..]).ok()?;
            rest.chars().next().map(|ch| 1 + ch.len_utf8())
        }
    }
}
