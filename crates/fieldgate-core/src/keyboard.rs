//! HID boot-keyboard report decoding.
//!
//! Boot-protocol keyboard report layout (8 bytes):
//!
//! ```text
//! Byte 0:   Modifier keys (bitfield; 0x02 = Left Shift, 0x20 = Right Shift)
//! Byte 1:   Reserved (0x00)
//! Byte 2-7: Up to 6 simultaneously pressed key codes
//! ```
//!
//! Vendors frame this payload in several ways over BLE: bare 8 bytes, a
//! report-ID prefix byte (9 bytes), or padded/vendor formats where the boot
//! report sits at some offset. [`extract_boot_report`] recovers the 8-byte
//! window from all of these.
//!
//! Decoding is edge-triggered: the held-key set is replaced wholesale on
//! every report, and only key codes newly present emit a character, so a
//! key held across identical consecutive reports never repeats.

use std::collections::VecDeque;

/// Boot report size in bytes.
pub const BOOT_REPORT_SIZE: usize = 8;

/// Maximum characters retained in the decoded text buffer.
pub const TEXT_BUFFER_CAP: usize = 256;

/// Shift modifier bits (left 0x02, right 0x20).
const SHIFT_MASK: u8 = 0x22;

/// Key code for backspace.
const KEY_BACKSPACE: u8 = 42;

/// A parsed boot-protocol keyboard report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootReport {
    /// Modifier key bitfield.
    pub modifier: u8,
    /// Up to 6 simultaneously pressed key codes.
    pub keycodes: [u8; 6],
}

impl BootReport {
    /// Whether a shift modifier is active.
    pub fn shifted(&self) -> bool {
        self.modifier & SHIFT_MASK != 0
    }
}

/// Recover the 8-byte boot report window from a raw notification payload.
///
/// - exactly 8 bytes: used as-is
/// - exactly 9 bytes: the leading report-ID byte is dropped
/// - longer: every 8-byte window is scanned for one whose reserved byte
///   (index 1) is zero and which either carries a key code or sits at a
///   buffer edge; failing that, the last 8 bytes are used
///
/// The window scan is a recovery heuristic for vendor encodings and can
/// pick the wrong window when every candidate has a non-zero reserved
/// byte; it is deliberately not stricter than that.
pub fn extract_boot_report(data: &[u8]) -> Option<BootReport> {
    let window: &[u8] = match data.len() {
        0..BOOT_REPORT_SIZE => return None,
        BOOT_REPORT_SIZE => data,
        9 => &data[1..],
        n => {
            let last = n - BOOT_REPORT_SIZE;
            let mut found = &data[last..];
            for i in 0..=last {
                let w = &data[i..i + BOOT_REPORT_SIZE];
                let has_key = w[2..].iter().any(|&b| b != 0);
                if w[1] == 0 && (has_key || i == 0 || i == last) {
                    found = w;
                    break;
                }
            }
            found
        }
    };

    let mut keycodes = [0u8; 6];
    keycodes.copy_from_slice(&window[2..8]);
    Some(BootReport {
        modifier: window[0],
        keycodes,
    })
}

/// Translate a key code into a character, honoring shift.
///
/// Returns `None` for unmapped codes and for non-printing keys
/// (backspace is handled separately by the decoder).
pub fn keycode_to_char(code: u8, shifted: bool) -> Option<char> {
    match code {
        // Letters a-z.
        4..=29 => {
            let base = b'a' + (code - 4);
            Some(if shifted {
                base.to_ascii_uppercase() as char
            } else {
                base as char
            })
        }
        // Digit row, with shifted symbols.
        30..=39 => {
            let idx = (code - 30) as usize;
            let plain = b"1234567890";
            let shift = b"!@#$%^&*()";
            Some(if shifted { shift[idx] } else { plain[idx] } as char)
        }
        40 => Some('\n'),
        43 => Some('\t'),
        44 => Some(' '),
        45 => Some(if shifted { '_' } else { '-' }),
        46 => Some(if shifted { '+' } else { '=' }),
        47 => Some(if shifted { '{' } else { '[' }),
        48 => Some(if shifted { '}' } else { ']' }),
        49 => Some(if shifted { '|' } else { '\\' }),
        51 => Some(if shifted { ':' } else { ';' }),
        52 => Some(if shifted { '"' } else { '\'' }),
        53 => Some(if shifted { '~' } else { '`' }),
        54 => Some(if shifted { '<' } else { ',' }),
        55 => Some(if shifted { '>' } else { '.' }),
        56 => Some(if shifted { '?' } else { '/' }),
        _ => None,
    }
}

/// Decoder state: the bounded text buffer and the previously held keys.
#[derive(Debug, Default)]
pub struct KeyboardState {
    text: VecDeque<char>,
    held: [u8; 6],
}

impl KeyboardState {
    /// Create an empty decoder state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one raw notification payload.
    ///
    /// Malformed payloads (shorter than a boot report) are ignored.
    pub fn feed(&mut self, data: &[u8]) {
        let Some(report) = extract_boot_report(data) else {
            return;
        };
        self.apply(report);
    }

    /// Apply one parsed report: emit characters for newly pressed keys
    /// and replace the held-key set.
    pub fn apply(&mut self, report: BootReport) {
        let shifted = report.shifted();
        for &code in report.keycodes.iter().filter(|&&c| c != 0) {
            if self.held.contains(&code) {
                continue;
            }
            if code == KEY_BACKSPACE {
                self.text.pop_back();
            } else if let Some(ch) = keycode_to_char(code, shifted) {
                if self.text.len() == TEXT_BUFFER_CAP {
                    self.text.pop_front();
                }
                self.text.push_back(ch);
            }
        }
        self.held = report.keycodes;
    }

    /// The decoded text accumulated so far.
    pub fn text(&self) -> String {
        self.text.iter().collect()
    }

    /// Clear the text buffer and held-key set.
    pub fn clear(&mut self) {
        self.text.clear();
        self.held = [0; 6];
    }
}
