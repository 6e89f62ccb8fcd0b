//! Small validation helpers shared by adapters.

/// `true` if every byte is printable ASCII (`0x20..=0x7E`).
pub(super) fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}
