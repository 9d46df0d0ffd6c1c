//! # Line ending normalization module
//!
//! Canonical text documents are signed over their CRLF form. [CanonicalText]
//! rewrites line endings as data streams through, so that chunk boundaries
//! falling between a `\r` and its `\n` do not change the result.

/// Streaming CRLF normalizer.
///
/// A `\r` always becomes `\r\n`, a `\n` becomes `\r\n` unless it directly follows
/// a `\r` (in which case it was already emitted), every other octet passes through.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalText {
    prev_was_cr: bool,
}

impl CanonicalText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes `data`, handing the output to `sink` in one or more slices.
    pub fn update(&mut self, data: &[u8], mut sink: impl FnMut(&[u8])) {
        let mut start = 0;
        for (i, b) in data.iter().enumerate() {
            match b {
                b'\r' => {
                    sink(&data[start..i]);
                    sink(b"\r\n");
                    start = i + 1;
                    self.prev_was_cr = true;
                }
                b'\n' => {
                    sink(&data[start..i]);
                    if !self.prev_was_cr {
                        sink(b"\r\n");
                    }
                    start = i + 1;
                    self.prev_was_cr = false;
                }
                _ => self.prev_was_cr = false,
            }
        }
        if start < data.len() {
            sink(&data[start..]);
        }
    }
}

/// Normalizes a complete buffer in one go.
pub fn normalize(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 16);
    CanonicalText::new().update(data, |chunk| out.extend_from_slice(chunk));
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(b"a\nb\n"), b"a\r\nb\r\n");
        assert_eq!(normalize(b"a\r\nb\r\n"), b"a\r\nb\r\n");
        assert_eq!(normalize(b"a\rb"), b"a\r\nb");
        assert_eq!(normalize(b"a\r\r\nb"), b"a\r\n\r\nb");
        assert_eq!(normalize(b"\n\n"), b"\r\n\r\n");
        assert_eq!(normalize(b""), b"");
        assert_eq!(normalize(b"no line break"), b"no line break");
    }

    #[test]
    fn test_split_crlf_across_updates() {
        let mut out = Vec::new();
        let mut text = CanonicalText::new();
        text.update(b"line\r", |c| out.extend_from_slice(c));
        text.update(b"\nnext\n", |c| out.extend_from_slice(c));
        assert_eq!(out, b"line\r\nnext\r\n");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "[a-c\r\n]{0,64}") {
            let once = normalize(s.as_bytes());
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn lf_and_crlf_agree(s in "[a-z ]{0,8}(\n[a-z ]{0,8}){0,8}") {
            let crlf = s.replace('\n', "\r\n");
            prop_assert_eq!(normalize(s.as_bytes()), normalize(crlf.as_bytes()));
        }

        #[test]
        fn chunking_does_not_matter(s in "[a-c\r\n]{0,64}", split in 0usize..64) {
            let data = s.as_bytes();
            let split = split.min(data.len());
            let mut out = Vec::new();
            let mut text = CanonicalText::new();
            text.update(&data[..split], |c| out.extend_from_slice(c));
            text.update(&data[split..], |c| out.extend_from_slice(c));
            prop_assert_eq!(out, normalize(data));
        }
    }
}
