//! Repairs shell-injected output streams.
//!
//! The `logcat` and `screencap` services are launched behind an `echo` so
//! that the first byte(s) of output reveal the device's line discipline.
//! This transform discards those injected bytes and, when the device emits
//! CR LF, rewrites every `\r\n` pair to `\n`. A trailing `\r` at a chunk
//! boundary is held back until the next chunk disambiguates it.

/// Stateful chunk transformer.
pub struct LineTransform {
    saved_cr: bool,
    auto_detect: bool,
    transform_needed: bool,
    skip_bytes: usize,
}

impl LineTransform {
    /// A transform that always rewrites CR LF and skips nothing.
    pub fn new() -> Self {
        Self {
            saved_cr: false,
            auto_detect: false,
            transform_needed: true,
            skip_bytes: 0,
        }
    }

    /// A transform that inspects the first byte: `\n` means the device is
    /// LF-only (skip 1 byte, no rewriting), anything else means CR LF
    /// (skip 2 bytes, rewrite).
    pub fn with_auto_detect() -> Self {
        Self {
            saved_cr: false,
            auto_detect: true,
            transform_needed: true,
            skip_bytes: 2,
        }
    }

    /// Transforms one chunk.
    pub fn transform(&mut self, mut chunk: &[u8]) -> Vec<u8> {
        if chunk.is_empty() {
            return Vec::new();
        }

        if self.auto_detect {
            if chunk[0] == b'\n' {
                self.transform_needed = false;
                self.skip_bytes = 1;
            }
            self.auto_detect = false;
        }

        if self.skip_bytes > 0 {
            let skip = self.skip_bytes.min(chunk.len());
            chunk = &chunk[skip..];
            self.skip_bytes -= skip;
        }
        if chunk.is_empty() {
            return Vec::new();
        }

        if !self.transform_needed {
            return chunk.to_vec();
        }

        let mut out = Vec::with_capacity(chunk.len() + 1);
        if self.saved_cr {
            // The held-back CR was not part of a CR LF pair after all.
            if chunk[0] != b'\n' {
                out.push(b'\r');
            }
            self.saved_cr = false;
        }

        let mut lo = 0;
        let mut hi = 0;
        let last = chunk.len() - 1;
        while hi <= last {
            if chunk[hi] == b'\r' {
                if hi == last {
                    self.saved_cr = true;
                    out.extend_from_slice(&chunk[lo..hi]);
                    return out;
                }
                if chunk[hi + 1] == b'\n' {
                    out.extend_from_slice(&chunk[lo..hi]);
                    lo = hi + 1;
                }
            }
            hi += 1;
        }
        out.extend_from_slice(&chunk[lo..hi]);
        out
    }

    /// Releases a CR held back at the final chunk boundary.
    pub fn flush(&mut self) -> Option<u8> {
        if self.saved_cr {
            self.saved_cr = false;
            Some(b'\r')
        } else {
            None
        }
    }
}

impl Default for LineTransform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crlf_rewritten() {
        let mut lt = LineTransform::new();
        assert_eq!(lt.transform(b"one\r\ntwo\r\n"), b"one\ntwo\n");
        assert!(lt.flush().is_none());
    }

    #[test]
    fn test_lone_cr_preserved() {
        let mut lt = LineTransform::new();
        assert_eq!(lt.transform(b"a\rb"), b"a\rb");
    }

    #[test]
    fn test_cr_at_boundary_joined_with_lf() {
        let mut lt = LineTransform::new();
        assert_eq!(lt.transform(b"line\r"), b"line");
        assert_eq!(lt.transform(b"\nnext"), b"\nnext");
        assert!(lt.flush().is_none());
    }

    #[test]
    fn test_cr_at_boundary_not_followed_by_lf() {
        let mut lt = LineTransform::new();
        assert_eq!(lt.transform(b"line\r"), b"line");
        assert_eq!(lt.transform(b"more"), b"\rmore");
    }

    #[test]
    fn test_trailing_cr_flushed_at_eof() {
        let mut lt = LineTransform::new();
        assert_eq!(lt.transform(b"end\r"), b"end");
        assert_eq!(lt.flush(), Some(b'\r'));
        assert!(lt.flush().is_none());
    }

    #[test]
    fn test_auto_detect_lf_only() {
        // First byte LF: the echo emitted "\n"; skip it, leave data alone.
        let mut lt = LineTransform::with_auto_detect();
        assert_eq!(lt.transform(b"\n\x89PNG\r\n"), b"\x89PNG\r\n");
    }

    #[test]
    fn test_auto_detect_crlf() {
        // First byte CR: the echo emitted "\r\n"; skip both, rewrite pairs.
        let mut lt = LineTransform::with_auto_detect();
        assert_eq!(lt.transform(b"\r\n\x89PNG\r\n"), b"\x89PNG\n");
    }

    #[test]
    fn test_auto_detect_skip_spans_chunks() {
        let mut lt = LineTransform::with_auto_detect();
        assert_eq!(lt.transform(b"\r"), b"");
        assert_eq!(lt.transform(b"\ndata"), b"data");
    }
}
