//! `Range` header parsing for the stream endpoint
//!
//! Only a single `bytes=<start>-[<end>]` range is understood. Suffix ranges
//! and multi-range requests are rejected rather than approximated.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("File size is unknown")]
    UnknownSize,

    #[error("Unsupported range unit in {0:?}")]
    Unit(String),

    #[error("Multiple ranges are not supported")]
    Multiple,

    #[error("Suffix ranges are not supported")]
    Suffix,

    #[error("Malformed range {0:?}")]
    Malformed(String),

    #[error("Range end {end} is before start {start}")]
    Inverted { start: u64, end: u64 },

    #[error("Range start {start} is beyond the file size {total}")]
    Unsatisfiable { start: u64, total: u64 },
}

/// Inclusive byte window of a file
///
/// `total_size` is 0 when the size of the file is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub total_size: u64,
}

impl ByteRange {
    /// Window selected by an optional `Range` header value
    ///
    /// Without a header (or with an empty one) the whole file is selected.
    /// An `end` past the file is clamped to the last byte. A closed range
    /// is served even when the size is unknown; anything that needs the
    /// size to compute the window is not.
    pub fn parse(header: Option<&str>, total_size: u64) -> Result<Self, RangeError> {
        let known_last = total_size.checked_sub(1);

        let header = match header.map(str::trim) {
            None | Some("") => {
                let last = known_last.ok_or(RangeError::UnknownSize)?;
                return Ok(Self {
                    start: 0,
                    end: last,
                    total_size,
                });
            }
            Some(h) => h,
        };

        let spec = header
            .strip_prefix("bytes=")
            .ok_or_else(|| RangeError::Unit(header.to_string()))?
            .trim();
        if spec.contains(',') {
            return Err(RangeError::Multiple);
        }

        let (start, end) = spec
            .split_once('-')
            .ok_or_else(|| RangeError::Malformed(header.to_string()))?;
        let (start, end) = (start.trim(), end.trim());
        if start.is_empty() {
            return Err(RangeError::Suffix);
        }

        let parse = |value: &str| {
            value
                .parse::<u64>()
                .map_err(|_| RangeError::Malformed(header.to_string()))
        };
        let start = parse(start)?;
        let end = if end.is_empty() { None } else { Some(parse(end)?) };

        let Some(last) = known_last else {
            let end = end.ok_or(RangeError::UnknownSize)?;
            if end < start {
                return Err(RangeError::Inverted { start, end });
            }
            return Ok(Self {
                start,
                end,
                total_size,
            });
        };

        if start > last {
            return Err(RangeError::Unsatisfiable {
                start,
                total: total_size,
            });
        }
        let end = end.unwrap_or(last);
        if end < start {
            return Err(RangeError::Inverted { start, end });
        }

        Ok(Self {
            start,
            end: end.min(last),
            total_size,
        })
    }

    /// Number of bytes in the window
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value, with `*` for an unknown size
    pub fn content_range(&self) -> String {
        if self.total_size == 0 {
            format!("bytes {}-{}/*", self.start, self.end)
        } else {
            format!("bytes {}-{}/{}", self.start, self.end, self.total_size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_header_selects_whole_file() {
        let range = ByteRange::parse(None, 500).unwrap();
        assert_eq!((range.start, range.end, range.len()), (0, 499, 500));
        assert_eq!(range.content_range(), "bytes 0-499/500");

        assert_eq!(ByteRange::parse(Some("  "), 500).unwrap(), range);
    }

    #[test]
    fn test_closed_range() {
        let range = ByteRange::parse(Some("bytes=100-199"), 1000).unwrap();
        assert_eq!(range.len(), 100);
        assert_eq!(range.content_range(), "bytes 100-199/1000");
    }

    #[test]
    fn test_open_ended_range() {
        let range = ByteRange::parse(Some("bytes=900-"), 1000).unwrap();
        assert_eq!((range.start, range.end, range.len()), (900, 999, 100));
    }

    #[test]
    fn test_end_is_clamped() {
        let range = ByteRange::parse(Some("bytes=0-5000"), 1000).unwrap();
        assert_eq!(range.end, 999);
        assert_eq!(range.len(), 1000);
    }

    #[test]
    fn test_single_byte() {
        let range = ByteRange::parse(Some("bytes=999-999"), 1000).unwrap();
        assert_eq!(range.len(), 1);
    }

    #[test]
    fn test_rejected_forms() {
        assert_eq!(ByteRange::parse(Some("bytes=-500"), 1000), Err(RangeError::Suffix));
        assert_eq!(
            ByteRange::parse(Some("bytes=0-1,5-9"), 1000),
            Err(RangeError::Multiple)
        );
        assert!(matches!(
            ByteRange::parse(Some("items=0-1"), 1000),
            Err(RangeError::Unit(_))
        ));
        assert!(matches!(
            ByteRange::parse(Some("bytes=abc-10"), 1000),
            Err(RangeError::Malformed(_))
        ));
        assert!(matches!(
            ByteRange::parse(Some("bytes=10"), 1000),
            Err(RangeError::Malformed(_))
        ));
        assert_eq!(
            ByteRange::parse(Some("bytes=20-10"), 1000),
            Err(RangeError::Inverted { start: 20, end: 10 })
        );
        assert_eq!(
            ByteRange::parse(Some("bytes=1000-"), 1000),
            Err(RangeError::Unsatisfiable {
                start: 1000,
                total: 1000
            })
        );
    }

    #[test]
    fn test_open_range_past_end_is_unsatisfiable() {
        assert_eq!(
            ByteRange::parse(Some("bytes=1000-"), 1000),
            Err(RangeError::Unsatisfiable {
                start: 1000,
                total: 1000
            })
        );
        assert_eq!(
            ByteRange::parse(Some("bytes=1500-1600"), 1000),
            Err(RangeError::Unsatisfiable {
                start: 1500,
                total: 1000
            })
        );
    }

    #[test]
    fn test_unknown_size() {
        assert_eq!(ByteRange::parse(None, 0), Err(RangeError::UnknownSize));
        assert_eq!(
            ByteRange::parse(Some("bytes=100-"), 0),
            Err(RangeError::UnknownSize)
        );
        assert_eq!(
            ByteRange::parse(Some("bytes=20-10"), 0),
            Err(RangeError::Inverted { start: 20, end: 10 })
        );
    }

    #[test]
    fn test_closed_range_with_unknown_size() {
        let range = ByteRange::parse(Some("bytes=100-199"), 0).unwrap();
        assert_eq!((range.start, range.end, range.len()), (100, 199, 100));
        assert_eq!(range.content_range(), "bytes 100-199/*");
    }
}
