//! Tuning knobs of the LZ77 matcher.

use crate::{Error, Result};

/// Shortest back-reference the matcher can find; the hash covers three
/// bytes.
pub const TRUE_MIN_BACK_REFERENCE_LENGTH: usize = 3;

/// Matcher configuration, built with [`Parameters::builder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameters {
    window_size: usize,
    min_back_reference_length: usize,
    max_back_reference_length: usize,
    max_offset: usize,
    max_literal_length: usize,
    nice_back_reference_length: usize,
    max_candidates: usize,
    lazy_matching: bool,
    lazy_threshold: usize,
}

impl Parameters {
    /// Starts a builder for a window of `window_size` bytes.
    ///
    /// The window size must be a power of two; [`ParametersBuilder::build`]
    /// rejects anything else.
    pub fn builder(window_size: usize) -> ParametersBuilder {
        ParametersBuilder {
            window_size,
            min_back_reference_length: TRUE_MIN_BACK_REFERENCE_LENGTH,
            max_back_reference_length: window_size.saturating_sub(1),
            max_offset: window_size.saturating_sub(1),
            max_literal_length: window_size,
            nice_back_reference_length: None,
            max_candidates: None,
            lazy_matching: None,
            lazy_threshold: None,
        }
    }

    /// Settings matching the LZ4 block format: 64 KiB window, matches of
    /// at least four bytes, lengths and offsets below 65536.
    pub fn lz4() -> Self {
        const WINDOW: usize = 1 << 16;
        let builder = Self::builder(WINDOW)
            .with_min_back_reference_length(4)
            .with_max_back_reference_length(WINDOW - 1)
            .with_max_offset(WINDOW - 1)
            .with_max_literal_length(WINDOW - 1);
        builder.finalize()
    }

    /// Size of the sliding window.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Shortest back-reference that is emitted.
    pub fn min_back_reference_length(&self) -> usize {
        self.min_back_reference_length
    }

    /// Longest back-reference that is emitted.
    pub fn max_back_reference_length(&self) -> usize {
        self.max_back_reference_length
    }

    /// Largest back-reference distance.
    pub fn max_offset(&self) -> usize {
        self.max_offset
    }

    /// Longest literal block before it is flushed.
    pub fn max_literal_length(&self) -> usize {
        self.max_literal_length
    }

    /// Match length at which the candidate search stops early.
    pub fn nice_back_reference_length(&self) -> usize {
        self.nice_back_reference_length
    }

    /// Most hash-chain candidates tried per position.
    pub fn max_candidates(&self) -> usize {
        self.max_candidates
    }

    /// Whether the next position is tried before accepting a short match.
    pub fn lazy_matching(&self) -> bool {
        self.lazy_matching
    }

    /// Matches at most this long trigger a lazy look at the next position.
    pub fn lazy_threshold(&self) -> usize {
        self.lazy_threshold
    }
}

/// Builder for [`Parameters`].
#[derive(Debug, Clone)]
pub struct ParametersBuilder {
    window_size: usize,
    min_back_reference_length: usize,
    max_back_reference_length: usize,
    max_offset: usize,
    max_literal_length: usize,
    nice_back_reference_length: Option<usize>,
    max_candidates: Option<usize>,
    lazy_matching: Option<bool>,
    lazy_threshold: Option<usize>,
}

impl ParametersBuilder {
    /// Sets the shortest back-reference; raised to at least three and
    /// pulls the maximum up with it.
    pub fn with_min_back_reference_length(mut self, length: usize) -> Self {
        self.min_back_reference_length = length.max(TRUE_MIN_BACK_REFERENCE_LENGTH);
        if self.max_back_reference_length < self.min_back_reference_length {
            self.max_back_reference_length = self.min_back_reference_length;
        }
        self
    }

    /// Sets the longest back-reference, kept within
    /// `min..=window_size - 1`.
    pub fn with_max_back_reference_length(mut self, length: usize) -> Self {
        self.max_back_reference_length = if length < self.min_back_reference_length {
            self.min_back_reference_length
        } else {
            length.min(self.window_size.saturating_sub(1))
        };
        self
    }

    /// Sets the largest distance; zero means `window_size - 1`.
    pub fn with_max_offset(mut self, offset: usize) -> Self {
        let limit = self.window_size.saturating_sub(1);
        self.max_offset = if offset < 1 { limit } else { offset.min(limit) };
        self
    }

    /// Sets the longest literal block; zero means `window_size`.
    pub fn with_max_literal_length(mut self, length: usize) -> Self {
        self.max_literal_length = if length < 1 {
            self.window_size
        } else {
            length.min(self.window_size)
        };
        self
    }

    /// Sets the length at which candidate search stops.
    pub fn with_nice_back_reference_length(mut self, length: usize) -> Self {
        self.nice_back_reference_length = Some(length);
        self
    }

    /// Sets how many hash-chain candidates are tried.
    pub fn with_max_candidates(mut self, candidates: usize) -> Self {
        self.max_candidates = Some(candidates);
        self
    }

    /// Enables or disables lazy matching.
    pub fn with_lazy_matching(mut self, lazy: bool) -> Self {
        self.lazy_matching = Some(lazy);
        self
    }

    /// Sets the lazy matching threshold.
    pub fn with_lazy_threshold(mut self, threshold: usize) -> Self {
        self.lazy_threshold = Some(threshold);
        self
    }

    /// Favors speed: short candidate chains and no lazy matching.
    pub fn tuned_for_speed(mut self) -> Self {
        self.nice_back_reference_length = Some(
            self.min_back_reference_length
                .max(self.max_back_reference_length / 8),
        );
        self.max_candidates = Some(32.max(self.window_size / 1024));
        self.lazy_matching = Some(false);
        self.lazy_threshold = Some(self.min_back_reference_length);
        self
    }

    /// Favors ratio: long candidate chains and lazy matching.
    pub fn tuned_for_compression_ratio(mut self) -> Self {
        self.nice_back_reference_length = Some(self.max_back_reference_length);
        self.lazy_threshold = Some(self.max_back_reference_length);
        self.max_candidates = Some(32.max(self.window_size / 16));
        self.lazy_matching = Some(true);
        self
    }

    /// Validates the window size and fills in defaults.
    pub fn build(self) -> Result<Parameters> {
        if !self.window_size.is_power_of_two() {
            return Err(Error::InvalidParameter(format!(
                "window size {} is not a power of two",
                self.window_size
            )));
        }
        if self.window_size < self.min_back_reference_length {
            return Err(Error::InvalidParameter(format!(
                "window size {} is smaller than the minimal back-reference length {}",
                self.window_size, self.min_back_reference_length
            )));
        }
        Ok(self.finalize())
    }

    fn finalize(self) -> Parameters {
        let nice = self.nice_back_reference_length.unwrap_or(
            self.min_back_reference_length
                .max(self.max_back_reference_length / 2),
        );
        let candidates = self
            .max_candidates
            .unwrap_or(256.max(self.window_size / 128));
        let lazy = self.lazy_matching.unwrap_or(true);
        let threshold = if lazy {
            self.lazy_threshold.unwrap_or(nice)
        } else {
            self.min_back_reference_length
        };
        Parameters {
            window_size: self.window_size,
            min_back_reference_length: self.min_back_reference_length,
            max_back_reference_length: self.max_back_reference_length,
            max_offset: self.max_offset,
            max_literal_length: self.max_literal_length,
            nice_back_reference_length: nice,
            max_candidates: candidates,
            lazy_matching: lazy,
            lazy_threshold: threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = Parameters::builder(128).build().unwrap();
        assert_eq!(params.min_back_reference_length(), 3);
        assert_eq!(params.max_back_reference_length(), 127);
        assert_eq!(params.max_offset(), 127);
        assert_eq!(params.max_literal_length(), 128);
        assert_eq!(params.nice_back_reference_length(), 63);
        assert_eq!(params.max_candidates(), 256);
        assert!(params.lazy_matching());
        assert_eq!(params.lazy_threshold(), 63);
    }

    #[test]
    fn test_rejects_bad_window() {
        assert!(matches!(
            Parameters::builder(100).build(),
            Err(Error::InvalidParameter(_))
        ));
        assert!(Parameters::builder(2).build().is_err());
    }

    #[test]
    fn test_clamping() {
        let params = Parameters::builder(256)
            .with_min_back_reference_length(1)
            .with_max_back_reference_length(1000)
            .with_max_offset(0)
            .with_max_literal_length(0)
            .build()
            .unwrap();
        assert_eq!(params.min_back_reference_length(), 3);
        assert_eq!(params.max_back_reference_length(), 255);
        assert_eq!(params.max_offset(), 255);
        assert_eq!(params.max_literal_length(), 256);
    }

    #[test]
    fn test_lz4_parameters() {
        let params = Parameters::lz4();
        assert_eq!(params.window_size(), 65536);
        assert_eq!(params.min_back_reference_length(), 4);
        assert_eq!(params.max_back_reference_length(), 65535);
        assert_eq!(params.max_offset(), 65535);
        assert_eq!(params.max_literal_length(), 65535);
    }

    #[test]
    fn test_tuning_presets() {
        let fast = Parameters::builder(1 << 16).tuned_for_speed().build().unwrap();
        assert!(!fast.lazy_matching());
        assert_eq!(fast.max_candidates(), 64);
        let small = Parameters::builder(1 << 16)
            .tuned_for_compression_ratio()
            .build()
            .unwrap();
        assert!(small.lazy_matching());
        assert_eq!(small.nice_back_reference_length(), 65535);
    }
}
