// Buffered time ranges as reported by a media element

/// One buffered span, in seconds on the book timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0.0
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }
}

/// Ordered, possibly discontinuous sequence of buffered spans.
///
/// The sequence is kept exactly as the element reported it: no merging,
/// no sorting. Elements already report ranges in ascending order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeRanges {
    ranges: Vec<TimeRange>,
}

impl TimeRanges {
    pub fn empty() -> Self {
        Self { ranges: Vec::new() }
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        Self {
            ranges: pairs
                .into_iter()
                .map(|(start, end)| TimeRange::new(start, end))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeRange> {
        self.ranges.iter()
    }

    pub fn as_pairs(&self) -> Vec<(f64, f64)> {
        self.ranges.iter().map(|r| (r.start, r.end)).collect()
    }

    /// Range holding `t`, if any
    pub fn range_containing(&self, t: f64) -> Option<TimeRange> {
        self.ranges.iter().copied().find(|r| r.contains(t))
    }

    /// Fractions of `duration` covered by each span, clamped to 0..=1.
    /// Used to draw the buffered bar under the scrubber.
    pub fn fractions(&self, duration: f64) -> Vec<(f64, f64)> {
        if !(duration > 0.0) {
            return Vec::new();
        }
        self.ranges
            .iter()
            .map(|r| {
                (
                    (r.start / duration).clamp(0.0, 1.0),
                    (r.end / duration).clamp(0.0, 1.0),
                )
            })
            .collect()
    }
}

impl FromIterator<TimeRange> for TimeRanges {
    fn from_iter<I: IntoIterator<Item = TimeRange>>(iter: I) -> Self {
        Self {
            ranges: iter.into_iter().collect(),
        }
    }
}
