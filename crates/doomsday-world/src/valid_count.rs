//! Generation counters for once-per-query visiting.
//!
//! Queries that can reach the same element through several paths stamp each
//! element with the current generation and skip anything already stamped.
//! Starting a new query only bumps the generation, so no per-query clearing
//! is needed.

/// Per-element generation stamps.
#[derive(Debug, Clone, Default)]
pub struct ValidCount {
    generation: u32,
    stamps: Vec<u32>,
}

impl ValidCount {
    /// Create stamps for `len` elements.
    pub fn new(len: usize) -> Self {
        Self {
            generation: 0,
            stamps: vec![0; len],
        }
    }

    /// Start a new query and return its generation.
    pub fn begin(&mut self) -> u32 {
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            // Wrapped: old stamps could collide with new generations.
            self.stamps.fill(0);
            self.generation = 1;
        }
        self.generation
    }

    /// Stamp `index`, returning false if it was already visited this query.
    #[inline]
    pub fn mark(&mut self, index: usize) -> bool {
        if index >= self.stamps.len() {
            self.stamps.resize(index + 1, 0);
        }
        if self.stamps[index] == self.generation {
            return false;
        }
        self.stamps[index] = self.generation;
        true
    }

    /// Current generation.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Number of tracked elements.
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    /// Returns true if no elements are tracked.
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_once_per_generation() {
        let mut valid = ValidCount::new(4);
        valid.begin();
        assert!(valid.mark(2));
        assert!(!valid.mark(2));

        valid.begin();
        assert!(valid.mark(2));
        assert!(!valid.mark(2));
    }

    #[test]
    fn grows_on_demand() {
        let mut valid = ValidCount::new(0);
        valid.begin();
        assert!(valid.mark(10));
        assert_eq!(valid.len(), 11);
    }

    #[test]
    fn generation_is_monotonic() {
        let mut valid = ValidCount::new(1);
        let a = valid.begin();
        let b = valid.begin();
        assert!(b > a);
    }
}
