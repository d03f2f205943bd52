/*!
    Synthetic presentation timestamps.
*/

/**
    Default timestamp of the first encoded frame, in microseconds.

    Kept for output compatibility with files produced by earlier versions
    of the tool.
*/
pub const DEFAULT_INITIAL_PTS_US: i64 = 132;

/**
    Generates constant-rate presentation timestamps in microseconds.

    The encode side discards the source's per-frame timestamps and stamps
    frames at a fixed target rate instead. Each call to [`PtsGenerator::next`]
    returns the current timestamp and advances by `1_000_000 / fps`
    (integer division, matching the interval the muxer sees).
*/
#[derive(Clone, Debug)]
pub struct PtsGenerator {
    next_us: i64,
    interval_us: i64,
}

impl PtsGenerator {
    /**
        Create a generator starting at `initial_us` for the given frame rate.

        # Panics

        Panics if `fps` is zero.
    */
    pub fn new(initial_us: i64, fps: u32) -> Self {
        assert!(fps > 0, "frame rate must be positive");
        Self {
            next_us: initial_us,
            interval_us: 1_000_000 / fps as i64,
        }
    }

    /**
        Returns the distance between consecutive timestamps.
    */
    pub fn interval_us(&self) -> i64 {
        self.interval_us
    }

    /**
        Returns the timestamp the next call to [`PtsGenerator::next`] yields.
    */
    pub fn peek(&self) -> i64 {
        self.next_us
    }

    /**
        Returns the current timestamp and advances the generator.
    */
    pub fn next(&mut self) -> i64 {
        let pts = self.next_us;
        self.next_us += self.interval_us;
        pts
    }
}

impl Default for PtsGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_PTS_US, 30)
    }
}
