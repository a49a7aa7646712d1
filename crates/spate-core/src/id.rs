//! Strongly-typed identifiers.

use std::fmt;

/// Identifies a lane: a fixed worker slot with its own block chain.
///
/// Lane `n` is written only by the execution unit that owns index `n`,
/// which is what lets writers append without synchronisation. The
/// calling thread outside any worker conventionally uses `LaneId(0)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LaneId(pub u16);

impl LaneId {
    /// The lane index as a `usize`, for slice indexing.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for LaneId {
    fn from(v: u16) -> Self {
        Self(v)
    }
}

/// Monotonically increasing tick counter.
///
/// Advanced once per registry rotation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickId(pub u64);

impl TickId {
    /// The tick after this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TickId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Identifies a producer or consumer handle within its container.
///
/// Handle ids are allocated sequentially per container and never reused,
/// so a stale handle cannot alias a newer registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u32);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_index_matches_raw_value() {
        assert_eq!(LaneId(7).index(), 7);
        assert_eq!(LaneId::from(3u16), LaneId(3));
    }

    #[test]
    fn tick_next_is_monotonic() {
        let t = TickId(41);
        assert_eq!(t.next(), TickId(42));
        assert!(t.next() > t);
    }

    #[test]
    fn display_formats() {
        assert_eq!(LaneId(2).to_string(), "2");
        assert_eq!(TickId(9).to_string(), "9");
        assert_eq!(HandleId(5).to_string(), "#5");
    }
}
