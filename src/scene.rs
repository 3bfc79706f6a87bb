use std::fmt;
use std::time::Duration;

pub const SCENE_COUNT: usize = 3;

/// Clear colours, one RGBA row per scene.
pub const BACKGROUNDS: [[f32; 4]; SCENE_COUNT] = [
    [0.2, 0.3, 0.3, 1.0],
    [1.0, 0.643, 0.0, 1.0],
    [0.0, 1.0, 0.655, 1.0],
];

/// Index of the active scene. Always in `0..SCENE_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SceneIndex(u8);

impl SceneIndex {
    pub const FIRST: SceneIndex = SceneIndex(0);
    pub const LAST: SceneIndex = SceneIndex(SCENE_COUNT as u8 - 1);

    /// Returns `None` for out-of-range values.
    pub fn new(index: usize) -> Option<Self> {
        if index < SCENE_COUNT {
            Some(SceneIndex(index as u8))
        } else {
            None
        }
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }

    /// One step back, saturating at the first scene.
    pub fn previous(self) -> Self {
        SceneIndex(self.0.saturating_sub(1))
    }

    /// One step forward, saturating at the last scene.
    pub fn next(self) -> Self {
        if self < Self::LAST {
            SceneIndex(self.0 + 1)
        } else {
            self
        }
    }

    pub fn background(self) -> [f32; 4] {
        BACKGROUNDS[self.get()]
    }

    pub fn all() -> impl Iterator<Item = SceneIndex> {
        (0..SCENE_COUNT as u8).map(SceneIndex)
    }
}

impl fmt::Display for SceneIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time-varying tint: each channel is a sine wave at its own frequency
/// mapped into `[0, 1]`.
pub fn pulse(elapsed: Duration) -> [f32; 4] {
    let t = elapsed.as_secs_f32();
    let wave = |freq: f32| (t * freq).sin() * 0.5 + 0.5;
    [wave(1.5), wave(2.0), wave(1.0), 1.0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(i: usize) -> SceneIndex {
        SceneIndex::new(i).unwrap()
    }

    #[test]
    fn new_rejects_out_of_range() {
        assert!(SceneIndex::new(3).is_none());
        assert_eq!(SceneIndex::new(2), Some(SceneIndex::LAST));
    }

    #[test]
    fn previous_saturates_at_zero() {
        for i in 0..SCENE_COUNT {
            let expected = if i == 0 { 0 } else { i - 1 };
            assert_eq!(s(i).previous().get(), expected);
        }
    }

    #[test]
    fn next_saturates_at_two() {
        for i in 0..SCENE_COUNT {
            assert_eq!(s(i).next().get(), (i + 1).min(2));
        }
    }

    #[test]
    fn backgrounds_match_table() {
        assert_eq!(s(0).background(), [0.2, 0.3, 0.3, 1.0]);
        assert_eq!(s(1).background(), [1.0, 0.643, 0.0, 1.0]);
        assert_eq!(s(2).background(), [0.0, 1.0, 0.655, 1.0]);
    }

    #[test]
    fn default_is_first_scene() {
        assert_eq!(SceneIndex::default(), SceneIndex::FIRST);
    }

    #[test]
    fn pulse_starts_at_mid_grey_and_stays_in_range() {
        assert_eq!(pulse(Duration::from_secs(0)), [0.5, 0.5, 0.5, 1.0]);
        for ms in (0..10_000).step_by(137) {
            let c = pulse(Duration::from_millis(ms));
            assert!(c.iter().all(|v| (0.0..=1.0).contains(v)), "{:?}", c);
            assert_eq!(c[3], 1.0);
        }
    }
}
