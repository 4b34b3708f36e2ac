//! Edge fade shaping for scheduled segments
//!
//! Segments are played back-to-back, so every segment edge is a potential
//! discontinuity. A short linear ramp at both ends of each segment keeps
//! the joins click-free.
//!
//! For a segment of `n` frames and a window of `w` frames the multiplier at
//! frame `i` is:
//! - `i < w`: fade-in, `i / w`
//! - `i >= n - w - 1`: fade-out, `(n - i - 1) / w`
//! - otherwise: `1.0`
//!
//! The fade-out branch covers `w + 1` frames and ends at exactly `0.0` on the
//! final frame.

/// Nominal fade window in frames
pub const EDGE_FADE_FRAMES: usize = 50;

/// Linear fade-in/fade-out window applied at both edges of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeFade {
    window: usize,
    frames: usize,
}

impl EdgeFade {
    /// Fade for a segment of `frames` frames using the nominal window
    pub fn for_segment(frames: usize) -> Self {
        Self::with_window(frames, EDGE_FADE_FRAMES)
    }

    /// Fade for a segment of `frames` frames with a custom nominal window
    ///
    /// Segments too short to hold both ramps (`frames < 2 * window + 1`)
    /// get the window clamped to `(frames - 1) / 2` so the ramps never
    /// overlap or invert.
    pub fn with_window(frames: usize, window: usize) -> Self {
        let max_window = frames.saturating_sub(1) / 2;
        Self {
            window: window.min(max_window),
            frames,
        }
    }

    /// Effective window length in frames
    pub fn window(&self) -> usize {
        self.window
    }

    /// Segment length in frames
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Gain multiplier for frame `index`
    ///
    /// Returns 0.0 for segments of one or two frames (no room for a ramp) and
    /// for indices past the end of the segment.
    pub fn multiplier(&self, index: usize) -> f32 {
        if self.window == 0 || index >= self.frames {
            return 0.0;
        }

        let w = self.window as f32;
        if index < self.window {
            index as f32 / w
        } else if index >= self.frames - self.window - 1 {
            (self.frames - index - 1) as f32 / w
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_200_frames() {
        let fade = EdgeFade::for_segment(200);
        assert_eq!(fade.window(), 50);

        assert_eq!(fade.multiplier(0), 0.0);
        assert_eq!(fade.multiplier(25), 0.5);
        assert_eq!(fade.multiplier(49), 49.0 / 50.0);
        assert_eq!(fade.multiplier(50), 1.0);
        assert_eq!(fade.multiplier(148), 1.0);
        assert_eq!(fade.multiplier(149), 1.0);
        assert_eq!(fade.multiplier(150), 49.0 / 50.0);
        assert_eq!(fade.multiplier(174), 0.5);
        assert_eq!(fade.multiplier(199), 0.0);
    }

    #[test]
    fn test_fade_is_monotonic_on_each_ramp() {
        let fade = EdgeFade::for_segment(500);
        for i in 1..50 {
            assert!(fade.multiplier(i) > fade.multiplier(i - 1));
        }
        for i in 450..500 {
            assert!(fade.multiplier(i) < fade.multiplier(i - 1));
        }
    }

    #[test]
    fn test_fade_101_frames_keeps_nominal_window() {
        let fade = EdgeFade::for_segment(101);
        assert_eq!(fade.window(), 50);
        assert_eq!(fade.multiplier(50), 1.0);
        assert_eq!(fade.multiplier(100), 0.0);
    }

    #[test]
    fn test_short_segment_window_is_clamped() {
        let fade = EdgeFade::for_segment(10);
        assert_eq!(fade.window(), 4);

        let values: Vec<f32> = (0..10).map(|i| fade.multiplier(i)).collect();
        assert_eq!(values, vec![0.0, 0.25, 0.5, 0.75, 1.0, 1.0, 0.75, 0.5, 0.25, 0.0]);

        for v in values {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_tiny_segments_are_silenced() {
        for frames in [0, 1, 2] {
            let fade = EdgeFade::for_segment(frames);
            assert_eq!(fade.window(), 0);
            for i in 0..frames {
                assert_eq!(fade.multiplier(i), 0.0);
            }
        }
    }

    #[test]
    fn test_three_frame_segment() {
        let fade = EdgeFade::for_segment(3);
        assert_eq!(fade.window(), 1);
        assert_eq!(fade.multiplier(0), 0.0);
        assert_eq!(fade.multiplier(1), 1.0);
        assert_eq!(fade.multiplier(2), 0.0);
    }

    #[test]
    fn test_index_past_end() {
        let fade = EdgeFade::for_segment(200);
        assert_eq!(fade.multiplier(200), 0.0);
    }
}
