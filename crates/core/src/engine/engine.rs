use attitude_fixtures::Rgb;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::config::{Direction, EngineConfig, ShowType, Transition};

/// Virtual canvas width in pixels. Fixture segments sample into this space.
pub const CANVAS_SIZE: usize = 5000;

/// Fixed render period; the fixture patch runs every engine once per tick.
pub const FRAME_MILLIS: u64 = 25;

/// Deterministic per-frame pixel renderer for one show configuration.
///
/// All state that varies between frames lives in the beat/frame counters, so
/// two engines with the same config and seed produce identical output
/// sequences.
pub struct EffectsEngine {
    config: EngineConfig,
    degraded: bool,
    frames_per_beat: u32,
    beat: u32,
    frame: u32,
    reversed: bool,
    permutation: Option<Vec<u16>>,
    fixture_count: usize,
    canvas: Vec<Rgb>,
}

impl EffectsEngine {
    /// `seed` fixes the permutation used by the `random` direction; it must
    /// stay stable for the engine's lifetime.
    pub fn new(config: EngineConfig, seed: u64) -> Self {
        let frames_per_beat = frames_per_beat(config.speed);
        let permutation = matches!(config.direction, Direction::Random).then(|| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut indices: Vec<u16> = (0..CANVAS_SIZE as u16).collect();
            indices.shuffle(&mut rng);
            indices
        });

        EffectsEngine {
            config,
            degraded: false,
            frames_per_beat,
            beat: 1,
            frame: 0,
            reversed: false,
            permutation,
            fixture_count: 0,
            canvas: vec![Rgb::BLACK; CANVAS_SIZE],
        }
    }

    /// Gray fallback engine for show ids whose record is unusable.
    pub fn fallback(seed: u64) -> Self {
        let mut engine = EffectsEngine::new(EngineConfig::gray(), seed);
        engine.degraded = true;
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn degraded(&self) -> bool {
        self.degraded
    }

    pub fn frames_per_beat(&self) -> u32 {
        self.frames_per_beat
    }

    pub fn beat(&self) -> u32 {
        self.beat
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Advance one 25 ms frame and re-render the canvas.
    pub fn run(&mut self) {
        self.advance();
        self.canvas = self.render();
    }

    pub fn set_fixture_count(&mut self, count: usize) {
        self.fixture_count = count;
    }

    /// Color for segment `index`, striding the canvas evenly across the
    /// configured fixture count.
    pub fn fixture_color(&self, index: usize) -> Rgb {
        if self.fixture_count == 0 {
            return Rgb::BLACK;
        }
        let stride = (CANVAS_SIZE / self.fixture_count).max(1);
        let position = (index * stride).min(CANVAS_SIZE - 1);
        self.canvas[position]
    }

    /// Beat counter walks 1..=colors, the frame counter 1..=framesPerBeat.
    /// Rolling off either end of the beat range wraps, or reflects when
    /// bounce is set.
    fn advance(&mut self) {
        let beats = self.config.colors.len().max(1) as u32;
        if !self.reversed {
            if self.frame >= self.frames_per_beat {
                if self.beat >= beats {
                    if self.config.bounce && beats > 1 {
                        self.reversed = true;
                        self.beat = beats - 1;
                        self.frame = self.frames_per_beat;
                    } else {
                        self.beat = 1;
                        self.frame = 1;
                    }
                } else {
                    self.beat += 1;
                    self.frame = 1;
                }
            } else {
                self.frame += 1;
            }
        } else if self.frame <= 1 {
            if self.beat <= 1 {
                if self.config.bounce && beats > 1 {
                    self.reversed = false;
                    self.beat = 2.min(beats);
                    self.frame = 1;
                } else {
                    self.beat = beats;
                    self.frame = self.frames_per_beat;
                }
            } else {
                self.beat -= 1;
                self.frame = self.frames_per_beat;
            }
        } else {
            self.frame -= 1;
        }
    }

    fn render(&self) -> Vec<Rgb> {
        match self.config.show_type {
            ShowType::Static => {
                let canvas = expand_or_trim(self.build_base(), CANVAS_SIZE);
                let canvas = self.apply_direction(canvas);
                self.apply_splits(canvas)
            }
            ShowType::All => {
                let mut base = self.build_base();
                base.reverse();
                let canvas = self.circulate(base);
                self.reduce_to_splits(canvas)
            }
            ShowType::Chase => {
                let mut base = self.build_base();
                base.reverse();
                let canvas = expand_or_trim(self.circulate(base), CANVAS_SIZE);
                let canvas = self.apply_direction(canvas);
                self.apply_splits(canvas)
            }
            ShowType::Pulse => {
                let mut base = self.build_pulse_base();
                base.reverse();
                let canvas = expand_or_trim(self.circulate(base), CANVAS_SIZE);
                let canvas = self.apply_direction(canvas);
                self.apply_splits(canvas)
            }
        }
    }

    /// Width of one color segment. Static shows share the canvas evenly;
    /// animated shows size segments as a percentage of the canvas.
    fn pixels_per_color(&self) -> usize {
        match self.config.show_type {
            ShowType::Static => CANVAS_SIZE / self.config.colors.len().max(1),
            _ => ((CANVAS_SIZE as f64) / (100.0 / self.config.size as f64)).ceil() as usize,
        }
    }

    fn fade_pixels(&self, pixels_per_color: usize) -> usize {
        (pixels_per_color as f64 * self.config.transition_width).round() as usize
    }

    /// Whether segment boundary `i` carries a fade. Leading and trailing
    /// modes alternate, with the last boundary treated specially.
    fn fades_boundary(&self, i: usize, color_count: usize) -> bool {
        match self.config.transition {
            Transition::Both => true,
            Transition::Leading => i % 2 == 1 || i == color_count - 1,
            Transition::Trailing => i % 2 == 0 && i != color_count - 1,
        }
    }

    /// Tile the palette: a flat run per color, with interpolated pixels
    /// toward the next color on fading boundaries.
    fn build_base(&self) -> Vec<Rgb> {
        let colors = &self.config.colors;
        let count = colors.len();
        let pixels_per_color = self.pixels_per_color();
        let fade = self.fade_pixels(pixels_per_color);

        let mut base = Vec::with_capacity(count * pixels_per_color);
        for (i, &color) in colors.iter().enumerate() {
            let next = colors[(i + 1) % count];
            if fade > 0 && self.fades_boundary(i, count) {
                let flat = pixels_per_color.saturating_sub(fade);
                base.extend(std::iter::repeat(color).take(flat));
                base.extend(interpolate(color, next, fade));
            } else {
                base.extend(std::iter::repeat(color).take(pixels_per_color));
            }
        }
        base
    }

    /// Pulse pattern: one burst per non-base color separated by a full
    /// canvas of the base color, with fades chosen by the transition mode.
    fn build_pulse_base(&self) -> Vec<Rgb> {
        let colors = &self.config.colors;
        let rest = colors[0];
        let pixels_per_color = self.pixels_per_color();
        let fade = self.fade_pixels(pixels_per_color);
        let fade_in =
            fade > 0 && matches!(self.config.transition, Transition::Both | Transition::Leading);
        let fade_out =
            fade > 0 && matches!(self.config.transition, Transition::Both | Transition::Trailing);

        let mut base = Vec::new();
        for &color in &colors[1..] {
            let mut flat = pixels_per_color;
            if fade_in {
                flat = flat.saturating_sub(fade);
                base.extend(interpolate(rest, color, fade));
            }
            if fade_out {
                flat = flat.saturating_sub(fade);
            }
            base.extend(std::iter::repeat(color).take(flat));
            if fade_out {
                base.extend(interpolate(color, rest, fade));
            }
            base.extend(std::iter::repeat(rest).take(CANVAS_SIZE));
        }
        if base.is_empty() {
            base.extend(std::iter::repeat(rest).take(CANVAS_SIZE));
        }
        base
    }

    /// Rotate the pattern forward by the beat/frame phase.
    fn circulate(&self, pixels: Vec<Rgb>) -> Vec<Rgb> {
        let length = pixels.len();
        if length == 0 {
            return pixels;
        }
        let pixels_per_color = self.pixels_per_color() as f64;
        let shift = (pixels_per_color / self.frames_per_beat as f64 * self.frame as f64
            + pixels_per_color * (self.beat.saturating_sub(1)) as f64)
            .round() as usize
            % length;
        if shift == 0 {
            return pixels;
        }

        let mut rotated = Vec::with_capacity(length);
        rotated.extend_from_slice(&pixels[length - shift..]);
        rotated.extend_from_slice(&pixels[..length - shift]);
        rotated
    }

    fn apply_direction(&self, mut pixels: Vec<Rgb>) -> Vec<Rgb> {
        match self.config.direction {
            Direction::LeftRight => pixels,
            Direction::RightLeft => {
                pixels.reverse();
                pixels
            }
            Direction::MidEnd => {
                let sample: Vec<Rgb> = pixels.iter().copied().step_by(2).collect();
                let mut out: Vec<Rgb> = sample.iter().rev().copied().collect();
                out.extend(sample);
                expand_or_trim(out, CANVAS_SIZE)
            }
            Direction::EndMid => {
                let sample: Vec<Rgb> = pixels.iter().copied().step_by(2).collect();
                let mut out = sample.clone();
                out.extend(sample.iter().rev().copied());
                expand_or_trim(out, CANVAS_SIZE)
            }
            Direction::Random => match &self.permutation {
                Some(permutation) => permutation
                    .iter()
                    .map(|&index| pixels[index as usize])
                    .collect(),
                None => pixels,
            },
        }
    }

    /// Compress by the split factor and tile back out, repeating the pattern
    /// once per split.
    fn apply_splits(&self, pixels: Vec<Rgb>) -> Vec<Rgb> {
        let splits = self.config.splits as usize;
        if splits <= 1 {
            return pixels;
        }
        let sampled: Vec<Rgb> = pixels.iter().copied().step_by(splits).collect();
        expand_or_trim(sampled, CANVAS_SIZE)
    }

    /// `all` shows collapse to one color per split, sampled at each split's
    /// start and broadcast across it.
    fn reduce_to_splits(&self, pixels: Vec<Rgb>) -> Vec<Rgb> {
        let splits = self.config.splits as usize;
        let stride = CANVAS_SIZE / splits.max(1);
        let mut out = vec![Rgb::BLACK; CANVAS_SIZE];
        if pixels.is_empty() {
            return out;
        }
        for split in 0..splits.max(1) {
            let color = pixels[(split * stride) % pixels.len()];
            let end = if split == splits.max(1) - 1 {
                CANVAS_SIZE
            } else {
                (split + 1) * stride
            };
            for slot in &mut out[split * stride..end] {
                *slot = color;
            }
        }
        out
    }
}

/// `round(1000 / (speed/60) / 25)`: frames one beat spans at the fixed
/// 25 ms frame period.
fn frames_per_beat(speed: u32) -> u32 {
    ((1000.0 / (speed as f64 / 60.0)) / FRAME_MILLIS as f64)
        .round()
        .max(1.0) as u32
}

/// Cycle a pattern out to `length` pixels, or cut it off.
fn expand_or_trim(mut pixels: Vec<Rgb>, length: usize) -> Vec<Rgb> {
    if pixels.is_empty() {
        return vec![Rgb::BLACK; length];
    }
    if pixels.len() >= length {
        pixels.truncate(length);
        return pixels;
    }
    let mut out = Vec::with_capacity(length);
    while out.len() < length {
        let remaining = length - out.len();
        if remaining >= pixels.len() {
            out.extend_from_slice(&pixels);
        } else {
            out.extend_from_slice(&pixels[..remaining]);
        }
    }
    out
}

/// Linear per-channel blend: step `k` of `steps` lands on
/// `round(c2/S·k + c1/S·(S−k))`, ending exactly on `c2`.
fn interpolate(from: Rgb, to: Rgb, steps: usize) -> Vec<Rgb> {
    let s = steps as f64;
    (1..=steps)
        .map(|k| {
            let k = k as f64;
            Rgb::new(
                blend_channel(from.r, to.r, k, s),
                blend_channel(from.g, to.g, k, s),
                blend_channel(from.b, to.b, k, s),
            )
        })
        .collect()
}

fn blend_channel(c1: u8, c2: u8, k: f64, s: f64) -> u8 {
    (c2 as f64 / s * k + c1 as f64 / s * (s - k)).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::{Direction, EngineConfig, ShowType, Transition};

    const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };
    const BLUE: Rgb = Rgb { r: 0, g: 0, b: 255 };

    fn chase_config() -> EngineConfig {
        EngineConfig {
            show_type: ShowType::Chase,
            direction: Direction::LeftRight,
            speed: 60,
            size: 50,
            splits: 1,
            transition: Transition::Both,
            transition_width: 0.0,
            bounce: false,
            colors: vec![RED, BLUE],
        }
    }

    #[test]
    fn test_frames_per_beat_follows_bpm() {
        assert_eq!(frames_per_beat(60), 40);
        assert_eq!(frames_per_beat(120), 20);
        assert_eq!(frames_per_beat(10), 240);
        assert_eq!(frames_per_beat(180), 13);
    }

    #[test]
    fn test_chase_shows_first_color_then_second_after_a_beat() {
        let mut engine = EffectsEngine::new(chase_config(), 1);
        engine.set_fixture_count(10);

        engine.run();
        assert_eq!(engine.beat(), 1);
        assert_eq!(engine.frame(), 1);
        assert_eq!(engine.fixture_color(0), RED);

        // Stay red through the remainder of beat 1.
        for _ in 0..engine.frames_per_beat() - 1 {
            engine.run();
            assert_eq!(engine.fixture_color(0), RED);
        }

        // The next frame rolls the beat counter over.
        engine.run();
        assert_eq!(engine.beat(), 2);
        assert_eq!(engine.fixture_color(0), BLUE);
    }

    #[test]
    fn test_identically_seeded_engines_match_exactly() {
        let mut config = chase_config();
        config.direction = Direction::Random;
        let mut a = EffectsEngine::new(config.clone(), 7);
        let mut b = EffectsEngine::new(config, 7);
        a.set_fixture_count(50);
        b.set_fixture_count(50);

        for _ in 0..100 {
            a.run();
            b.run();
            for i in 0..50 {
                assert_eq!(a.fixture_color(i), b.fixture_color(i));
            }
        }
    }

    #[test]
    fn test_static_show_halves_the_canvas() {
        let mut config = chase_config();
        config.show_type = ShowType::Static;
        let mut engine = EffectsEngine::new(config, 1);
        engine.run();
        engine.set_fixture_count(CANVAS_SIZE);

        assert_eq!(engine.fixture_color(0), RED);
        assert_eq!(engine.fixture_color(2499), RED);
        assert_eq!(engine.fixture_color(2500), BLUE);
        assert_eq!(engine.fixture_color(4999), BLUE);

        // Static canvases do not move between frames.
        engine.run();
        assert_eq!(engine.fixture_color(0), RED);
    }

    #[test]
    fn test_static_transition_interpolates_between_colors() {
        let mut config = chase_config();
        config.show_type = ShowType::Static;
        config.transition_width = 0.2;
        let mut engine = EffectsEngine::new(config, 1);
        engine.run();
        engine.set_fixture_count(CANVAS_SIZE);

        // 2500 per color, 500-pixel fade: flat red through 1999, blended in
        // 2000..2500, flat blue after.
        assert_eq!(engine.fixture_color(1999), RED);
        let mid = engine.fixture_color(2249);
        assert!(mid.r > 0 && mid.r < 255);
        assert!(mid.b > 0 && mid.b < 255);
        assert_eq!(engine.fixture_color(2499), BLUE);
        assert_eq!(engine.fixture_color(2500), BLUE);
    }

    #[test]
    fn test_interpolation_endpoints_and_midpoint() {
        let ramp = interpolate(RED, BLUE, 4);
        assert_eq!(ramp.len(), 4);
        assert_eq!(ramp[3], BLUE);
        assert_eq!(ramp[1], Rgb::new(128, 0, 128));
    }

    #[test]
    fn test_splits_repeat_the_pattern() {
        let mut config = chase_config();
        config.show_type = ShowType::Static;
        config.splits = 2;
        let mut engine = EffectsEngine::new(config, 1);
        engine.run();
        engine.set_fixture_count(CANVAS_SIZE);

        assert_eq!(engine.fixture_color(0), RED);
        assert_eq!(engine.fixture_color(1250), BLUE);
        assert_eq!(engine.fixture_color(2500), RED);
        assert_eq!(engine.fixture_color(3750), BLUE);
    }

    #[test]
    fn test_all_show_is_uniform_per_split() {
        let mut config = chase_config();
        config.show_type = ShowType::All;
        config.speed = 180;
        let mut engine = EffectsEngine::new(config, 1);

        for _ in 0..200 {
            engine.run();
            engine.set_fixture_count(CANVAS_SIZE);
            let first = engine.fixture_color(0);
            assert!(first == RED || first == BLUE);
            for i in [1, 1000, 2500, 4999] {
                assert_eq!(engine.fixture_color(i), first);
            }
        }
    }

    #[test]
    fn test_rl_direction_mirrors_the_canvas() {
        let mut lr = EffectsEngine::new(
            EngineConfig {
                show_type: ShowType::Static,
                ..chase_config()
            },
            1,
        );
        let mut rl = EffectsEngine::new(
            EngineConfig {
                show_type: ShowType::Static,
                direction: Direction::RightLeft,
                ..chase_config()
            },
            1,
        );
        lr.run();
        rl.run();
        lr.set_fixture_count(CANVAS_SIZE);
        rl.set_fixture_count(CANVAS_SIZE);

        assert_eq!(lr.fixture_color(0), RED);
        assert_eq!(rl.fixture_color(0), BLUE);
        assert_eq!(rl.fixture_color(4999), RED);
    }

    #[test]
    fn test_mid_end_is_symmetric() {
        let mut engine = EffectsEngine::new(
            EngineConfig {
                show_type: ShowType::Static,
                direction: Direction::MidEnd,
                ..chase_config()
            },
            1,
        );
        engine.run();
        engine.set_fixture_count(CANVAS_SIZE);
        for i in [0, 100, 2000, 2499] {
            assert_eq!(
                engine.fixture_color(i),
                engine.fixture_color(CANVAS_SIZE - 1 - i),
                "pixel {i}"
            );
        }
    }

    #[test]
    fn test_bounce_reflects_the_beat_counter() {
        let mut config = chase_config();
        config.colors = vec![RED, BLUE, Rgb::new(0, 255, 0)];
        config.bounce = true;
        config.speed = 180; // 13 frames per beat keeps the test quick
        let mut engine = EffectsEngine::new(config, 1);

        let mut beats = Vec::new();
        for _ in 0..13 * 8 {
            engine.run();
            if beats.last() != Some(&engine.beat()) {
                beats.push(engine.beat());
            }
        }
        assert!(beats.starts_with(&[1, 2, 3, 2, 1, 2, 3]));
    }

    #[test]
    fn test_wrap_without_bounce_restarts_at_one() {
        let mut config = chase_config();
        config.speed = 180;
        let mut engine = EffectsEngine::new(config, 1);

        let mut beats = Vec::new();
        for _ in 0..13 * 5 {
            engine.run();
            if beats.last() != Some(&engine.beat()) {
                beats.push(engine.beat());
            }
        }
        assert!(beats.starts_with(&[1, 2, 1, 2, 1]));
    }

    #[test]
    fn test_fixture_sampling_strides_evenly() {
        let mut config = chase_config();
        config.show_type = ShowType::Static;
        let mut engine = EffectsEngine::new(config, 1);
        engine.run();

        engine.set_fixture_count(10);
        // Stride 500: segments 0..=4 sample the red half, 5..=9 the blue half.
        for i in 0..5 {
            assert_eq!(engine.fixture_color(i), RED);
        }
        for i in 5..10 {
            assert_eq!(engine.fixture_color(i), BLUE);
        }
    }

    #[test]
    fn test_zero_fixture_count_renders_black() {
        let mut engine = EffectsEngine::new(chase_config(), 1);
        engine.run();
        assert_eq!(engine.fixture_color(0), Rgb::BLACK);
    }

    #[test]
    fn test_fallback_engine_is_flat_gray_and_degraded() {
        let mut engine = EffectsEngine::fallback(3);
        engine.run();
        engine.set_fixture_count(4);
        assert!(engine.degraded());
        for i in 0..4 {
            assert_eq!(engine.fixture_color(i), Rgb::GRAY);
        }
    }

    #[test]
    fn test_pulse_base_surrounds_bursts_with_base_color() {
        let mut config = chase_config();
        config.show_type = ShowType::Pulse;
        config.size = 10;
        let engine = EffectsEngine::new(config, 1);

        let base = engine.build_pulse_base();
        // One burst of the second color plus a full canvas of the base color.
        assert_eq!(base.len(), 500 + CANVAS_SIZE);
        assert_eq!(base[0], BLUE);
        assert_eq!(base[499], BLUE);
        assert_eq!(base[500], RED);
        assert_eq!(base[base.len() - 1], RED);
    }
}
