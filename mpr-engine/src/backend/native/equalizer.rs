//! 32-band equalizer
//!
//! Band `i` is a peaking biquad centred on `(i + 0.5) * rate / 64`, so the
//! bands line up with the MPEG polyphase sub-bands. A band factor is a linear
//! gain; 1.0 is neutral and the band is bypassed.

use crate::backend::{ChannelGroup, EQ_BANDS};

/// Lowest gain applied for a factor of zero
const MIN_GAIN_DB: f64 = -60.0;

#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    fn peaking(sample_rate: f64, frequency: f64, q: f64, gain_db: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        // Keep the centre away from Nyquist
        let frequency = frequency.min(sample_rate * 0.45);
        let omega = 2.0 * std::f64::consts::PI * frequency / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q);

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_omega) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_omega) / a0,
            a2: (1.0 - alpha / a) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, x: f64) -> f64 {
        let mut y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2 - self.a1 * self.y1 - self.a2 * self.y2;
        if y.abs() < 1e-15 {
            y = 0.0;
        }
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// Band factors plus the filters built from them for one channel
#[derive(Debug, Clone)]
struct ChannelBands {
    factors: [f64; EQ_BANDS],
    filters: Vec<(usize, Biquad)>,
}

impl ChannelBands {
    fn new() -> Self {
        Self {
            factors: [1.0; EQ_BANDS],
            filters: Vec::new(),
        }
    }

    fn rebuild(&mut self, sample_rate: u32) {
        self.filters.clear();
        if sample_rate == 0 {
            return;
        }
        let rate = sample_rate as f64;
        for (band, &factor) in self.factors.iter().enumerate() {
            if (factor - 1.0).abs() < f64::EPSILON {
                continue;
            }
            let centre = (band as f64 + 0.5) * rate / (2.0 * EQ_BANDS as f64);
            let gain_db = if factor > 0.0 {
                (20.0 * factor.log10()).max(MIN_GAIN_DB)
            } else {
                MIN_GAIN_DB
            };
            let q = band as f64 + 0.5;
            self.filters.push((band, Biquad::peaking(rate, centre, q, gain_db)));
        }
    }

    #[inline]
    fn process(&mut self, sample: f64) -> f64 {
        self.filters
            .iter_mut()
            .fold(sample, |acc, (_, filter)| filter.process(acc))
    }
}

/// Left/right band sets applied to interleaved PCM
#[derive(Debug, Clone)]
pub struct Equalizer {
    sample_rate: u32,
    left: ChannelBands,
    right: ChannelBands,
}

impl Default for Equalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Equalizer {
    pub fn new() -> Self {
        Self {
            sample_rate: 0,
            left: ChannelBands::new(),
            right: ChannelBands::new(),
        }
    }

    /// Set one band's factor for a channel group
    pub fn set_band(&mut self, group: ChannelGroup, band: usize, factor: f64) {
        if band >= EQ_BANDS {
            return;
        }
        if matches!(group, ChannelGroup::Left | ChannelGroup::Both) {
            self.left.factors[band] = factor;
            self.left.rebuild(self.sample_rate);
        }
        if matches!(group, ChannelGroup::Right | ChannelGroup::Both) {
            self.right.factors[band] = factor;
            self.right.rebuild(self.sample_rate);
        }
    }

    pub fn band(&self, group: ChannelGroup, band: usize) -> f64 {
        if band >= EQ_BANDS {
            return 1.0;
        }
        match group {
            ChannelGroup::Left => self.left.factors[band],
            ChannelGroup::Right => self.right.factors[band],
            ChannelGroup::Both => (self.left.factors[band] + self.right.factors[band]) / 2.0,
        }
    }

    pub fn reset(&mut self) {
        self.left = ChannelBands::new();
        self.right = ChannelBands::new();
    }

    /// True when every band is neutral
    pub fn is_neutral(&self) -> bool {
        self.left.filters.is_empty() && self.right.filters.is_empty()
    }

    /// Filter interleaved samples in place. Channel 0 uses the left set,
    /// every other channel the right set.
    pub fn process(&mut self, samples: &mut [f32], channels: usize, sample_rate: u32) {
        if channels == 0 {
            return;
        }
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.left.rebuild(sample_rate);
            self.right.rebuild(sample_rate);
        }
        if self.is_neutral() {
            return;
        }

        for frame in samples.chunks_mut(channels) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                let bands = if ch == 0 { &mut self.left } else { &mut self.right };
                *sample = bands.process(*sample as f64) as f32;
            }
        }
    }
}
