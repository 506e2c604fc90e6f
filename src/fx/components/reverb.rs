// src/fx/components/reverb.rs

//! A Schroeder-style reverb (4 parallel comb filters feeding 2 series
//! allpass diffusers), run as two slightly-detuned tanks for stereo width.
//! Grounded directly on the teacher's `fx_components/reverb.rs` comb/
//! allpass network, stripped of atomic parameter storage; stereo-aware per
//! spec §4.7.

#[derive(Debug, Clone, Copy, Default)]
struct DampingFilter {
    z1: f32,
}

impl DampingFilter {
    fn process(&mut self, input: f32, coeff: f32) -> f32 {
        let output = input * (1.0 - coeff) + self.z1 * coeff;
        self.z1 = output;
        output
    }
}

struct CombFilter {
    buffer: Vec<f32>,
    write_pos: usize,
    delay_length: usize,
    damping_filter: DampingFilter,
}

impl CombFilter {
    fn new(max_delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_delay_samples.max(1)],
            write_pos: 0,
            delay_length: max_delay_samples.max(1),
            damping_filter: DampingFilter::default(),
        }
    }

    fn process(&mut self, input: f32, feedback: f32, damping: f32) -> f32 {
        let read_index = (self.write_pos + self.buffer.len() - self.delay_length) % self.buffer.len();
        let output = self.buffer[read_index];
        let damped_output = self.damping_filter.process(output, damping);
        self.buffer[self.write_pos] = input + damped_output * feedback;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        output
    }
}

struct AllPassFilter {
    buffer: Vec<f32>,
    write_pos: usize,
    delay_length: usize,
}

impl AllPassFilter {
    fn new(max_delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_delay_samples.max(1)],
            write_pos: 0,
            delay_length: max_delay_samples.max(1),
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let read_index = (self.write_pos + self.buffer.len() - self.delay_length) % self.buffer.len();
        let delayed = self.buffer[read_index];
        let output = -input + delayed;
        self.buffer[self.write_pos] = input + delayed * 0.5;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        output
    }
}

struct Tank {
    combs: [CombFilter; 4],
    allpasses: [AllPassFilter; 2],
}

impl Tank {
    fn new(sample_rate: f32, detune: f32) -> Self {
        let sr_factor = sample_rate / 44_100.0 * detune;
        let comb_delays = [1117.0, 1187.0, 1277.0, 1351.0];
        let allpass_delays = [223.0, 557.0];
        Self {
            combs: std::array::from_fn(|i| CombFilter::new((comb_delays[i] * sr_factor * 1.5) as usize)),
            allpasses: std::array::from_fn(|i| AllPassFilter::new((allpass_delays[i] * sr_factor * 1.5) as usize)),
        }
    }

    fn process(&mut self, input: f32, decay: f32, damping: f32) -> f32 {
        let comb_out: f32 = self.combs.iter_mut().map(|c| c.process(input, decay, damping)).sum::<f32>() * 0.25;
        self.allpasses.iter_mut().fold(comb_out, |acc, ap| ap.process(acc))
    }
}

pub struct Reverb {
    left: Tank,
    right: Tank,
    size: f32,
    decay: f32,
    damping: f32,
}

impl Reverb {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            left: Tank::new(sample_rate, 1.0),
            right: Tank::new(sample_rate, 1.03),
            size: 0.7,
            decay: 0.8,
            damping: 0.5,
        }
    }

    pub fn process(&mut self, input: f32) -> (f32, f32) {
        let damping_coeff = self.damping.powf(2.0) * 0.4 + 0.05;
        let decay = self.decay * (0.5 + self.size * 0.5);
        let l = self.left.process(input, decay, damping_coeff);
        let r = self.right.process(input, decay, damping_coeff);
        (l, r)
    }

    pub fn set_parameter(&mut self, param_id: u16, value: f32) {
        match param_id {
            0 => self.size = value.clamp(0.0, 1.0),
            1 => self.decay = value.clamp(0.0, 0.97),
            2 => self.damping = value.clamp(0.0, 1.0),
            _ => {}
        }
    }
}
