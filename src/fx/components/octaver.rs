// src/fx/components/octaver.rs

//! A sub-octave generator: a zero-crossing detector drives a divide-by-two
//! square wave that rides along with the input, approximating an analog
//! octave-down pedal without pitch tracking. Grounded on the spread of
//! zero-crossing/flip-flop dividers in `original_source/engines` (the FM
//! operator's phase wrap logic), applied here as an FX-bus effect.

pub struct Octaver {
    last_input_sign: bool,
    flip_flop: bool,
    sub_level: f32,
    dry_level: f32,
    envelope: f32,
}

impl Octaver {
    pub fn new(_sample_rate: f32) -> Self {
        Self {
            last_input_sign: true,
            flip_flop: true,
            sub_level: 0.6,
            dry_level: 0.4,
            envelope: 0.0,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let sign = input >= 0.0;
        if sign != self.last_input_sign && sign {
            self.flip_flop = !self.flip_flop;
        }
        self.last_input_sign = sign;

        self.envelope = self.envelope * 0.999 + input.abs() * 0.001;
        let sub = if self.flip_flop { self.envelope } else { -self.envelope };

        input * self.dry_level + sub * self.sub_level
    }

    pub fn set_parameter(&mut self, param_id: u16, value: f32) {
        match param_id {
            0 => self.sub_level = value.clamp(0.0, 1.0),
            1 => self.dry_level = value.clamp(0.0, 1.0),
            _ => {}
        }
    }
}
