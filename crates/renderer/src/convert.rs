// Channel mapping and sample-rate conversion to the output device format

/// Converts decoded PCM into the output device's layout.
///
/// Channel mapping happens first, then linear-interpolation resampling. The
/// resampler carries its fractional position and the last input frame
/// across calls, so consecutive packets join without a click.
pub struct SampleConverter {
    input_rate: u32,
    output_rate: u32,
    input_channels: usize,
    output_channels: usize,
    step: f64,
    position: f64,
    last_frame: Option<Vec<f32>>,
}

impl SampleConverter {
    pub fn new(input_rate: u32, output_rate: u32, input_channels: u16, output_channels: u16) -> Self {
        let input_rate = input_rate.max(1);
        let output_rate = output_rate.max(1);
        Self {
            input_rate,
            output_rate,
            input_channels: input_channels.max(1) as usize,
            output_channels: output_channels.max(1) as usize,
            step: input_rate as f64 / output_rate as f64,
            position: 0.0,
            last_frame: None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.input_rate == self.output_rate && self.input_channels == self.output_channels
    }

    /// Output frames per input frame
    pub fn ratio(&self) -> f64 {
        self.output_rate as f64 / self.input_rate as f64
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() {
            return input.to_vec();
        }
        let mapped = if self.input_channels == self.output_channels {
            input.to_vec()
        } else {
            self.map_channels(input)
        };
        if self.input_rate == self.output_rate {
            mapped
        } else {
            self.resample(&mapped)
        }
    }

    /// Forget resampler history, e.g. after a seek.
    pub fn reset(&mut self) {
        self.position = 0.0;
        self.last_frame = None;
    }

    fn map_channels(&self, input: &[f32]) -> Vec<f32> {
        let (inc, outc) = (self.input_channels, self.output_channels);
        let frames = input.len() / inc;
        let mut output = Vec::with_capacity(frames * outc);

        for frame in input.chunks_exact(inc) {
            if inc == 1 {
                output.extend(std::iter::repeat(frame[0]).take(outc));
            } else if outc == 1 {
                output.push(frame.iter().sum::<f32>() / inc as f32);
            } else {
                // Extra output channels stay silent; surplus input channels are dropped
                output.extend((0..outc).map(|ch| frame.get(ch).copied().unwrap_or(0.0)));
            }
        }

        output
    }

    fn resample(&mut self, input: &[f32]) -> Vec<f32> {
        let channels = self.output_channels;
        let offset = usize::from(self.last_frame.is_some());
        let total = input.len() / channels + offset;
        if total < 2 {
            if total == 1 {
                self.last_frame = Some(self.frame_at(input, 0, offset));
            }
            return Vec::new();
        }

        let estimate = ((total as f64 - self.position) / self.step).ceil().max(0.0) as usize;
        let mut output = Vec::with_capacity(estimate * channels);

        while self.position + 1.0 < total as f64 {
            let index = self.position.floor() as usize;
            let frac = (self.position - index as f64) as f32;
            let a = self.frame_at(input, index, offset);
            let b = self.frame_at(input, index + 1, offset);
            output.extend(a.iter().zip(&b).map(|(x, y)| x + (y - x) * frac));
            self.position += self.step;
        }

        self.position -= (total - 1) as f64;
        self.last_frame = Some(self.frame_at(input, total - 1, offset));
        output
    }

    fn frame_at(&self, input: &[f32], index: usize, offset: usize) -> Vec<f32> {
        match (&self.last_frame, index) {
            (Some(last), 0) if offset == 1 => last.clone(),
            _ => {
                let start = (index - offset) * self.output_channels;
                input[start..start + self.output_channels].to_vec()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mono_to_stereo_duplicates() {
        let mut conv = SampleConverter::new(44100, 44100, 1, 2);
        assert_eq!(conv.process(&[0.1, 0.2]), vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_stereo_to_mono_averages() {
        let mut conv = SampleConverter::new(44100, 44100, 2, 1);
        let out = conv.process(&[0.2, 0.4, -1.0, 1.0]);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.3).abs() < 1e-6);
        assert_eq!(out[1], 0.0);
    }

    #[test]
    fn test_stereo_to_quad_pads_silence() {
        let mut conv = SampleConverter::new(48000, 48000, 2, 4);
        assert_eq!(conv.process(&[0.5, -0.5]), vec![0.5, -0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_upsampling_doubles_frames_across_chunks() {
        let mut conv = SampleConverter::new(8000, 16000, 1, 1);
        let mut produced = 0;
        for _ in 0..10 {
            let out = conv.process(&[0.25; 100]);
            assert!(out.iter().all(|s| (s - 0.25).abs() < 1e-6));
            produced += out.len();
        }
        // One trailing input frame is held back for interpolation
        assert!((produced as i64 - 2000).abs() <= 2, "produced {}", produced);
    }

    #[test]
    fn test_interpolates_between_samples() {
        let mut conv = SampleConverter::new(1, 2, 1, 1);
        let out = conv.process(&[0.0, 1.0, 0.0]);
        assert_eq!(out, vec![0.0, 0.5, 1.0, 0.5]);
    }

    #[test]
    fn test_passthrough_is_identity() {
        let mut conv = SampleConverter::new(48000, 48000, 2, 2);
        assert!(conv.is_passthrough());
        assert_eq!(conv.process(&[0.1, 0.2]), vec![0.1, 0.2]);
    }
}
