use crate::{Point2i, Point2f, Float};
use rand_xoshiro::Xoshiro256Plus;
use rand::{SeedableRng, Rng};
use crate::sampler::{Sampler, SamplerState};

/// An independent, purely random sampler: every sample is an unstratified
/// uniform draw. Simple and unbiased but higher-variance than stratified or
/// low-discrepancy samplers for the same sample count.
pub struct RandomSampler {
    state: SamplerState,
    rng: Xoshiro256Plus,
}

impl RandomSampler {
    pub fn new_with_seed(samples_per_pixel: u64, seed: u64) -> Self {
        Self {
            state: SamplerState::new(samples_per_pixel as usize),
            rng: Xoshiro256Plus::seed_from_u64(seed),
        }
    }
}

impl Sampler for RandomSampler {
    fn start_pixel(&mut self, pixel: Point2i) {
        self.state.start_pixel(pixel);
        let rng = &mut self.rng;
        self.state.fill_arrays(
            || rng.gen(),
            || Point2f::new(rng.gen(), rng.gen()),
        );
    }

    fn start_next_sample(&mut self) -> bool {
        self.state.start_next_sample()
    }

    fn get_1d(&mut self) -> Float {
        self.rng.gen()
    }

    fn get_2d(&mut self) -> Point2f {
        Point2f::new(self.rng.gen(), self.rng.gen())
    }

    fn request_1d_array(&mut self, len: usize) {
        self.state.request_1d_array(len);
    }

    fn request_2d_array(&mut self, len: usize) {
        self.state.request_2d_array(len);
    }

    fn get_1d_array(&mut self, len: usize) -> &[Float] {
        self.state.get_1d_array(len)
    }

    fn get_2d_array(&mut self, len: usize) -> &[Point2f] {
        self.state.get_2d_array(len)
    }

    fn clone_with_seed(&self, seed: u64) -> Box<dyn Sampler> {
        Box::new(Self::new_with_seed(self.state.samples_per_pixel() as u64, seed))
    }

    fn samples_per_pixel(&self) -> usize {
        self.state.samples_per_pixel()
    }

    fn set_sample_number(&mut self, sample_num: u64) -> bool {
        self.state.set_sample_number(sample_num)
    }
}
