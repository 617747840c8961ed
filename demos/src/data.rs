//! Synthetic lesion images for the training demo.
//!
//! Each image is background noise with up to one axis-aligned square per
//! foreground class; every class has its own intensity so a small network
//! can learn the mapping.

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Generates `(image [N, 1, S, S], label [N, S, S])` batches.
#[derive(Debug, Clone)]
pub struct SyntheticLesions {
    rng: StdRng,
    image_size: usize,
    num_classes: usize,
}

impl SyntheticLesions {
    pub fn new(seed: u64, image_size: usize, num_classes: usize) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            image_size,
            num_classes,
        }
    }

    pub fn batch<B: Backend>(
        &mut self,
        batch_size: usize,
        device: &B::Device,
    ) -> (Tensor<B, 4>, Tensor<B, 3, Int>) {
        let size = self.image_size;
        let mut images = Vec::with_capacity(batch_size * size * size);
        let mut labels = Vec::with_capacity(batch_size * size * size);

        for _ in 0..batch_size {
            let (image, label) = self.sample();
            images.extend(image);
            labels.extend(label);
        }

        let images = Tensor::from_data(TensorData::new(images, [batch_size, 1, size, size]), device);
        let labels = Tensor::from_data(TensorData::new(labels, [batch_size, size, size]), device);
        (images, labels)
    }

    fn sample(&mut self) -> (Vec<f32>, Vec<i64>) {
        let size = self.image_size;
        let mut label = vec![0i64; size * size];

        for class in 1..self.num_classes {
            // a class is missing from roughly one image in four
            if self.rng.gen_bool(0.25) {
                continue;
            }
            let side = self.rng.gen_range(2..=(size / 3).max(2));
            let top = self.rng.gen_range(0..=size - side);
            let left = self.rng.gen_range(0..=size - side);
            for y in top..top + side {
                for x in left..left + side {
                    label[y * size + x] = class as i64;
                }
            }
        }

        let classes = self.num_classes as f32;
        let image = label
            .iter()
            .map(|&class| class as f32 / classes + self.rng.gen_range(-0.1..0.1))
            .collect();
        (image, label)
    }
}
