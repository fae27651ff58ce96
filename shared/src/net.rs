use image::DynamicImage;
use image::imageops::FilterType;
use tch::{Tensor, nn};

use crate::IMAGE_SIZE;

// Conv trunk with a global-average-pooled dense head. The final layer emits
// logits; softmax is applied at the inference boundary.
pub fn leaf_cnn(vs: &nn::Path, num_classes: i64) -> nn::SequentialT {
    let conv_cfg = nn::ConvConfig {
        padding: 1,
        ..Default::default()
    };
    nn::seq_t()
        .add(nn::conv2d(vs / "conv1", 3, 32, 3, conv_cfg))
        .add_fn(|xs| xs.relu().max_pool2d_default(2))
        .add(nn::conv2d(vs / "conv2", 32, 64, 3, conv_cfg))
        .add_fn(|xs| xs.relu().max_pool2d_default(2))
        .add(nn::conv2d(vs / "conv3", 64, 128, 3, conv_cfg))
        .add_fn(|xs| xs.relu().adaptive_avg_pool2d([1, 1]).flat_view())
        .add(nn::linear(vs / "fc1", 128, 128, Default::default()))
        .add_fn(|xs| xs.relu())
        .add_fn_t(|xs, train| xs.dropout(0.3, train))
        .add(nn::linear(vs / "output", 128, num_classes, Default::default()))
}

// Resize (not crop) to the square serving size, scale pixels into [0, 1] and
// lay the sample out channels-first for the conv stack. Used by the trainer
// and the backend so train/serve preprocessing cannot drift.
pub fn image_to_tensor(img: &DynamicImage) -> Tensor {
    let resized = img.resize_exact(IMAGE_SIZE, IMAGE_SIZE, FilterType::Triangle);
    let pixels: Vec<f32> = resized
        .to_rgb8()
        .into_raw()
        .into_iter()
        .map(|p| p as f32 / 255.0)
        .collect();
    let side = IMAGE_SIZE as i64;
    Tensor::from_slice(&pixels)
        .view([side, side, 3])
        .permute([2, 0, 1])
}
