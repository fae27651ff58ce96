use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tch::{Device, Tensor};

use shared::{CLASS_NAMES, has_allowed_extension};

pub struct Sample {
    pub path: PathBuf,
    pub label: i64,
}

pub struct DatasetSplit {
    pub train: Vec<Sample>,
    pub validation: Vec<Sample>,
}

// One subdirectory per class; sorted directory names define the label
// indices and must match the serving label table exactly.
pub fn load_samples(data_dir: &Path) -> Result<Vec<Sample>> {
    let mut class_dirs = Vec::new();
    for entry in fs::read_dir(data_dir)
        .with_context(|| format!("reading dataset directory {}", data_dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            class_dirs.push(entry.path());
        }
    }
    class_dirs.sort();

    let class_names: Vec<String> = class_dirs
        .iter()
        .filter_map(|dir| dir.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect();
    if class_names != CLASS_NAMES {
        bail!(
            "dataset classes {:?} do not match the serving label table of {} classes",
            class_names,
            CLASS_NAMES.len()
        );
    }

    let mut samples = Vec::new();
    for (label, class_dir) in class_dirs.iter().enumerate() {
        for entry in fs::read_dir(class_dir)
            .with_context(|| format!("reading class directory {}", class_dir.display()))?
        {
            let path = entry?.path();
            let is_image = path
                .file_name()
                .map(|name| has_allowed_extension(&name.to_string_lossy()))
                .unwrap_or(false);
            if path.is_file() && is_image {
                samples.push(Sample {
                    path,
                    label: label as i64,
                });
            }
        }
    }
    Ok(samples)
}

// Seeded shuffle, then the validation fraction is split off the front; the
// same seed always produces the same split.
pub fn split_samples(mut samples: Vec<Sample>, val_fraction: f64, seed: u64) -> DatasetSplit {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);
    let validation_len = ((samples.len() as f64) * val_fraction).round() as usize;
    let train = samples.split_off(validation_len.min(samples.len()));
    DatasetSplit {
        train,
        validation: samples,
    }
}

pub fn batch_tensors(samples: &[Sample], device: Device) -> Result<(Tensor, Tensor)> {
    let mut images = Vec::with_capacity(samples.len());
    let mut labels = Vec::with_capacity(samples.len());
    for sample in samples {
        let img = image::open(&sample.path)
            .with_context(|| format!("decoding {}", sample.path.display()))?;
        images.push(shared::net::image_to_tensor(&img));
        labels.push(sample.label);
    }
    Ok((
        Tensor::stack(&images, 0).to_device(device),
        Tensor::from_slice(&labels).to_device(device),
    ))
}
