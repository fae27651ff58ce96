mod dataset;

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use tch::nn::{self, ModuleT, OptimizerConfig};
use tch::{Device, Kind};

use shared::net::leaf_cnn;
use shared::{CLASS_NAMES, IMAGE_SIZE, NUM_CLASSES};

#[derive(Parser, Debug)]
#[command(name = "trainer")]
#[command(about = "Offline trainer for the leaf disease classifier")]
struct Cli {
    /// Dataset directory with one subdirectory of images per class
    #[arg(long, env = "DATA_DIR", default_value = "dataset")]
    data_dir: PathBuf,

    /// Where to write the trained weights
    #[arg(long, env = "MODEL_PATH", default_value = "model/disease_model.ot")]
    output: PathBuf,

    /// Square image size; must match the serving contract
    #[arg(long, default_value_t = 224)]
    image_size: u32,

    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    #[arg(long, default_value_t = 10)]
    epochs: usize,

    /// Optional cap on training batches per epoch
    #[arg(long)]
    steps_per_epoch: Option<usize>,

    /// Fraction of the dataset held out for validation
    #[arg(long, default_value_t = 0.2)]
    val_split: f64,

    /// Seed for the reproducible train/validation split
    #[arg(long, default_value_t = 1337)]
    seed: u64,

    #[arg(long, default_value_t = 1e-3)]
    learning_rate: f64,
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let cli = Cli::parse();

    if cli.image_size != IMAGE_SIZE {
        bail!(
            "image size {} does not match the serving contract of {}",
            cli.image_size,
            IMAGE_SIZE
        );
    }
    if !(0.0..1.0).contains(&cli.val_split) {
        bail!("validation split {} must be in [0, 1)", cli.val_split);
    }

    let device = Device::cuda_if_available();
    log::info!("Training on {:?}", device);

    let samples = dataset::load_samples(&cli.data_dir)?;
    if samples.is_empty() {
        bail!(
            "no images found under {} ({} class directories expected)",
            cli.data_dir.display(),
            CLASS_NAMES.len()
        );
    }
    log::info!(
        "Found {} images across {} classes",
        samples.len(),
        CLASS_NAMES.len()
    );

    let split = dataset::split_samples(samples, cli.val_split, cli.seed);
    log::info!(
        "{} training / {} validation images (seed {})",
        split.train.len(),
        split.validation.len(),
        cli.seed
    );

    let vs = nn::VarStore::new(device);
    let net = leaf_cnn(&vs.root(), NUM_CLASSES);
    let mut optimizer = nn::Adam::default().build(&vs, cli.learning_rate)?;

    for epoch in 1..=cli.epochs {
        let mut total_loss = 0.0;
        let mut steps = 0usize;
        for batch in split.train.chunks(cli.batch_size) {
            if let Some(cap) = cli.steps_per_epoch {
                if steps >= cap {
                    break;
                }
            }
            let (images, labels) = dataset::batch_tensors(batch, device)?;
            let loss = net
                .forward_t(&images, true)
                .cross_entropy_for_logits(&labels);
            optimizer.backward_step(&loss);
            total_loss += loss.double_value(&[]);
            steps += 1;
        }

        let accuracy = evaluate(&net, &split.validation, cli.batch_size, device)?;
        log::info!(
            "epoch {:3}: train loss {:.5}, val accuracy {:.2}%",
            epoch,
            total_loss / steps.max(1) as f64,
            accuracy * 100.0
        );
    }

    if let Some(parent) = cli.output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    vs.save(&cli.output)?;
    log::info!("Saved weights to {}", cli.output.display());
    Ok(())
}

fn evaluate(
    net: &nn::SequentialT,
    samples: &[dataset::Sample],
    batch_size: usize,
    device: Device,
) -> Result<f64> {
    if samples.is_empty() {
        return Ok(0.0);
    }
    let mut correct = 0i64;
    tch::no_grad(|| -> Result<()> {
        for batch in samples.chunks(batch_size) {
            let (images, labels) = dataset::batch_tensors(batch, device)?;
            let predicted = net.forward_t(&images, false).argmax(-1, false);
            correct += predicted
                .eq_tensor(&labels)
                .sum(Kind::Int64)
                .int64_value(&[]);
        }
        Ok(())
    })?;
    Ok(correct as f64 / samples.len() as f64)
}
