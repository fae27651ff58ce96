use std::path::Path;
use std::sync::{Arc, Mutex};

use tch::nn::ModuleT;
use tch::{Device, Kind, Tensor, nn};

use shared::NUM_CLASSES;
use shared::net::leaf_cnn;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Failed to load weights: {0}")]
    Load(tch::TchError),
    #[error("Inference failed: {0}")]
    Forward(tch::TchError),
}

struct ClassifierInner {
    net: nn::SequentialT,
    device: Device,
    // The store owns the weight tensors; it must live as long as the net.
    _vs: nn::VarStore,
}

#[derive(Clone)]
pub struct Classifier {
    inner: Arc<Mutex<ClassifierInner>>,
}

impl Classifier {
    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let device = Device::cuda_if_available();
        let mut vs = nn::VarStore::new(device);
        let net = leaf_cnn(&vs.root(), NUM_CLASSES);
        vs.load(path).map_err(ClassifierError::Load)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(ClassifierInner {
                net,
                device,
                _vs: vs,
            })),
        })
    }

    pub fn predict(&self, input: &Tensor) -> Result<Vec<f32>, ClassifierError> {
        let inner = self.inner.lock().unwrap();
        let input = input.to_device(inner.device);
        let output = inner
            .net
            .forward_t(&input, false)
            .f_softmax(-1, Kind::Float)
            .map_err(ClassifierError::Forward)?;
        let output_flat = output.to_kind(Kind::Float).view([-1]);
        let num_elements = output_flat.size()[0] as usize;
        let mut probabilities = vec![0.0f32; num_elements];
        output_flat.copy_data(&mut probabilities, num_elements);
        Ok(probabilities)
    }
}
