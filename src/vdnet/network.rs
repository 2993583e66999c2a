//! Fully-connected VDNet implementation on candle

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder, VarMap};
use tracing::debug;

use super::{ForwardMode, GenerativeModel, LatentParameters, ModelOutput};
use crate::config::VdnetConfig;
use crate::error::{Error, Result};

/// Conditional VAE over flattened images
///
/// The encoder maps the input image to posterior parameters, the context path
/// maps it to conditioning features, and the decoder turns
/// `[context, z]` into an output image in `[0, 1]`.
pub struct VDNet {
    config: VdnetConfig,
    var_map: VarMap,
    encoder_hidden: Linear,
    encoder_head: Linear,
    context: Linear,
    decoder_hidden: Linear,
    decoder_out: Linear,
    device: Device,
}

impl VDNet {
    /// Build a freshly initialised network on `device`
    pub fn new(config: VdnetConfig, device: &Device) -> Result<Self> {
        config.validate()?;

        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, device);

        let (input_dim, output_dim) = (config.input_dim(), config.output_dim());
        let (hidden, latent) = (config.hidden_dim, config.latent_dim);

        let encoder_hidden = linear(input_dim, hidden, vb.pp("encoder.hidden"))?;
        let encoder_head = linear(hidden, 2 * latent, vb.pp("encoder.head"))?;
        let context = linear(input_dim, hidden, vb.pp("context"))?;
        let decoder_hidden = linear(hidden + latent, hidden, vb.pp("decoder.hidden"))?;
        let decoder_out = linear(hidden, output_dim, vb.pp("decoder.out"))?;

        debug!(
            "Built VDNet {:?} -> {:?} (hidden={}, latent={})",
            config.input_shape, config.output_shape, hidden, latent
        );

        Ok(Self {
            config,
            var_map,
            encoder_hidden,
            encoder_head,
            context,
            decoder_hidden,
            decoder_out,
            device: device.clone(),
        })
    }

    /// Architecture configuration
    pub fn config(&self) -> &VdnetConfig {
        &self.config
    }

    /// Device holding the parameters
    pub fn device(&self) -> &Device {
        &self.device
    }

    fn flatten_inputs(&self, inputs: &Tensor) -> Result<Tensor> {
        let (_, c, h, w) = inputs.dims4()?;
        if [c, h, w] != self.config.input_shape {
            return Err(Error::config(format!(
                "VDNet expects inputs of shape {:?}, got {:?}",
                self.config.input_shape,
                [c, h, w]
            )));
        }
        Ok(inputs.flatten_from(1)?)
    }

    fn encode(&self, flat: &Tensor) -> Result<LatentParameters> {
        let latent = self.config.latent_dim;
        let hidden = self.encoder_hidden.forward(flat)?.relu()?;
        let stats = self.encoder_head.forward(&hidden)?;

        Ok(LatentParameters {
            mean: stats.narrow(1, 0, latent)?.contiguous()?,
            log_var: stats.narrow(1, latent, latent)?.contiguous()?,
        })
    }

    fn reparameterize(latent: &LatentParameters) -> Result<Tensor> {
        let std = (&latent.log_var * 0.5)?.exp()?;
        let eps = latent.mean.randn_like(0.0, 1.0)?;
        Ok((&latent.mean + (std * eps)?)?)
    }

    fn decode(&self, context: &Tensor, z: &Tensor) -> Result<Tensor> {
        let batch = context.dim(0)?;
        let [c, h, w] = self.config.output_shape;

        let joint = Tensor::cat(&[context, z], 1)?;
        let hidden = self.decoder_hidden.forward(&joint)?.relu()?;
        let logits = self.decoder_out.forward(&hidden)?;
        let output = candle_nn::ops::sigmoid(&logits)?;

        Ok(output.reshape((batch, c, h, w))?)
    }
}

impl GenerativeModel for VDNet {
    fn name(&self) -> &str {
        "vdnet"
    }

    fn forward(&self, inputs: &Tensor, mode: ForwardMode) -> Result<ModelOutput> {
        let flat = self.flatten_inputs(inputs)?;
        let context = self.context.forward(&flat)?.relu()?;

        match mode {
            ForwardMode::Reconstruct => {
                let latent = self.encode(&flat)?;
                let z = Self::reparameterize(&latent)?;
                let reconstruction = self.decode(&context, &z)?;
                Ok(ModelOutput { reconstruction, latent: Some(latent) })
            }
            ForwardMode::SamplePrior => {
                let batch = flat.dim(0)?;
                let z = Tensor::randn(0f32, 1f32, (batch, self.config.latent_dim), &self.device)?;
                let reconstruction = self.decode(&context, &z)?;
                Ok(ModelOutput { reconstruction, latent: None })
            }
        }
    }

    fn var_map(&self) -> &VarMap {
        &self.var_map
    }

    fn var_map_mut(&mut self) -> &mut VarMap {
        &mut self.var_map
    }
}
