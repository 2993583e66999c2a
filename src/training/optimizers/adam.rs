//! Adam optimizer with optional decoupled weight decay
//!
//! Follows the usual bias-corrected update:
//! `m = b1*m + (1-b1)*g`, `v = b2*v + (1-b2)*g^2`,
//! `theta = theta*(1 - lr*wd) - lr * m_hat / (sqrt(v_hat) + eps)`.

use std::collections::HashMap;

use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Optimizer, OptimizerState, OptimizerStateDict};
use crate::error::{Error, Result};

const OPTIMIZER_TYPE: &str = "adam";

/// Adam hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    /// Learning rate
    pub learning_rate: f64,
    /// Beta1 parameter (momentum)
    pub beta1: f64,
    /// Beta2 parameter (RMSprop)
    pub beta2: f64,
    /// Epsilon for numerical stability
    pub epsilon: f64,
    /// Decoupled weight decay coefficient
    pub weight_decay: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay: 0.0,
        }
    }
}

impl AdamConfig {
    /// Validate hyper-parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(Error::config(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        for (name, beta) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(Error::config(format!("{} must be in [0, 1), got {}", name, beta)));
            }
        }
        if self.epsilon <= 0.0 {
            return Err(Error::config("epsilon must be positive"));
        }
        if self.weight_decay < 0.0 {
            return Err(Error::config("weight decay must be non-negative"));
        }
        Ok(())
    }
}

/// Adam optimizer over the variables of a [`VarMap`]
pub struct Adam {
    /// Parameters in name order
    vars: Vec<(String, Var)>,

    /// Hyper-parameters
    config: AdamConfig,

    /// Current step count
    step_count: usize,

    /// First moment estimates, created lazily on the first update
    first_moments: HashMap<String, Tensor>,

    /// Second moment estimates
    second_moments: HashMap<String, Tensor>,
}

impl Adam {
    /// Create an optimizer over every variable currently in `var_map`
    pub fn new(var_map: &VarMap, config: AdamConfig) -> candle_core::Result<Self> {
        let mut vars: Vec<(String, Var)> = var_map
            .data()
            .lock()
            .map_err(|e| candle_core::Error::Msg(format!("var map lock poisoned: {}", e)))?
            .iter()
            .map(|(name, var)| (name.clone(), var.clone()))
            .collect();
        vars.sort_by(|a, b| a.0.cmp(&b.0));

        debug!("Adam over {} parameter tensors: {:?}", vars.len(), config);

        Ok(Self {
            vars,
            config,
            step_count: 0,
            first_moments: HashMap::new(),
            second_moments: HashMap::new(),
        })
    }

    /// Hyper-parameters in effect
    pub fn config(&self) -> &AdamConfig {
        &self.config
    }

    fn moment_or_zeros(moments: &HashMap<String, Tensor>, name: &str, like: &Tensor) -> candle_core::Result<Tensor> {
        match moments.get(name) {
            Some(moment) => Ok(moment.clone()),
            None => like.zeros_like(),
        }
    }
}

impl Optimizer for Adam {
    fn name(&self) -> &str {
        OPTIMIZER_TYPE
    }

    fn step(&mut self, gradients: &GradStore) -> candle_core::Result<()> {
        self.step_count += 1;

        let AdamConfig {
            learning_rate: lr,
            beta1,
            beta2,
            epsilon,
            weight_decay,
        } = self.config;
        let bias_correction1 = 1.0 - beta1.powi(self.step_count as i32);
        let bias_correction2 = 1.0 - beta2.powi(self.step_count as i32);

        for (name, var) in &self.vars {
            let theta = var.as_tensor();
            let Some(grad) = gradients.get(theta) else {
                continue;
            };

            let m = Self::moment_or_zeros(&self.first_moments, name, theta)?;
            let v = Self::moment_or_zeros(&self.second_moments, name, theta)?;

            let m = ((m * beta1)? + (grad * (1.0 - beta1))?)?;
            let v = ((v * beta2)? + (grad.sqr()? * (1.0 - beta2))?)?;

            let m_hat = (&m / bias_correction1)?;
            let v_hat = (&v / bias_correction2)?;
            let update = (m_hat / (v_hat.sqrt()? + epsilon)?)?;

            let decayed = if weight_decay > 0.0 {
                (theta * (1.0 - lr * weight_decay))?
            } else {
                theta.clone()
            };
            var.set(&(decayed - (update * lr)?)?)?;

            self.first_moments.insert(name.clone(), m);
            self.second_moments.insert(name.clone(), v);
        }

        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.config.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.config.learning_rate = lr;
    }

    fn step_count(&self) -> usize {
        self.step_count
    }

    fn parameter_count(&self) -> usize {
        self.vars.len()
    }

    fn state_dict(&self) -> OptimizerStateDict {
        let mut tensors = HashMap::new();
        for (name, m) in &self.first_moments {
            tensors.insert(format!("m.{}", name), m.clone());
        }
        for (name, v) in &self.second_moments {
            tensors.insert(format!("v.{}", name), v.clone());
        }

        OptimizerStateDict {
            state: OptimizerState {
                optimizer_type: OPTIMIZER_TYPE.to_string(),
                step_count: self.step_count,
                config: self.config.clone(),
            },
            tensors,
        }
    }

    fn load_state_dict(&mut self, state_dict: OptimizerStateDict) -> candle_core::Result<()> {
        let OptimizerStateDict { state, mut tensors } = state_dict;
        if state.optimizer_type != OPTIMIZER_TYPE {
            candle_core::bail!(
                "cannot load '{}' optimizer state into {}",
                state.optimizer_type,
                OPTIMIZER_TYPE
            );
        }

        let mut first_moments = HashMap::new();
        let mut second_moments = HashMap::new();
        for (name, var) in &self.vars {
            let theta = var.as_tensor();
            for (prefix, moments) in [("m", &mut first_moments), ("v", &mut second_moments)] {
                let key = format!("{}.{}", prefix, name);
                // Moments only exist once a parameter has received a gradient.
                let Some(moment) = tensors.remove(&key) else {
                    continue;
                };
                if moment.dims() != theta.dims() {
                    candle_core::bail!(
                        "optimizer state '{}' has shape {:?}, parameter has {:?}",
                        key,
                        moment.dims(),
                        theta.dims()
                    );
                }
                let moment = moment.to_dtype(theta.dtype())?.to_device(theta.device())?;
                moments.insert(name.clone(), moment);
            }
        }

        if let Some(unknown) = tensors.keys().next() {
            candle_core::bail!("optimizer state '{}' matches no parameter", unknown);
        }

        self.first_moments = first_moments;
        self.second_moments = second_moments;
        self.step_count = state.step_count;
        self.config = state.config;
        Ok(())
    }
}
