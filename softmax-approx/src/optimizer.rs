use serde_derive::{Deserialize, Serialize};

use crate::big_theta::BigTheta;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Optimizer {
    StandardGradientDescent(StandardGradientDescentConfig),
    Adam(AdamConfig),
}

impl Optimizer {
    pub fn standard_gradient_descent(learning_rate: f64) -> Self {
        Optimizer::StandardGradientDescent(StandardGradientDescentConfig { learning_rate })
    }

    pub fn adam(learning_rate: f64) -> Self {
        Optimizer::Adam(AdamConfig::with_learning_rate(learning_rate))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardGradientDescentConfig {
    pub learning_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdamConfig {
    pub learning_rate: f64,
    pub momentum_decay: f64, // beta_1 in HOML
    pub scaling_decay: f64,  // beta_2 in HOML
    pub epsilon: f64,
}

impl AdamConfig {
    pub fn with_learning_rate(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            momentum_decay: 0.9,
            scaling_decay: 0.999,
            epsilon: 1e-8,
        }
    }
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self::with_learning_rate(0.001)
    }
}

/// An optimizer together with the running state it needs between steps.
#[derive(Debug, Clone)]
pub struct OptimizerState {
    optimizer: Optimizer,
    momentum: BigTheta, // first moment, Adam only
    s: BigTheta,        // second moment, Adam only
    steps: u32,
}

impl OptimizerState {
    pub fn new(optimizer: Optimizer, parameters: &BigTheta) -> Self {
        Self {
            optimizer,
            momentum: parameters.zeros_like(),
            s: parameters.zeros_like(),
            steps: 0,
        }
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Applies one update to `parameters` given the loss gradients.
    pub fn step(&mut self, parameters: &mut BigTheta, gradients: &BigTheta) {
        self.steps += 1;

        match &self.optimizer {
            Optimizer::StandardGradientDescent(config) => {
                let mut update = gradients.clone();
                update.mult_scalar_in_place(config.learning_rate);
                parameters.subtract_in_place(&update);
            }
            Optimizer::Adam(config) => {
                // see https://arxiv.org/pdf/1412.6980.pdf (the Adam paper)
                self.momentum.decay_towards(gradients, config.momentum_decay);

                let mut g_squared = gradients.clone();
                g_squared.elementwise_mult_in_place(gradients);
                self.s.decay_towards(&g_squared, config.scaling_decay);

                let t = self.steps as i32;
                let momentum_decay_t = config.momentum_decay.powi(t);
                let scaling_decay_t = config.scaling_decay.powi(t);

                let mut m_hat = self.momentum.clone();
                m_hat.mult_scalar_in_place(config.learning_rate / (1.0 - momentum_decay_t));

                let mut s_hat = self.s.clone();
                s_hat.mult_scalar_in_place(1.0 / (1.0 - scaling_decay_t));
                s_hat.elementwise_square_root_in_place();
                s_hat.add_scalar_to_each_element_in_place(config.epsilon);

                m_hat.elementwise_divide_in_place(&s_hat);
                parameters.subtract_in_place(&m_hat);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn single_param(value: f64) -> BigTheta {
        BigTheta {
            sizes: vec![1, 1],
            weights: vec![array![[value]]],
            biases: vec![array![0.0]],
        }
    }

    #[test]
    fn gradient_descent_step() {
        let mut params = single_param(1.0);
        let mut state = OptimizerState::new(Optimizer::standard_gradient_descent(0.1), &params);
        state.step(&mut params, &single_param(2.0));
        assert!((params.weights[0][[0, 0]] - 0.8).abs() < 1e-12);
        assert_eq!(params.biases[0][0], 0.0);
    }

    #[test]
    fn first_adam_step_moves_by_learning_rate() {
        // bias correction makes the first step lr * g / |g|
        let mut params = single_param(1.0);
        let mut state = OptimizerState::new(Optimizer::adam(0.01), &params);
        state.step(&mut params, &single_param(5.0));
        assert!((params.weights[0][[0, 0]] - 0.99).abs() < 1e-7);
        assert_eq!(state.steps(), 1);
    }

    #[test]
    fn adam_minimizes_a_quadratic() {
        // f(w) = (w - 3)^2
        let mut params = single_param(0.0);
        let mut state = OptimizerState::new(Optimizer::adam(0.1), &params);
        for _ in 0..500 {
            let w = params.weights[0][[0, 0]];
            state.step(&mut params, &single_param(2.0 * (w - 3.0)));
        }
        assert!((params.weights[0][[0, 0]] - 3.0).abs() < 5e-2);
    }

    #[test]
    fn optimizer_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Optimizer::adam(0.0001)).unwrap();
        assert!(json.starts_with(r#"{"kind":"adam","learning_rate":0.0001"#), "{}", json);
    }
}
