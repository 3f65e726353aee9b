// projeto: lstmcotacao
// file: src/neural/model.rs
// Rede sequencial LSTM(50) -> LSTM(50) -> Dense(25) -> Dense(1) com BPTT e Adam

use std::time::Instant;

use log::{debug, info};
use ndarray::linalg::general_mat_mul;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::neural::data::SEQ_LENGTH;
use crate::neural::utils::{glorot_uniform, orthogonal, sigmoid, tanh, AdamOptimizer, TrainingError};

pub const LSTM_UNITS: usize = 50;
pub const DENSE_UNITS: usize = 25;
pub const BATCH_SIZE: usize = 1;
pub const EPOCHS: usize = 1;

pub const LEARNING_RATE: f64 = 0.001;
pub const BETA1: f64 = 0.9;
pub const BETA2: f64 = 0.999;
pub const EPSILON: f64 = 1e-7;

const LOG_EVERY: usize = 250;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Loss {
    MeanSquaredError,
}

impl Loss {
    pub fn value(&self, prediction: f64, target: f64) -> f64 {
        match self {
            Loss::MeanSquaredError => (prediction - target).powi(2),
        }
    }

    pub fn gradient(&self, prediction: f64, target: f64) -> f64 {
        match self {
            Loss::MeanSquaredError => 2.0 * (prediction - target),
        }
    }
}

/// Camada LSTM. Os quatro portões ficam empilhados em `w`, `u` e `b`
/// na ordem input, forget, cell, output.
#[derive(Debug, Clone)]
pub struct LstmLayer {
    pub input_size: usize,
    pub hidden_size: usize,
    pub return_sequences: bool,
    pub w: Array2<f64>, // (4H, input)
    pub u: Array2<f64>, // (4H, H)
    pub b: Array1<f64>, // (4H)
}

#[derive(Debug, Clone)]
struct LstmStep {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    tanh_c: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct LstmCache {
    steps: Vec<LstmStep>,
}

#[derive(Debug, Clone)]
pub struct LstmGradients {
    pub w: Array2<f64>,
    pub u: Array2<f64>,
    pub b: Array1<f64>,
}

impl LstmLayer {
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        input_size: usize,
        hidden_size: usize,
        return_sequences: bool,
    ) -> Self {
        let mut b = Array1::zeros(4 * hidden_size);
        // Bias do forget gate começa em 1
        b.slice_mut(s![hidden_size..2 * hidden_size]).fill(1.0);

        LstmLayer {
            input_size,
            hidden_size,
            return_sequences,
            w: glorot_uniform(rng, 4 * hidden_size, input_size),
            u: orthogonal(rng, 4 * hidden_size, hidden_size),
            b,
        }
    }

    /// `input` tem forma (timesteps, input_size). Devolve (timesteps, H) com
    /// `return_sequences`, senão (1, H) com o último estado.
    pub fn forward(&self, input: ArrayView2<f64>) -> (Array2<f64>, LstmCache) {
        let h = self.hidden_size;
        let seq_len = input.nrows();
        let mut outputs = Array2::zeros((seq_len, h));
        let mut hidden = Array1::zeros(h);
        let mut cell = Array1::zeros(h);
        let mut steps = Vec::with_capacity(seq_len);

        for t in 0..seq_len {
            let x_t = input.row(t).to_owned();
            let z = self.w.dot(&x_t) + self.u.dot(&hidden) + &self.b;

            let i = sigmoid(&z.slice(s![..h]).to_owned());
            let f = sigmoid(&z.slice(s![h..2 * h]).to_owned());
            let g = tanh(&z.slice(s![2 * h..3 * h]).to_owned());
            let o = sigmoid(&z.slice(s![3 * h..]).to_owned());

            let new_cell = &f * &cell + &i * &g;
            let tanh_c = tanh(&new_cell);
            let new_hidden = &o * &tanh_c;
            outputs.row_mut(t).assign(&new_hidden);

            steps.push(LstmStep { x: x_t, h_prev: hidden, c_prev: cell, i, f, g, o, tanh_c });
            hidden = new_hidden;
            cell = new_cell;
        }

        let outputs = if self.return_sequences {
            outputs
        } else {
            outputs.slice(s![seq_len - 1.., ..]).to_owned()
        };
        (outputs, LstmCache { steps })
    }

    /// Retropropagação no tempo. `d_outputs` tem a mesma forma da saída de `forward`.
    /// Devolve os gradientes dos pesos e o gradiente em relação à entrada.
    pub fn backward(&self, cache: &LstmCache, d_outputs: ArrayView2<f64>) -> (LstmGradients, Array2<f64>) {
        let h = self.hidden_size;
        let seq_len = cache.steps.len();

        let mut d_hidden = Array2::<f64>::zeros((seq_len, h));
        if self.return_sequences {
            d_hidden.assign(&d_outputs);
        } else {
            d_hidden.row_mut(seq_len - 1).assign(&d_outputs.row(0));
        }

        let mut grads = LstmGradients {
            w: Array2::zeros(self.w.raw_dim()),
            u: Array2::zeros(self.u.raw_dim()),
            b: Array1::zeros(self.b.raw_dim()),
        };
        let mut d_inputs = Array2::zeros((seq_len, self.input_size));
        let mut dh_next = Array1::<f64>::zeros(h);
        let mut dc_next = Array1::<f64>::zeros(h);
        let mut dz = Array1::<f64>::zeros(4 * h);

        for t in (0..seq_len).rev() {
            let step = &cache.steps[t];
            let dh = &d_hidden.row(t) + &dh_next;

            let d_o = &dh * &step.tanh_c;
            let dc = &dc_next + &(&dh * &step.o * &step.tanh_c.mapv(|v| 1.0 - v * v));
            let d_i = &dc * &step.g;
            let d_g = &dc * &step.i;
            let d_f = &dc * &step.c_prev;
            dc_next = &dc * &step.f;

            // Derivadas das pré-ativações
            dz.slice_mut(s![..h]).assign(&(&d_i * &step.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![h..2 * h]).assign(&(&d_f * &step.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![2 * h..3 * h]).assign(&(&d_g * &step.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![3 * h..]).assign(&(&d_o * &step.o.mapv(|v| v * (1.0 - v))));

            accumulate_outer(&mut grads.w, &dz, &step.x);
            accumulate_outer(&mut grads.u, &dz, &step.h_prev);
            grads.b += &dz;

            d_inputs.row_mut(t).assign(&self.w.t().dot(&dz));
            dh_next = self.u.t().dot(&dz);
        }

        (grads, d_inputs)
    }

    fn apply_gradients(&mut self, name: &str, grads: &LstmGradients, optimizer: &mut AdamOptimizer) {
        optimizer.update(&format!("{}.w", name), &mut self.w, &grads.w);
        optimizer.update(&format!("{}.u", name), &mut self.u, &grads.u);
        optimizer.update(&format!("{}.b", name), &mut self.b, &grads.b);
    }

    pub fn num_parameters(&self) -> usize {
        self.w.len() + self.u.len() + self.b.len()
    }
}

/// Camada totalmente conectada com ativação linear.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    pub w: Array2<f64>, // (out, in)
    pub b: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct DenseGradients {
    pub w: Array2<f64>,
    pub b: Array1<f64>,
}

impl DenseLayer {
    pub fn new<R: Rng + ?Sized>(rng: &mut R, input_size: usize, output_size: usize) -> Self {
        DenseLayer {
            w: glorot_uniform(rng, output_size, input_size),
            b: Array1::zeros(output_size),
        }
    }

    pub fn input_size(&self) -> usize {
        self.w.ncols()
    }

    pub fn output_size(&self) -> usize {
        self.w.nrows()
    }

    pub fn forward(&self, input: &Array1<f64>) -> Array1<f64> {
        self.w.dot(input) + &self.b
    }

    pub fn backward(&self, input: &Array1<f64>, d_output: &Array1<f64>) -> (DenseGradients, Array1<f64>) {
        let mut w = Array2::zeros(self.w.raw_dim());
        accumulate_outer(&mut w, d_output, input);
        let grads = DenseGradients { w, b: d_output.clone() };
        (grads, self.w.t().dot(d_output))
    }

    fn apply_gradients(&mut self, name: &str, grads: &DenseGradients, optimizer: &mut AdamOptimizer) {
        optimizer.update(&format!("{}.w", name), &mut self.w, &grads.w);
        optimizer.update(&format!("{}.b", name), &mut self.b, &grads.b);
    }

    pub fn num_parameters(&self) -> usize {
        self.w.len() + self.b.len()
    }
}

/// target += a ⊗ b
fn accumulate_outer(target: &mut Array2<f64>, a: &Array1<f64>, b: &Array1<f64>) {
    let col = a.view().insert_axis(Axis(1));
    let row = b.view().insert_axis(Axis(0));
    general_mat_mul(1.0, &col, &row, 1.0, target);
}

#[derive(Debug, Clone)]
pub struct ModelGradients {
    pub lstm1: LstmGradients,
    pub lstm2: LstmGradients,
    pub dense1: DenseGradients,
    pub dense2: DenseGradients,
}

impl ModelGradients {
    fn zeros_like(model: &SequentialModel) -> Self {
        let lstm = |layer: &LstmLayer| LstmGradients {
            w: Array2::zeros(layer.w.raw_dim()),
            u: Array2::zeros(layer.u.raw_dim()),
            b: Array1::zeros(layer.b.raw_dim()),
        };
        let dense = |layer: &DenseLayer| DenseGradients {
            w: Array2::zeros(layer.w.raw_dim()),
            b: Array1::zeros(layer.b.raw_dim()),
        };
        ModelGradients {
            lstm1: lstm(&model.lstm1),
            lstm2: lstm(&model.lstm2),
            dense1: dense(&model.dense1),
            dense2: dense(&model.dense2),
        }
    }

    fn accumulate(&mut self, other: &ModelGradients) {
        for (acc, g) in [(&mut self.lstm1, &other.lstm1), (&mut self.lstm2, &other.lstm2)] {
            acc.w += &g.w;
            acc.u += &g.u;
            acc.b += &g.b;
        }
        for (acc, g) in [(&mut self.dense1, &other.dense1), (&mut self.dense2, &other.dense2)] {
            acc.w += &g.w;
            acc.b += &g.b;
        }
    }

    fn scale(&mut self, factor: f64) {
        for layer in [&mut self.lstm1, &mut self.lstm2] {
            layer.w *= factor;
            layer.u *= factor;
            layer.b *= factor;
        }
        for layer in [&mut self.dense1, &mut self.dense2] {
            layer.w *= factor;
            layer.b *= factor;
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForwardCache {
    lstm1: LstmCache,
    lstm2: LstmCache,
    last_hidden: Array1<f64>,
    dense_hidden: Array1<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    pub epoch_losses: Vec<f64>,
}

pub struct SequentialModel {
    seq_length: usize,
    lstm1: LstmLayer,
    lstm2: LstmLayer,
    dense1: DenseLayer,
    dense2: DenseLayer,
    optimizer: AdamOptimizer,
    loss: Loss,
}

/// Monta a rede com topologia fixa, compilada com Adam + MSE.
/// Sem `seed` os pesos iniciais vêm da entropia do sistema.
pub fn build_lstm_model(seed: Option<u64>) -> Result<SequentialModel, TrainingError> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let model = SequentialModel::new(
        SEQ_LENGTH,
        LstmLayer::new(&mut rng, 1, LSTM_UNITS, true),
        LstmLayer::new(&mut rng, LSTM_UNITS, LSTM_UNITS, false),
        DenseLayer::new(&mut rng, LSTM_UNITS, DENSE_UNITS),
        DenseLayer::new(&mut rng, DENSE_UNITS, 1),
        AdamOptimizer::new(LEARNING_RATE, BETA1, BETA2, EPSILON),
        Loss::MeanSquaredError,
    )?;

    info!("✅ Modelo criado com {} parâmetros", model.num_parameters());
    Ok(model)
}

impl SequentialModel {
    pub fn new(
        seq_length: usize,
        lstm1: LstmLayer,
        lstm2: LstmLayer,
        dense1: DenseLayer,
        dense2: DenseLayer,
        optimizer: AdamOptimizer,
        loss: Loss,
    ) -> Result<Self, TrainingError> {
        if seq_length == 0 {
            return Err(TrainingError::ModelConfiguration("seq_length deve ser > 0".to_string()));
        }
        if lstm1.input_size != 1 || !lstm1.return_sequences {
            return Err(TrainingError::ModelConfiguration(
                "primeira LSTM deve receber 1 feature e devolver a sequência".to_string()
            ));
        }
        if lstm2.input_size != lstm1.hidden_size || lstm2.return_sequences {
            return Err(TrainingError::ModelConfiguration(
                "segunda LSTM deve consumir a sequência da primeira e devolver só o último estado".to_string()
            ));
        }
        if dense1.input_size() != lstm2.hidden_size
            || dense2.input_size() != dense1.output_size()
            || dense2.output_size() != 1
        {
            return Err(TrainingError::ModelConfiguration(
                "dimensões das camadas densas incompatíveis".to_string()
            ));
        }

        Ok(SequentialModel { seq_length, lstm1, lstm2, dense1, dense2, optimizer, loss })
    }

    pub fn seq_length(&self) -> usize {
        self.seq_length
    }

    pub fn num_parameters(&self) -> usize {
        self.lstm1.num_parameters()
            + self.lstm2.num_parameters()
            + self.dense1.num_parameters()
            + self.dense2.num_parameters()
    }

    fn forward_cached(&self, window: ArrayView1<f64>) -> Result<(f64, ForwardCache), TrainingError> {
        if window.len() != self.seq_length {
            return Err(TrainingError::Shape(format!(
                "janela com {} passos, esperado {}", window.len(), self.seq_length
            )));
        }

        let input = window.insert_axis(Axis(1));
        let (seq1, lstm1) = self.lstm1.forward(input);
        let (seq2, lstm2) = self.lstm2.forward(seq1.view());
        let last_hidden = seq2.row(0).to_owned();
        let dense_hidden = self.dense1.forward(&last_hidden);
        let output = self.dense2.forward(&dense_hidden)[0];

        Ok((output, ForwardCache { lstm1, lstm2, last_hidden, dense_hidden }))
    }

    fn backward(&self, cache: &ForwardCache, d_output: f64) -> ModelGradients {
        let d_output = Array1::from_elem(1, d_output);
        let (dense2, d_dense_hidden) = self.dense2.backward(&cache.dense_hidden, &d_output);
        let (dense1, d_last_hidden) = self.dense1.backward(&cache.last_hidden, &d_dense_hidden);
        let d_seq2 = d_last_hidden.insert_axis(Axis(0));
        let (lstm2, d_seq1) = self.lstm2.backward(&cache.lstm2, d_seq2.view());
        let (lstm1, _) = self.lstm1.backward(&cache.lstm1, d_seq1.view());

        ModelGradients { lstm1, lstm2, dense1, dense2 }
    }

    fn apply_gradients(&mut self, grads: &ModelGradients) {
        self.optimizer.next_iteration();
        self.lstm1.apply_gradients("lstm1", &grads.lstm1, &mut self.optimizer);
        self.lstm2.apply_gradients("lstm2", &grads.lstm2, &mut self.optimizer);
        self.dense1.apply_gradients("dense1", &grads.dense1, &mut self.optimizer);
        self.dense2.apply_gradients("dense2", &grads.dense2, &mut self.optimizer);
    }

    /// Treina sobre `x` (n, seq_length) e `y` (n). Um passo do Adam por lote;
    /// sem validação, sem early stopping.
    pub fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        batch_size: usize,
        epochs: usize,
    ) -> Result<TrainingHistory, TrainingError> {
        if x.nrows() != y.len() {
            return Err(TrainingError::Training(format!(
                "{} janelas para {} alvos", x.nrows(), y.len()
            )));
        }
        if x.nrows() == 0 {
            return Err(TrainingError::Training("nenhuma janela de treino".to_string()));
        }
        if batch_size == 0 {
            return Err(TrainingError::InvalidInput("batch_size deve ser > 0".to_string()));
        }

        let n = x.nrows();
        let num_batches = n.div_ceil(batch_size);
        let mut history = TrainingHistory::default();
        info!("🎓 Treinando {} janelas | batch={} | épocas={}", n, batch_size, epochs);

        for epoch in 1..=epochs {
            let epoch_start = Instant::now();
            let mut total_loss = 0.0;

            for batch_idx in 0..num_batches {
                let start = batch_idx * batch_size;
                let end = (start + batch_size).min(n);
                let mut grads = ModelGradients::zeros_like(self);
                let mut batch_loss = 0.0;

                for k in start..end {
                    let (prediction, cache) = self.forward_cached(x.row(k))?;
                    batch_loss += self.loss.value(prediction, y[k]);
                    grads.accumulate(&self.backward(&cache, self.loss.gradient(prediction, y[k])));
                }

                let count = (end - start) as f64;
                grads.scale(1.0 / count);
                self.apply_gradients(&grads);
                total_loss += batch_loss / count;

                if (batch_idx + 1) % LOG_EVERY == 0 {
                    debug!("   Época {} - lote {}/{} - loss: {:.6}",
                           epoch, batch_idx + 1, num_batches, total_loss / (batch_idx + 1) as f64);
                }
            }

            let epoch_loss = total_loss / num_batches as f64;
            if !epoch_loss.is_finite() {
                return Err(TrainingError::Training(format!("loss divergiu na época {}", epoch)));
            }
            info!("📈 Época {}/{}: loss={:.6} | {:.1}s",
                  epoch, epochs, epoch_loss, epoch_start.elapsed().as_secs_f64());
            history.epoch_losses.push(epoch_loss);
        }

        Ok(history)
    }

    pub fn predict_one(&self, window: ArrayView1<f64>) -> Result<f64, TrainingError> {
        self.forward_cached(window).map(|(output, _)| output)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, TrainingError> {
        x.rows()
            .into_iter()
            .map(|window| self.predict_one(window))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::metrics::calculate_regression_metrics;
    use ndarray::array;

    fn small_model(seed: u64) -> SequentialModel {
        let mut rng = StdRng::seed_from_u64(seed);
        SequentialModel::new(
            4,
            LstmLayer::new(&mut rng, 1, 3, true),
            LstmLayer::new(&mut rng, 3, 3, false),
            DenseLayer::new(&mut rng, 3, 2),
            DenseLayer::new(&mut rng, 2, 1),
            AdamOptimizer::new(0.01, BETA1, BETA2, EPSILON),
            Loss::MeanSquaredError,
        ).unwrap()
    }

    fn loss_at(model: &SequentialModel, window: ArrayView1<f64>, target: f64) -> f64 {
        let prediction = model.predict_one(window).unwrap();
        model.loss.value(prediction, target)
    }

    fn assert_gradients<F, G>(
        model: &mut SequentialModel,
        grads: &ModelGradients,
        window: ArrayView1<f64>,
        target: f64,
        name: &str,
        param: F,
        grad: G,
    ) where
        F: Fn(&mut SequentialModel) -> &mut [f64],
        G: Fn(&ModelGradients) -> &[f64],
    {
        let eps = 1e-6;
        let analytic = grad(grads).to_vec();
        for (idx, &expected) in analytic.iter().enumerate() {
            let saved = param(model)[idx];
            param(model)[idx] = saved + eps;
            let plus = loss_at(model, window, target);
            param(model)[idx] = saved - eps;
            let minus = loss_at(model, window, target);
            param(model)[idx] = saved;

            let numeric = (plus - minus) / (2.0 * eps);
            assert!(
                (numeric - expected).abs() <= 1e-6 + 1e-4 * numeric.abs(),
                "{}[{}]: numérico={} analítico={}", name, idx, numeric, expected
            );
        }
    }

    #[test]
    fn test_model_topology() {
        let model = build_lstm_model(Some(1)).unwrap();
        assert_eq!(model.seq_length(), SEQ_LENGTH);
        assert_eq!(model.lstm1.w.dim(), (4 * LSTM_UNITS, 1));
        assert_eq!(model.lstm2.u.dim(), (4 * LSTM_UNITS, LSTM_UNITS));
        assert_eq!(model.dense1.output_size(), DENSE_UNITS);
        assert_eq!(model.dense2.output_size(), 1);
        // Mesma contagem do Keras: 10400 + 20200 + 1275 + 26
        assert_eq!(model.num_parameters(), 31_901);
    }

    #[test]
    fn test_forget_bias_initialized_to_one() {
        let model = build_lstm_model(Some(2)).unwrap();
        let h = LSTM_UNITS;
        assert!(model.lstm1.b.slice(s![h..2 * h]).iter().all(|&b| b == 1.0));
        assert!(model.lstm1.b.slice(s![..h]).iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_recurrent_kernel_is_orthogonal() {
        let model = build_lstm_model(Some(4)).unwrap();
        for u in [&model.lstm1.u, &model.lstm2.u] {
            let gram = u.t().dot(u);
            let eye = Array2::<f64>::eye(LSTM_UNITS);
            assert!((gram - eye).iter().all(|d| d.abs() < 1e-10));
        }
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = build_lstm_model(Some(9)).unwrap();
        let b = build_lstm_model(Some(9)).unwrap();
        assert_eq!(a.lstm2.w, b.lstm2.w);
        assert_eq!(a.dense2.w, b.dense2.w);
    }

    #[test]
    fn test_rejects_inconsistent_layers() {
        let mut rng = StdRng::seed_from_u64(3);
        let result = SequentialModel::new(
            4,
            LstmLayer::new(&mut rng, 1, 3, true),
            LstmLayer::new(&mut rng, 5, 3, false),
            DenseLayer::new(&mut rng, 3, 2),
            DenseLayer::new(&mut rng, 2, 1),
            AdamOptimizer::new(0.01, BETA1, BETA2, EPSILON),
            Loss::MeanSquaredError,
        );
        assert!(matches!(result, Err(TrainingError::ModelConfiguration(_))));
    }

    #[test]
    fn test_forward_shapes() {
        let mut rng = StdRng::seed_from_u64(4);
        let layer = LstmLayer::new(&mut rng, 2, 5, true);
        let input = Array2::from_shape_fn((7, 2), |(t, j)| (t + j) as f64 * 0.1);
        let (out, _) = layer.forward(input.view());
        assert_eq!(out.dim(), (7, 5));

        let last_only = LstmLayer { return_sequences: false, ..layer.clone() };
        let (last, _) = last_only.forward(input.view());
        assert_eq!(last.dim(), (1, 5));
        assert_eq!(last.row(0), out.row(6));
    }

    #[test]
    fn test_window_length_checked() {
        let model = small_model(5);
        let result = model.predict_one(array![0.1, 0.2, 0.3].view());
        assert!(matches!(result, Err(TrainingError::Shape(_))));
    }

    #[test]
    fn test_backprop_matches_finite_differences() {
        let mut model = small_model(11);
        let window = array![0.1, 0.4, 0.35, 0.8];
        let target = 0.9;

        let (prediction, cache) = model.forward_cached(window.view()).unwrap();
        let grads = model.backward(&cache, model.loss.gradient(prediction, target));

        assert_gradients(&mut model, &grads, window.view(), target, "lstm1.w",
            |m| m.lstm1.w.as_slice_mut().unwrap(), |g| g.lstm1.w.as_slice().unwrap());
        assert_gradients(&mut model, &grads, window.view(), target, "lstm1.u",
            |m| m.lstm1.u.as_slice_mut().unwrap(), |g| g.lstm1.u.as_slice().unwrap());
        assert_gradients(&mut model, &grads, window.view(), target, "lstm1.b",
            |m| m.lstm1.b.as_slice_mut().unwrap(), |g| g.lstm1.b.as_slice().unwrap());
        assert_gradients(&mut model, &grads, window.view(), target, "lstm2.w",
            |m| m.lstm2.w.as_slice_mut().unwrap(), |g| g.lstm2.w.as_slice().unwrap());
        assert_gradients(&mut model, &grads, window.view(), target, "lstm2.u",
            |m| m.lstm2.u.as_slice_mut().unwrap(), |g| g.lstm2.u.as_slice().unwrap());
        assert_gradients(&mut model, &grads, window.view(), target, "lstm2.b",
            |m| m.lstm2.b.as_slice_mut().unwrap(), |g| g.lstm2.b.as_slice().unwrap());
        assert_gradients(&mut model, &grads, window.view(), target, "dense1.w",
            |m| m.dense1.w.as_slice_mut().unwrap(), |g| g.dense1.w.as_slice().unwrap());
        assert_gradients(&mut model, &grads, window.view(), target, "dense1.b",
            |m| m.dense1.b.as_slice_mut().unwrap(), |g| g.dense1.b.as_slice().unwrap());
        assert_gradients(&mut model, &grads, window.view(), target, "dense2.w",
            |m| m.dense2.w.as_slice_mut().unwrap(), |g| g.dense2.w.as_slice().unwrap());
        assert_gradients(&mut model, &grads, window.view(), target, "dense2.b",
            |m| m.dense2.b.as_slice_mut().unwrap(), |g| g.dense2.b.as_slice().unwrap());
    }

    #[test]
    fn test_fit_reduces_loss() {
        let mut model = small_model(21);
        let x = Array2::from_shape_fn((30, 4), |(i, j)| (i + j) as f64 / 40.0);
        let y = Array1::from_shape_fn(30, |i| (i + 4) as f64 / 40.0);

        let before = model.predict(&x).unwrap();
        let before_loss = calculate_regression_metrics(before.as_slice().unwrap(), y.as_slice().unwrap()).unwrap().mse;

        let history = model.fit(&x, &y, 1, 20).unwrap();
        assert_eq!(history.epoch_losses.len(), 20);

        let after = model.predict(&x).unwrap();
        let after_loss = calculate_regression_metrics(after.as_slice().unwrap(), y.as_slice().unwrap()).unwrap().mse;
        assert!(after_loss < before_loss, "antes={} depois={}", before_loss, after_loss);
    }

    #[test]
    fn test_fit_rejects_mismatched_data() {
        let mut model = small_model(6);
        let x = Array2::zeros((3, 4));
        let y = Array1::zeros(2);
        assert!(matches!(model.fit(&x, &y, 1, 1), Err(TrainingError::Training(_))));

        let empty_x = Array2::zeros((0, 4));
        let empty_y = Array1::zeros(0);
        assert!(matches!(model.fit(&empty_x, &empty_y, 1, 1), Err(TrainingError::Training(_))));
    }

    #[test]
    fn test_batch_gradient_is_mean_of_samples() {
        let model = small_model(8);
        let x = array![[0.1, 0.2, 0.3, 0.4], [0.5, 0.4, 0.3, 0.2]];
        let y = [0.5, 0.1];

        let mut batch = ModelGradients::zeros_like(&model);
        let mut per_sample = Vec::new();
        for k in 0..2 {
            let (p, cache) = model.forward_cached(x.row(k)).unwrap();
            let g = model.backward(&cache, model.loss.gradient(p, y[k]));
            batch.accumulate(&g);
            per_sample.push(g);
        }
        batch.scale(0.5);

        let expected = (&per_sample[0].dense2.w + &per_sample[1].dense2.w) * 0.5;
        assert!((&batch.dense2.w - &expected).iter().all(|d| d.abs() < 1e-12));
    }
}
