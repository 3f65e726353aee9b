// projeto: lstmcotacao
// file: src/neural/utils.rs
// Erros, otimizador Adam, ativações e inicialização de pesos

use std::collections::HashMap;

use ndarray::{Array, Array1, Array2, ArrayD, ArrayView1, Dimension, Zip};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("Entrada inválida: {0}")]
    InvalidInput(String),

    #[error("Dados insuficientes: {0}")]
    InsufficientData(String),

    #[error("Erro do provedor de cotações: {0}")]
    Provider(String),

    #[error("Erro HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Erro de JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Erro de CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Erro de configuração: {0}")]
    Config(String),

    #[error("Data inválida '{value}': {source}")]
    DateParse {
        value: String,
        source: chrono::ParseError,
    },

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Configuração do modelo inválida: {0}")]
    ModelConfiguration(String),

    #[error("Training error: {0}")]
    Training(String),
}

/// Adam com estado por parâmetro, identificado pelo nome.
#[derive(Debug, Clone)]
pub struct AdamOptimizer {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub t: usize,
    m: HashMap<String, ArrayD<f64>>,
    v: HashMap<String, ArrayD<f64>>,
}

impl AdamOptimizer {
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        AdamOptimizer {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: HashMap::new(),
            v: HashMap::new(),
        }
    }

    /// Avança o contador de iterações; chamar uma vez por lote, antes dos `update`.
    pub fn next_iteration(&mut self) {
        self.t += 1;
    }

    pub fn update<D: Dimension>(&mut self, param_name: &str, param: &mut Array<f64, D>, gradient: &Array<f64, D>) {
        let (beta1, beta2, epsilon, lr) = (self.beta1, self.beta2, self.epsilon, self.learning_rate);
        let t = self.t.max(1) as i32;
        let bias1 = 1.0 - beta1.powi(t);
        let bias2 = 1.0 - beta2.powi(t);

        let grad = gradient.view().into_dyn();
        let m = self.m.entry(param_name.to_string())
            .or_insert_with(|| ArrayD::zeros(gradient.shape()));
        let v = self.v.entry(param_name.to_string())
            .or_insert_with(|| ArrayD::zeros(gradient.shape()));

        m.zip_mut_with(&grad, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
        v.zip_mut_with(&grad, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);

        let mut param = param.view_mut().into_dyn();
        Zip::from(&mut param).and(&*m).and(&*v).for_each(|p, &m, &v| {
            let m_hat = m / bias1;
            let v_hat = v / bias2;
            *p -= lr * m_hat / (v_hat.sqrt() + epsilon);
        });
    }
}

pub fn sigmoid(x: &Array1<f64>) -> Array1<f64> {
    x.mapv(|val| 1.0 / (1.0 + (-val).exp()))
}

pub fn tanh(x: &Array1<f64>) -> Array1<f64> {
    x.mapv(|val| val.tanh())
}

/// Glorot uniforme: U(-l, l) com l = sqrt(6 / (fan_in + fan_out)).
pub fn glorot_uniform<R: Rng + ?Sized>(rng: &mut R, rows: usize, cols: usize) -> Array2<f64> {
    let limit = (6.0 / (rows + cols) as f64).sqrt();
    Array2::from_shape_fn((rows, cols), |_| rng.random_range(-limit..limit))
}

/// Matriz ortogonal (rows, cols): colunas ortonormais quando rows >= cols,
/// linhas ortonormais caso contrário. Gram-Schmidt sobre amostras N(0, 1).
pub fn orthogonal<R: Rng + ?Sized>(rng: &mut R, rows: usize, cols: usize) -> Array2<f64> {
    if rows < cols {
        return orthogonal(rng, cols, rows).reversed_axes();
    }

    let mut q = Array2::from_shape_fn((rows, cols), |_| {
        <StandardNormal as Distribution<f64>>::sample(&StandardNormal, rng)
    });
    for j in 0..cols {
        let mut v = q.column(j).to_owned();
        // Duas passadas para não perder ortogonalidade
        for _ in 0..2 {
            for k in 0..j {
                let qk = q.column(k);
                let proj = qk.dot(&v);
                v.scaled_add(-proj, &qk);
            }
        }
        let norm = v.dot(&v).sqrt();
        v /= norm;
        q.column_mut(j).assign(&v);
    }
    q
}

pub fn validate_series(values: ArrayView1<f64>, name: &str) -> Result<(), TrainingError> {
    if values.is_empty() {
        return Err(TrainingError::InsufficientData(format!("{} está vazio", name)));
    }

    for (i, &value) in values.iter().enumerate() {
        if !value.is_finite() {
            return Err(TrainingError::InvalidInput(
                format!("{} contém valor não finito na posição {}", name, i)
            ));
        }
    }

    Ok(())
}
