// projeto: lstmcotacao
// file: src/neural/metrics.rs
// Métricas de regressão das previsões sobre o trecho de validação

use log::info;
use serde::Serialize;

use crate::neural::utils::TrainingError;

#[derive(Debug, Clone, Serialize)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub mape: f64,
    pub directional_accuracy: f64,
    pub r_squared: f64,
    pub max_error: f64,
    pub n_samples: usize,
}

/// Calcula as métricas das previsões em unidades de preço.
pub fn calculate_regression_metrics(predictions: &[f64], targets: &[f64]) -> Result<RegressionMetrics, TrainingError> {
    if predictions.len() != targets.len() {
        return Err(TrainingError::Shape(format!(
            "{} previsões para {} valores reais", predictions.len(), targets.len()
        )));
    }
    if predictions.is_empty() {
        return Err(TrainingError::InsufficientData("nenhuma previsão para avaliar".to_string()));
    }

    let n = predictions.len() as f64;
    let errors: Vec<f64> = predictions.iter().zip(targets).map(|(p, t)| p - t).collect();

    let mse = errors.iter().map(|e| e.powi(2)).sum::<f64>() / n;
    let rmse = mse.sqrt();
    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

    // MAPE ignora alvos zerados
    let (ape_sum, ape_count) = errors.iter().zip(targets)
        .filter(|(_, t)| **t != 0.0)
        .fold((0.0, 0usize), |(sum, count), (e, t)| (sum + (e / t).abs(), count + 1));
    let mape = if ape_count > 0 { ape_sum / ape_count as f64 * 100.0 } else { 0.0 };

    let mut correct_direction = 0;
    for i in 1..predictions.len() {
        let pred_change = predictions[i] - predictions[i - 1];
        let actual_change = targets[i] - targets[i - 1];
        if pred_change.signum() == actual_change.signum() {
            correct_direction += 1;
        }
    }
    let directional_accuracy = if predictions.len() > 1 {
        correct_direction as f64 / (predictions.len() - 1) as f64
    } else {
        0.0
    };

    let target_mean = targets.iter().sum::<f64>() / n;
    let ss_res = errors.iter().map(|e| e.powi(2)).sum::<f64>();
    let ss_tot = targets.iter().map(|t| (t - target_mean).powi(2)).sum::<f64>();
    let r_squared = if ss_tot != 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

    let max_error = errors.iter().fold(0.0_f64, |acc, e| acc.max(e.abs()));

    Ok(RegressionMetrics {
        mse,
        rmse,
        mae,
        mape,
        directional_accuracy,
        r_squared,
        max_error,
        n_samples: predictions.len(),
    })
}

impl RegressionMetrics {
    pub fn log_summary(&self, prefix: &str) {
        info!("📊 [{}] Métricas de regressão:", prefix);
        info!("   ├── Amostras: {}", self.n_samples);
        info!("   ├── RMSE: {:.6}", self.rmse);
        info!("   ├── MAE: {:.6}", self.mae);
        info!("   ├── MAPE: {:.2}%", self.mape);
        info!("   ├── Erro máximo: {:.6}", self.max_error);
        info!("   ├── Acerto de direção: {:.2}%", self.directional_accuracy * 100.0);
        info!("   └── R²: {:.6}", self.r_squared);
    }
}
