// projeto: lstmcotacao
// file: src/neural/predictor.rs
// Previsão do trecho de teste em unidades de preço

use chrono::NaiveDate;
use log::{debug, info};
use ndarray::s;

use crate::neural::data::{closing_prices, create_windows, MinMaxScaler, PriceRecord};
use crate::neural::model::SequentialModel;
use crate::neural::utils::TrainingError;

/// Previsões alinhadas 1:1 com os fechamentos reais a partir do split.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub dates: Vec<NaiveDate>,
    pub actual: Vec<f64>,
    pub predicted: Vec<f64>,
}

impl Prediction {
    pub fn len(&self) -> usize {
        self.predicted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicted.is_empty()
    }
}

/// Usa os fechamentos de `split - seq_length` até o fim, normalizados com o
/// scaler do treino, e devolve exatamente `records.len() - split` previsões.
pub fn predict_closing(
    model: &SequentialModel,
    records: &[PriceRecord],
    scaler: &MinMaxScaler,
    split: usize,
) -> Result<Prediction, TrainingError> {
    let seq_length = model.seq_length();
    if split < seq_length || split >= records.len() {
        return Err(TrainingError::InvalidInput(format!(
            "split {} fora do intervalo [{}, {})", split, seq_length, records.len()
        )));
    }

    let closes = closing_prices(records);
    let scaled = scaler.transform(closes.slice(s![split - seq_length..]));
    let (x_test, _) = create_windows(scaled.view(), seq_length)?;
    debug!("🔮 {} janelas de teste", x_test.nrows());

    let predicted_scaled = model.predict(&x_test)?;
    let predicted = scaler.inverse_transform(predicted_scaled.view()).to_vec();

    let expected = records.len() - split;
    if predicted.len() != expected {
        return Err(TrainingError::Shape(format!(
            "{} previsões, esperado {}", predicted.len(), expected
        )));
    }

    let tail = &records[split..];
    info!("✅ {} previsões geradas ({} a {})",
          predicted.len(), tail[0].date, tail[tail.len() - 1].date);

    Ok(Prediction {
        dates: tail.iter().map(|r| r.date).collect(),
        actual: tail.iter().map(|r| r.closing).collect(),
        predicted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::data::{preprocess_data, SEQ_LENGTH};
    use crate::neural::model::{build_lstm_model, BATCH_SIZE, EPOCHS};

    fn trend_records(len: usize) -> Vec<PriceRecord> {
        let start = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
        (0..len)
            .map(|i| PriceRecord {
                date: start + chrono::Days::new(i as u64),
                closing: 20.0 + 0.25 * i as f64,
            })
            .collect()
    }

    fn mean(values: &[f64]) -> f64 {
        values.iter().sum::<f64>() / values.len() as f64
    }

    #[test]
    fn test_end_to_end_synthetic_trend() {
        let records = trend_records(200);
        let data = preprocess_data(&records).unwrap();
        assert_eq!(data.split, 160);
        assert_eq!(data.x_train.nrows(), 100);
        assert!(data.x_train.iter().chain(data.y_train.iter()).all(|&v| (0.0..=1.0).contains(&v)));

        let mut model = build_lstm_model(Some(42)).unwrap();
        let history = model.fit(&data.x_train, &data.y_train, BATCH_SIZE, EPOCHS).unwrap();
        assert_eq!(history.epoch_losses.len(), EPOCHS);

        let prediction = predict_closing(&model, &records, &data.scaler, data.split).unwrap();
        assert_eq!(prediction.len(), 40);
        assert_eq!(prediction.dates[0], records[160].date);
        assert_eq!(prediction.actual[39], records[199].closing);
        assert!(prediction.predicted.iter().all(|p| p.is_finite()));

        let first = mean(&prediction.predicted[..10]);
        let last = mean(&prediction.predicted[30..]);
        assert!(last > first, "primeiras={} últimas={}", first, last);
    }

    #[test]
    fn test_longer_training_follows_trend() {
        let records = trend_records(200);
        let data = preprocess_data(&records).unwrap();

        let mut model = build_lstm_model(Some(7)).unwrap();
        model.fit(&data.x_train, &data.y_train, BATCH_SIZE, 15).unwrap();

        let prediction = predict_closing(&model, &records, &data.scaler, data.split).unwrap();
        let first = mean(&prediction.predicted[..10]);
        let last = mean(&prediction.predicted[30..]);
        assert!(last > first, "primeiras={} últimas={}", first, last);
    }

    #[test]
    fn test_prediction_uses_training_scaler() {
        let records = trend_records(120);
        let data = preprocess_data(&records).unwrap();
        let model = build_lstm_model(Some(3)).unwrap();

        // O scaler do treino não enxerga o máximo do teste
        assert!(data.scaler.max < records[119].closing);
        let prediction = predict_closing(&model, &records, &data.scaler, data.split).unwrap();
        assert_eq!(prediction.len(), 120 - data.split);
    }

    #[test]
    fn test_invalid_split() {
        let records = trend_records(100);
        let data = preprocess_data(&records).unwrap();
        let model = build_lstm_model(Some(1)).unwrap();

        assert!(predict_closing(&model, &records, &data.scaler, SEQ_LENGTH - 1).is_err());
        assert!(predict_closing(&model, &records, &data.scaler, records.len()).is_err());
    }
}
