// projeto: lstmcotacao
// file: src/neural/plot.rs
// Gráfico de treino, validação e previsões com plotly

use std::fs;
use std::path::PathBuf;

use log::info;
use plotly::common::{Anchor, Mode, Title};
use plotly::layout::{Axis, Legend};
use plotly::{Layout, Plot, Scatter};

use crate::neural::data::PriceRecord;
use crate::neural::predictor::Prediction;
use crate::neural::utils::TrainingError;

pub const CHART_TITLE: &str = "Modelo LSTM - Previsão de Fechamento de Ações";

#[derive(Debug, Clone, Default)]
pub struct PlotOptions {
    /// Abre o gráfico no navegador padrão
    pub show: bool,
    /// Grava o gráfico como HTML independente
    pub output: Option<PathBuf>,
}

fn date_labels<'a>(dates: impl Iterator<Item = &'a chrono::NaiveDate>) -> Vec<String> {
    dates.map(|d| d.format("%Y-%m-%d").to_string()).collect()
}

/// Monta as três séries: fechamentos até o split (Treino), reais depois do
/// split (Validação) e previstos (Previsões).
pub fn build_chart(records: &[PriceRecord], prediction: &Prediction, split: usize) -> Result<Plot, TrainingError> {
    if split > records.len() || records.len() - split != prediction.len() {
        return Err(TrainingError::Shape(format!(
            "{} previsões para {} cotações após o split {}",
            prediction.len(), records.len().saturating_sub(split), split
        )));
    }
    if prediction.is_empty() {
        return Err(TrainingError::InsufficientData("nenhuma previsão para plotar".to_string()));
    }

    let train = &records[..split];
    let train_dates = date_labels(train.iter().map(|r| &r.date));
    let test_dates = date_labels(prediction.dates.iter());

    let trace_train = Scatter::new(train_dates, train.iter().map(|r| r.closing).collect::<Vec<f64>>())
        .name("Treino")
        .mode(Mode::Lines);
    let trace_valid = Scatter::new(test_dates.clone(), prediction.actual.clone())
        .name("Validação")
        .mode(Mode::Lines);
    let trace_pred = Scatter::new(test_dates, prediction.predicted.clone())
        .name("Previsões")
        .mode(Mode::Lines);

    let layout = Layout::new()
        .title(Title::with_text(CHART_TITLE))
        .x_axis(Axis::new().title(Title::with_text("Data")))
        .y_axis(Axis::new().title(Title::with_text("Preço de Fechamento em R$")))
        .legend(Legend::new().x(1.0).y(0.0).x_anchor(Anchor::Right).y_anchor(Anchor::Bottom))
        .width(1600)
        .height(800);

    let mut plot = Plot::new();
    plot.add_trace(trace_train);
    plot.add_trace(trace_valid);
    plot.add_trace(trace_pred);
    plot.set_layout(layout);
    Ok(plot)
}

pub fn plot_results(
    records: &[PriceRecord],
    prediction: &Prediction,
    split: usize,
    options: &PlotOptions,
) -> Result<(), TrainingError> {
    let plot = build_chart(records, prediction, split)?;

    if let Some(path) = &options.output {
        fs::write(path, plot.to_html())?;
        info!("💾 Gráfico salvo em {}", path.display());
    }
    if options.show {
        info!("🖼️ Abrindo gráfico no navegador");
        plot.show();
    }

    Ok(())
}
