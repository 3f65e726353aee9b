// projeto: lstmcotacao
// file: src/neural/mod.rs
// Declaração dos módulos do pipeline de previsão

pub mod utils;     // Erros, Adam, ativações e inicialização
pub mod config;    // Configuração da execução (padrões, TOML, CLI)
pub mod data;      // Coleta de cotações e pré-processamento
pub mod model;     // Rede LSTM empilhada e treino
pub mod predictor; // Previsão do trecho de teste
pub mod metrics;   // Métricas de regressão
pub mod plot;      // Gráfico de resultados

pub use config::PipelineConfig;
pub use data::{collect_data, preprocess_data};
pub use model::build_lstm_model;
pub use predictor::{predict_closing, Prediction};
pub use metrics::calculate_regression_metrics;
pub use plot::{plot_results, PlotOptions};
pub use utils::TrainingError;
