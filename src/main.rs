// projeto: lstmcotacao
// file: src/main.rs
// Pipeline de previsão de fechamento: coleta, pré-processamento, treino, previsão e gráfico

mod neural;

use std::path::PathBuf;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use clap::Parser;
use log::{debug, error, info};

use crate::neural::model::{BATCH_SIZE, EPOCHS};
use crate::neural::{
    build_lstm_model, calculate_regression_metrics, collect_data, plot_results, predict_closing,
    preprocess_data, PipelineConfig, PlotOptions, Prediction, TrainingError,
};

#[derive(Parser, Debug, Default)]
#[command(
    name = "lstmcotacao",
    version = "0.1.0",
    about = "Previsão do preço de fechamento de ativos com rede LSTM",
    long_about = "Baixa o histórico diário de um ativo, treina uma LSTM de duas camadas sobre janelas de 60 dias e plota treino, validação e previsões."
)]
struct Cli {
    /// Ticker do ativo (ex: PETR4.SA)
    #[arg(long)]
    symbol: Option<String>,

    /// Data inicial (AAAA-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Data final, exclusiva (AAAA-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Lê as cotações de um CSV local em vez do provedor
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Arquivo TOML de configuração
    #[arg(long)]
    config: Option<PathBuf>,

    /// Grava o gráfico em HTML
    #[arg(long)]
    output: Option<PathBuf>,

    /// Não abre o gráfico no navegador
    #[arg(long)]
    no_show: bool,

    /// Semente para inicialização reprodutível dos pesos
    #[arg(long)]
    seed: Option<u64>,

    /// Modo verboso de logging
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<(), TrainingError> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let start_time = Instant::now();
    info!("🚀 Previsão de fechamento com LSTM iniciada");
    info!("🕐 Iniciado em: {}", Utc::now().format("%Y-%m-%d %H:%M:%S"));

    let result = resolve_config(&cli).and_then(|config| run(&config));

    match result {
        Ok(_) => {
            info!("✅ Concluído em {:.2}s", start_time.elapsed().as_secs_f64());
        }
        Err(e) => {
            error!("❌ Erro: {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp_secs()
        .init();
}

/// Padrões, depois o arquivo TOML, depois as flags da linha de comando.
fn resolve_config(cli: &Cli) -> Result<PipelineConfig, TrainingError> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_toml_file(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(symbol) = &cli.symbol {
        config.symbol = symbol.clone();
    }
    if let Some(start) = cli.start {
        config.start = start;
    }
    if let Some(end) = cli.end {
        config.end = end;
    }
    if let Some(csv) = &cli.csv {
        config.csv_path = Some(csv.clone());
    }
    if let Some(output) = &cli.output {
        config.output = Some(output.clone());
    }
    if cli.no_show {
        config.show = false;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    config.validate()?;
    debug!("⚙️ Configuração efetiva: {:?}", config);
    Ok(config)
}

fn run(config: &PipelineConfig) -> Result<Prediction, TrainingError> {
    info!("📥 Coletando {} de {} a {}", config.symbol, config.start, config.end);
    let records = collect_data(&config.source(), &config.symbol, config.start, config.end)?;

    info!("🔄 Pré-processando {} cotações", records.len());
    let data = preprocess_data(&records)?;

    info!("🛠️ Construindo modelo");
    let mut model = build_lstm_model(config.seed)?;

    let history = model.fit(&data.x_train, &data.y_train, BATCH_SIZE, EPOCHS)?;
    if let Some(loss) = history.epoch_losses.last() {
        info!("✅ Treino concluído | loss final: {:.6}", loss);
    }

    info!("🔮 Prevendo {} cotações de validação", records.len() - data.split);
    let prediction = predict_closing(&model, &records, &data.scaler, data.split)?;

    let metrics = calculate_regression_metrics(&prediction.predicted, &prediction.actual)?;
    metrics.log_summary(&config.symbol);

    let options = PlotOptions { show: config.show, output: config.output.clone() };
    plot_results(&records, &prediction, data.split, &options)?;
    Ok(prediction)
}
