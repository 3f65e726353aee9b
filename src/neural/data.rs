// projeto: lstmcotacao
// file: src/neural/data.rs
// Coleta de cotações, normalização min-max e janelas deslizantes

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveTime};
use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::neural::utils::{validate_series, TrainingError};

/// Tamanho da janela de entrada (dias de histórico por amostra).
pub const SEQ_LENGTH: usize = 60;

/// Fração da série usada para treino.
pub const TRAIN_SPLIT: f64 = 0.8;

pub const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub closing: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Yahoo { base_url: String },
    Csv(PathBuf),
}

pub fn closing_prices(records: &[PriceRecord]) -> Array1<f64> {
    records.iter().map(|r| r.closing).collect()
}

// ---------------------------------------------------------------------------
// Coleta
// ---------------------------------------------------------------------------

pub fn collect_data(
    source: &DataSource,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<PriceRecord>, TrainingError> {
    if start > end {
        return Err(TrainingError::InvalidInput(
            format!("data inicial {} posterior à data final {}", start, end)
        ));
    }

    let records = match source {
        DataSource::Yahoo { base_url } => {
            let client = YahooFinanceClient::with_base_url(base_url)?;
            client.fetch_daily(symbol, start, end)?
        }
        DataSource::Csv(path) => load_csv(path)?
            .into_iter()
            .filter(|r| r.date >= start && r.date < end)
            .collect(),
    };

    match (records.first(), records.last()) {
        (Some(first), Some(last)) => info!(
            "✅ {} cotações de {} ({} → {})", records.len(), symbol, first.date, last.date
        ),
        _ => warn!("⚠️ Nenhuma cotação retornada para {} entre {} e {}", symbol, start, end),
    }

    Ok(records)
}

/// Cliente do endpoint de gráfico do Yahoo Finance.
pub struct YahooFinanceClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooFinanceClient {
    pub fn with_base_url(base_url: &str) -> Result<Self, TrainingError> {
        // O Yahoo recusa requisições sem User-Agent
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("lstmcotacao/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::blocking::Client, base_url: &str) -> Self {
        YahooFinanceClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Cotações diárias no intervalo [start, end).
    pub fn fetch_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRecord>, TrainingError> {
        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d",
            self.base_url,
            symbol,
            unix_midnight(start),
            unix_midnight(end),
        );
        info!("📥 Baixando cotações de {} ({} → {})", symbol, start, end);
        debug!("GET {}", url);

        let body = self.client.get(&url).send()?.error_for_status()?.text()?;
        parse_chart_response(&body)
    }
}

fn unix_midnight(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

pub fn parse_chart_response(body: &str) -> Result<Vec<PriceRecord>, TrainingError> {
    let response: ChartResponse = serde_json::from_str(body)?;

    if let Some(err) = response.chart.error {
        return Err(TrainingError::Provider(format!("{}: {}", err.code, err.description)));
    }

    let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };

    // Sem pregões no intervalo o Yahoo omite `timestamp`
    let timestamps = result.timestamp.unwrap_or_default();
    let closes = result.indicators.quote
        .into_iter()
        .next()
        .and_then(|q| q.close)
        .unwrap_or_default();
    if closes.len() != timestamps.len() {
        return Err(TrainingError::Provider(format!(
            "{} timestamps para {} fechamentos", timestamps.len(), closes.len()
        )));
    }

    let gmtoffset = result.meta.and_then(|m| m.gmtoffset).unwrap_or(0);
    let mut records = Vec::with_capacity(timestamps.len());
    let mut skipped = 0;

    for (ts, close) in timestamps.into_iter().zip(closes) {
        let Some(closing) = close else {
            skipped += 1;
            continue;
        };
        let date = DateTime::from_timestamp(ts + gmtoffset, 0)
            .ok_or_else(|| TrainingError::Provider(format!("timestamp inválido: {}", ts)))?
            .date_naive();
        records.push(PriceRecord { date, closing });
    }

    if skipped > 0 {
        debug!("Ignorados {} pregões sem fechamento", skipped);
    }
    Ok(records)
}

/// Lê um CSV exportado (colunas `Date` e `Close`), ordenado por data.
pub fn load_csv(path: &Path) -> Result<Vec<PriceRecord>, TrainingError> {
    info!("📂 Lendo cotações de {}", path.display());
    let mut reader = csv::Reader::from_path(path)?;

    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers.iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| TrainingError::InvalidInput(
                format!("coluna '{}' ausente em {}", name, path.display())
            ))
    };
    let date_idx = column("Date")?;
    let close_idx = column("Close")?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let raw_close = row.get(close_idx).unwrap_or("").trim();
        if raw_close.is_empty() || raw_close.eq_ignore_ascii_case("null") {
            continue;
        }
        let closing = raw_close.parse::<f64>()
            .map_err(|_| TrainingError::InvalidInput(format!("fechamento inválido: {}", raw_close)))?;

        // Aceita "2015-01-02" e "2015-01-02 00:00:00-02:00"
        let raw_date = row.get(date_idx).unwrap_or("").trim();
        let day = raw_date.get(..10).unwrap_or(raw_date);
        let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
            .map_err(|source| TrainingError::DateParse { value: raw_date.to_string(), source })?;

        records.push(PriceRecord { date, closing });
    }

    records.sort_by_key(|r| r.date);
    Ok(records)
}

// ---------------------------------------------------------------------------
// Pré-processamento
// ---------------------------------------------------------------------------

/// Normalização min-max para [0, 1], ajustada uma única vez.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: f64,
    pub max: f64,
}

impl MinMaxScaler {
    pub fn fit(values: ArrayView1<f64>) -> Result<Self, TrainingError> {
        validate_series(values, "fechamentos")?;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Ok(MinMaxScaler { min, max })
    }

    fn range(&self) -> f64 {
        self.max - self.min
    }

    pub fn transform_value(&self, value: f64) -> f64 {
        let range = self.range();
        if range > 1e-12 { (value - self.min) / range } else { 0.0 }
    }

    pub fn inverse_transform_value(&self, scaled: f64) -> f64 {
        scaled * self.range() + self.min
    }

    pub fn transform(&self, values: ArrayView1<f64>) -> Array1<f64> {
        values.mapv(|v| self.transform_value(v))
    }

    pub fn inverse_transform(&self, values: ArrayView1<f64>) -> Array1<f64> {
        values.mapv(|v| self.inverse_transform_value(v))
    }
}

/// Índice que separa treino (prefixo) e teste (sufixo): ceil(`len` * TRAIN_SPLIT).
pub fn split_point(len: usize) -> usize {
    (len as f64 * TRAIN_SPLIT).ceil() as usize
}

/// Janela `i` = `values[i .. i + seq_length]`, alvo = `values[i + seq_length]`.
pub fn create_windows(
    values: ArrayView1<f64>,
    seq_length: usize,
) -> Result<(Array2<f64>, Array1<f64>), TrainingError> {
    if values.len() <= seq_length {
        return Err(TrainingError::InsufficientData(format!(
            "{} valores, necessário mais que {} para formar uma janela", values.len(), seq_length
        )));
    }

    let n = values.len() - seq_length;
    let inputs = Array2::from_shape_fn((n, seq_length), |(i, j)| values[i + j]);
    let targets = Array1::from_shape_fn(n, |i| values[i + seq_length]);
    Ok((inputs, targets))
}

#[derive(Debug, Clone)]
pub struct PreprocessedData {
    pub x_train: Array2<f64>,
    pub y_train: Array1<f64>,
    pub scaler: MinMaxScaler,
    pub split: usize,
}

pub fn preprocess_data(records: &[PriceRecord]) -> Result<PreprocessedData, TrainingError> {
    let len = records.len();
    if len <= SEQ_LENGTH {
        return Err(TrainingError::InsufficientData(format!(
            "{} cotações, necessário mais que {}", len, SEQ_LENGTH
        )));
    }

    let closes = closing_prices(records);
    let split = split_point(len);
    let train = closes.slice(s![..split]);
    if split <= SEQ_LENGTH {
        return Err(TrainingError::InsufficientData(format!(
            "porção de treino com {} cotações não forma nenhuma janela de {}", split, SEQ_LENGTH
        )));
    }

    let scaler = MinMaxScaler::fit(train)?;
    let scaled_train = scaler.transform(train);
    let (x_train, y_train) = create_windows(scaled_train.view(), SEQ_LENGTH)?;

    debug!("Scaler: min={:.4} max={:.4} | split={}", scaler.min, scaler.max, split);
    info!("✅ {} janelas de treino ({} cotações de treino, {} de teste)",
          x_train.nrows(), split, len - split);

    Ok(PreprocessedData { x_train, y_train, scaler, split })
}
