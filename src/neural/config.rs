// projeto: lstmcotacao
// file: src/neural/config.rs
// Configuração da execução: padrões <- arquivo TOML <- linha de comando

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::neural::data::{DataSource, YAHOO_BASE_URL};
use crate::neural::utils::TrainingError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub symbol: String,
    pub start: NaiveDate,
    /// Exclusiva
    pub end: NaiveDate,
    pub csv_path: Option<PathBuf>,
    pub provider_url: String,
    pub output: Option<PathBuf>,
    pub show: bool,
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            symbol: "PETR4.SA".to_string(),
            start: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or_default(),
            end: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
            csv_path: None,
            provider_url: YAHOO_BASE_URL.to_string(),
            output: None,
            show: true,
            seed: None,
        }
    }
}

impl PipelineConfig {
    /// Campos ausentes no arquivo ficam com o valor padrão.
    pub fn from_toml_file(path: &Path) -> Result<Self, TrainingError> {
        let contents = fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&contents)
            .map_err(|e| TrainingError::Config(format!("{}: {}", path.display(), e)))?;
        debug!("⚙️ Configuração carregada de {}", path.display());
        Ok(config)
    }

    pub fn source(&self) -> DataSource {
        match &self.csv_path {
            Some(path) => DataSource::Csv(path.clone()),
            None => DataSource::Yahoo { base_url: self.provider_url.clone() },
        }
    }

    pub fn validate(&self) -> Result<(), TrainingError> {
        if self.start > self.end {
            return Err(TrainingError::InvalidInput(format!(
                "data inicial {} posterior à data final {}", self.start, self.end
            )));
        }
        if self.csv_path.is_none() {
            if self.symbol.trim().is_empty() {
                return Err(TrainingError::Config("símbolo do ativo vazio".to_string()));
            }
            if self.provider_url.trim().is_empty() {
                return Err(TrainingError::Config("URL do provedor vazia".to_string()));
            }
        }
        Ok(())
    }
}
