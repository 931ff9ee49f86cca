use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::ledger::{tokens, units::serde_tokens, Address, Amount, LedgerError, LedgerState};

pub const DEFAULT_NAME: &str = "DIGID Token";
pub const DEFAULT_SYMBOL: &str = "DIGID";
pub const DEFAULT_MAX_SUPPLY_TOKENS: u64 = 1_714_285_714;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("genesis owner is not set")]
    MissingOwner,
    #[error("genesis {0} must not be empty")]
    Empty(&'static str),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Parameters fixed at genesis. Amounts are whole-token decimal strings in
/// the JSON form.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenesisConfig {
    pub name: String,
    pub symbol: String,
    pub owner: Option<Address>,
    #[serde(with = "serde_tokens")]
    pub max_supply: Amount,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            symbol: DEFAULT_SYMBOL.to_string(),
            owner: None,
            max_supply: tokens(DEFAULT_MAX_SUPPLY_TOKENS),
        }
    }
}

impl GenesisConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn with_owner(mut self, owner: Address) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn validate(&self) -> Result<Address, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Empty("name"));
        }
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Empty("symbol"));
        }
        match self.owner {
            None => Err(ConfigError::MissingOwner),
            Some(owner) if owner.is_zero() => Err(LedgerError::InvalidOwner.into()),
            Some(owner) => Ok(owner),
        }
    }

    pub fn build(&self) -> Result<LedgerState, ConfigError> {
        let owner = self.validate()?;
        Ok(LedgerState::new(
            self.name.clone(),
            self.symbol.clone(),
            owner,
            self.max_supply,
        )?)
    }
}
