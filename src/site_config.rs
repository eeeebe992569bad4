//! Admin mutations of the site configuration record.

use crate::errors::AppError;
use crate::models::SiteConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ConfigChange {
    AddGenre { name: String },
    RemoveGenre { name: String },
    AddGame { name: String },
    RemoveGame { name: String },
    SetLogo { game: String, url: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigChangeError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("logo url must not be empty")]
    EmptyUrl,
    #[error("Genre '{0}'")]
    UnknownGenre(String),
    #[error("Game '{0}'")]
    UnknownGame(String),
}

impl From<ConfigChangeError> for AppError {
    fn from(err: ConfigChangeError) -> Self {
        match err {
            e @ (ConfigChangeError::EmptyName | ConfigChangeError::EmptyUrl) => {
                AppError::InvalidInput(e.to_string())
            }
            e @ (ConfigChangeError::UnknownGenre(_) | ConfigChangeError::UnknownGame(_)) => {
                AppError::NotFound(e.to_string())
            }
        }
    }
}

fn clean(name: &str) -> Result<String, ConfigChangeError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ConfigChangeError::EmptyName);
    }
    Ok(name.to_string())
}

impl SiteConfig {
    /// Applies `change` in place. Returns `Ok(false)` when the record already
    /// reflected it. Does not touch `version`.
    pub fn apply(&mut self, change: &ConfigChange) -> Result<bool, ConfigChangeError> {
        match change {
            ConfigChange::AddGenre { name } => {
                let name = clean(name)?;
                if self.genres.contains(&name) {
                    return Ok(false);
                }
                self.genres.push(name);
            }
            ConfigChange::RemoveGenre { name } => {
                let name = clean(name)?;
                let before = self.genres.len();
                self.genres.retain(|g| *g != name);
                if self.genres.len() == before {
                    return Err(ConfigChangeError::UnknownGenre(name));
                }
            }
            ConfigChange::AddGame { name } => {
                let name = clean(name)?;
                if self.games.contains(&name) {
                    return Ok(false);
                }
                self.games.push(name);
            }
            ConfigChange::RemoveGame { name } => {
                let name = clean(name)?;
                let before = self.games.len();
                self.games.retain(|g| *g != name);
                if self.games.len() == before {
                    return Err(ConfigChangeError::UnknownGame(name));
                }
                self.game_logos.remove(&name);
            }
            ConfigChange::SetLogo { game, url } => {
                let game = clean(game)?;
                let url = url.trim();
                if url.is_empty() {
                    return Err(ConfigChangeError::EmptyUrl);
                }
                if !self.games.contains(&game) {
                    return Err(ConfigChangeError::UnknownGame(game));
                }
                if self.game_logos.get(&game).map(String::as_str) == Some(url) {
                    return Ok(false);
                }
                self.game_logos.insert(game, url.to_string());
            }
        }
        Ok(true)
    }
}
