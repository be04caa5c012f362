//! Name to skin bindings for ranking authentication

use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::warn;

use super::ranking::{append_line, RankingError};
use crate::engine::Skin;

/// Result of checking a player against the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityCheck {
    /// First sighting, the skin is now bound to the name
    Registered,
    Matches,
    /// The name belongs to someone with a different skin
    Mismatch,
}

/// Append-only registry of which skin owns which name
pub struct IdentityRegistry {
    path: Option<PathBuf>,
    skins: HashMap<String, Skin>,
}

impl IdentityRegistry {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RankingError> {
        let path = path.into();
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(RankingError::Io { path, source }),
        };

        let mut skins = HashMap::new();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            match parse_line(line) {
                Some((name, skin)) => {
                    skins.insert(name, skin);
                }
                None => warn!(line = %line, "Malformed identity line, skipping"),
            }
        }

        Ok(Self {
            path: Some(path),
            skins,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            skins: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.skins.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.skins.is_empty()
    }

    /// Compare `skin` with the one bound to `name`, binding it on first sight
    pub async fn check(&mut self, name: &str, skin: &Skin) -> Result<IdentityCheck, RankingError> {
        match self.skins.get(name) {
            Some(known) if known == skin => Ok(IdentityCheck::Matches),
            Some(_) => Ok(IdentityCheck::Mismatch),
            None => {
                self.skins.insert(name.to_string(), skin.clone());
                if let Some(path) = &self.path {
                    append_line(path, &format!("{}\t{}\n", name, skin)).await?;
                }
                Ok(IdentityCheck::Registered)
            }
        }
    }
}

/// `name\t<colour> <skin>`
fn parse_line(line: &str) -> Option<(String, Skin)> {
    let (name, skin) = line.split_once('\t')?;
    let (colour, skin_name) = skin.trim().split_once(' ')?;
    Some((
        name.to_string(),
        Skin {
            colour: colour.parse().ok()?,
            name: skin_name.trim().to_string(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn skin(colour: i64, name: &str) -> Skin {
        Skin {
            colour,
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_first_sighting_binds_skin() {
        let mut registry = IdentityRegistry::in_memory();
        let red = skin(16711680, "default.png");

        assert_eq!(assert_ok!(registry.check("Mike", &red).await), IdentityCheck::Registered);
        assert_eq!(assert_ok!(registry.check("Mike", &red).await), IdentityCheck::Matches);
        assert_eq!(
            assert_ok!(registry.check("Mike", &skin(255, "default.png")).await),
            IdentityCheck::Mismatch
        );
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_registry_persists() {
        let path = std::env::temp_dir().join(format!(
            "dedicated_control_identity_{}.txt",
            std::process::id()
        ));
        let _ = fs::remove_file(&path).await;

        let mut registry = assert_ok!(IdentityRegistry::open(&path).await);
        assert!(registry.is_empty());
        registry.check("Mike", &skin(42, "ninja.png")).await.unwrap();

        let raw = fs::read_to_string(&path).await.unwrap();
        assert_eq!(raw, "Mike\t42 ninja.png\n");

        let mut reopened = assert_ok!(IdentityRegistry::open(&path).await);
        assert_eq!(
            reopened.check("Mike", &skin(42, "ninja.png")).await.unwrap(),
            IdentityCheck::Matches
        );

        let _ = fs::remove_file(&path).await;
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line("Mike the worm\t7 default.png"),
            Some(("Mike the worm".to_string(), skin(7, "default.png")))
        );
        assert_eq!(parse_line("no tabs here"), None);
        assert_eq!(parse_line("Mike\tred default.png"), None);
    }
}
