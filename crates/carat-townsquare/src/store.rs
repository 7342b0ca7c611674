//! Town squares of all running games, persisted as one JSON document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use carat_lifecycle::{SessionNumber, VotingError, VotingSessions};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::square::TownSquare;

/// Town square state keyed by game.
pub struct TownSquares {
    path: Option<PathBuf>,
    squares: RwLock<BTreeMap<SessionNumber, TownSquare>>,
    saves: Mutex<()>,
}

impl TownSquares {
    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            squares: RwLock::new(BTreeMap::new()),
            saves: Mutex::new(()),
        }
    }

    /// Open the store at `path`. A missing file is an empty store.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let squares: BTreeMap<SessionNumber, TownSquare> = match tokio::fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(
            "Loaded {} town square(s) from {}",
            squares.len(),
            path.display()
        );
        Ok(Self {
            path: Some(path),
            squares: RwLock::new(squares),
            saves: Mutex::new(()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the store to its file. Concurrent saves run one at a time.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _saving = self.saves.lock().await;
        let data = serde_json::to_vec_pretty(&*self.squares.read().await)?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Open a town square for a game, replacing any existing one.
    pub async fn start(&self, session: SessionNumber, square: TownSquare) -> Option<TownSquare> {
        info!("Town square opened for game {} with {} player(s)", session, square.players.len());
        self.squares.write().await.insert(session, square)
    }

    pub async fn get(&self, session: &SessionNumber) -> Option<TownSquare> {
        self.squares.read().await.get(session).cloned()
    }

    /// Games with a town square.
    pub async fn games(&self) -> Vec<SessionNumber> {
        self.squares.read().await.keys().cloned().collect()
    }

    /// Apply `change` to a game's town square.
    pub async fn update<T, F>(&self, session: &SessionNumber, change: F) -> Result<T>
    where
        F: FnOnce(&mut TownSquare) -> Result<T>,
    {
        let mut squares = self.squares.write().await;
        let square = squares
            .get_mut(session)
            .ok_or_else(|| Error::UnknownGame(session.to_string()))?;
        change(square)
    }

    pub async fn remove(&self, session: &SessionNumber) -> Option<TownSquare> {
        self.squares.write().await.remove(session)
    }
}

#[async_trait]
impl VotingSessions for TownSquares {
    async fn has_session(&self, session: &SessionNumber) -> bool {
        self.squares.read().await.contains_key(session)
    }

    async fn discard_session(&self, session: &SessionNumber) -> bool {
        let removed = self.remove(session).await.is_some();
        if removed {
            info!("Town square for game {} discarded", session);
        }
        removed
    }

    async fn persist(&self) -> std::result::Result<(), VotingError> {
        self.save().await.map_err(|e| VotingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carat_platform::UserId;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    fn n(s: &str) -> SessionNumber {
        SessionNumber::parse(s).unwrap()
    }

    fn square() -> TownSquare {
        TownSquare::new([(UserId(1), "alice"), (UserId(2), "bob"), (UserId(3), "carol")])
    }

    #[tokio::test]
    async fn missing_file_opens_empty() {
        let dir = TempDir::new().unwrap();
        let store = TownSquares::open(dir.path().join("townsquares.json")).await.unwrap();
        assert!(store.games().await.is_empty());
    }

    #[tokio::test]
    async fn state_survives_save_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("townsquares.json");

        let store = TownSquares::open(&path).await.unwrap();
        store.start(n("12"), square()).await;
        assert_ok!(
            store
                .update(&n("12"), |ts| {
                    ts.votes = serde_json::json!({ "nominee": 2, "yes": [1, 3] });
                    Ok(())
                })
                .await
        );
        assert_ok!(store.save().await);

        let reopened = TownSquares::open(&path).await.unwrap();
        let ts = reopened.get(&n("12")).await.unwrap();
        assert_eq!(ts.players.len(), 3);
        assert_eq!(ts.votes["yes"], serde_json::json!([1, 3]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_all_succeed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("townsquares.json");
        let store = Arc::new(TownSquares::open(&path).await.unwrap());
        store.start(n("12"), square()).await;

        let saves: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.save().await })
            })
            .collect();
        for save in saves {
            assert_ok!(save.await.unwrap());
        }

        let reopened = TownSquares::open(&path).await.unwrap();
        assert_eq!(reopened.games().await, vec![n("12")]);
    }

    #[tokio::test]
    async fn update_unknown_game_fails() {
        let store = TownSquares::in_memory();
        let result = store.update(&n("4"), |_| Ok(())).await;
        assert!(matches!(result, Err(Error::UnknownGame(_))));
    }

    #[tokio::test]
    async fn discard_removes_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("townsquares.json");
        let store = TownSquares::open(&path).await.unwrap();
        store.start(n("12"), square()).await;
        store.start(n("13"), square()).await;

        assert!(store.has_session(&n("12")).await);
        assert!(store.discard_session(&n("12")).await);
        assert!(!store.discard_session(&n("12")).await);
        assert_ok!(store.persist().await);

        let reopened = TownSquares::open(&path).await.unwrap();
        assert_eq!(reopened.games().await, vec![n("13")]);
    }

    #[tokio::test]
    async fn persist_reports_unwritable_path() {
        let dir = TempDir::new().unwrap();
        let store = TownSquares::open(dir.path().join("missing-dir").join("ts.json"))
            .await
            .unwrap();
        store.start(n("1"), square()).await;
        assert!(store.persist().await.is_err());
    }
}
