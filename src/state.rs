use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::oauth::{OAuthClient, OAuthStateStore};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub oauth: OAuthClient,
    pub oauth_states: Arc<Mutex<OAuthStateStore>>,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> anyhow::Result<Self> {
        let oauth = OAuthClient::new(config.oauth.clone())?;
        Ok(Self {
            db,
            config,
            oauth,
            oauth_states: Arc::new(Mutex::new(OAuthStateStore::new())),
        })
    }
}
