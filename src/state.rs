use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{config::AppConfig, media::ImageStore};

#[derive(Clone)]
pub struct AppState {
    pub orm: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub images: Arc<dyn ImageStore>,
}
