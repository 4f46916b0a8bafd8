use assembly_api::{
    db::{self, DbConfig},
    entities::part,
    events::{Event, EventSender},
    services::{BomService, BuildOrderService, StockService},
};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Shared wiring for integration tests: an in-memory database with the full
/// schema applied plus the three services. The event receiver is returned so
/// event sends do not fail mid-test and assertions can drain it.
pub struct TestContext {
    pub db: Arc<DatabaseConnection>,
    pub builds: BuildOrderService,
    pub stock: StockService,
    pub bom: BomService,
    pub events: mpsc::Receiver<Event>,
}

pub async fn setup() -> TestContext {
    // A single connection keeps the in-memory database alive for the whole
    // test.
    let cfg = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };

    let pool = db::establish_connection_with_config(&cfg)
        .await
        .expect("Failed to create DB pool");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let db = Arc::new(pool);
    let (tx, rx) = mpsc::channel(256);
    let event_sender = Arc::new(EventSender::new(tx));

    TestContext {
        builds: BuildOrderService::new(db.clone(), event_sender.clone()),
        stock: StockService::new(db.clone(), event_sender.clone()),
        bom: BomService::new(db.clone()),
        db,
        events: rx,
    }
}

pub async fn create_part(db: &DatabaseConnection, name: &str) -> part::Model {
    let model = part::ActiveModel {
        name: Set(name.to_string()),
        ..Default::default()
    };

    model.insert(db).await.expect("Failed to create part")
}

pub fn test_user() -> Uuid {
    Uuid::new_v4()
}
