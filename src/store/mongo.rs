//! MongoDB adapter (feature `store-mongo`). Targets Cosmos-style endpoints that
//! report throttling as code 16500 and expose `getLastRequestStatistics`.
use crate::document::Document;
use crate::store::{ConnectOptions, StoreClient, StoreError};
use mongodb::bson::{self, Document as BsonDocument, doc};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::{ClientOptions, Credential, Tls, TlsOptions};
use mongodb::{Client, Collection, Database};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_PORT: u16 = 10255;
const SETTLE_AFTER_DROP: Duration = Duration::from_secs(5);

pub struct MongoStore {
    client: Client,
    db: Database,
    coll: Collection<BsonDocument>,
    namespace: String,
    partition_key: String,
    partitioned: bool,
    pre_provisioned: bool,
}

pub async fn connect(opts: ConnectOptions) -> Result<Arc<dyn StoreClient>, StoreError> {
    let host = opts
        .get("endpoint")
        .or_else(|| opts.get("host"))
        .unwrap_or("127.0.0.1")
        .to_string();
    let port: u16 = opts.get_parsed("port").unwrap_or(DEFAULT_PORT);
    let database = opts.get("database").unwrap_or("bench").to_string();
    let collection = opts.get("collection").unwrap_or("docs").to_string();

    let mut options = ClientOptions::parse(format!("mongodb://{host}:{port}"))
        .await
        .map_err(|e| StoreError::Connect(e.to_string()))?;
    options.app_name = Some("docdb-bench".into());
    if let Some(n) = opts.get_parsed::<u32>("max_pool_size") {
        options.max_pool_size = Some(n);
    }
    if opts.get("tls") != Some("false") {
        options.tls = Some(Tls::Enabled(TlsOptions::default()));
    }
    if let Some(user) = opts.get("username") {
        options.credential = Some(
            Credential::builder()
                .username(user.to_string())
                .password(opts.get("password").unwrap_or_default().to_string())
                .source(database.clone())
                .build(),
        );
    }

    let client = Client::with_options(options).map_err(|e| StoreError::Connect(e.to_string()))?;
    let db = client.database(&database);
    let coll = db.collection::<BsonDocument>(&collection);
    tracing::info!(%host, port, %database, %collection, "mongo client created");

    Ok(Arc::new(MongoStore {
        client,
        db,
        coll,
        namespace: format!("{database}.{collection}"),
        partition_key: opts.get("partition_key").unwrap_or("pk").to_string(),
        partitioned: opts.get_bool("partitioned"),
        pre_provisioned: opts.get_bool("pre_provisioned"),
    }))
}

#[async_trait::async_trait]
impl StoreClient for MongoStore {
    async fn submit_batch(&self, docs: &[Document]) -> Result<(), StoreError> {
        let batch = docs
            .iter()
            .map(bson::to_document)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Other(format!("encode: {e}")))?;
        self.coll
            .insert_many(batch)
            .ordered(false)
            .await
            .map(|_| ())
            .map_err(map_error)
    }

    // The statistics command reads per-connection state; with a pooled client
    // the answer may belong to a sibling worker's insert of the same shape.
    async fn last_operation_cost(&self) -> Result<Option<f64>, StoreError> {
        let resp = self
            .db
            .run_command(doc! { "getLastRequestStatistics": 1 })
            .await
            .map_err(map_error)?;
        if resp.get_str("CommandName").ok() != Some("insert") {
            return Ok(None);
        }
        Ok(resp.get_f64("RequestCharge").ok())
    }

    async fn prepare(&self) -> Result<(), StoreError> {
        if self.pre_provisioned {
            tracing::info!(
                namespace = %self.namespace,
                "collection pre-provisioned, skipping setup"
            );
            return Ok(());
        }
        self.coll.drop().await.map_err(map_error)?;
        tokio::time::sleep(SETTLE_AFTER_DROP).await;

        if self.partitioned {
            tracing::info!(
                namespace = %self.namespace,
                key = %self.partition_key,
                "creating partitioned collection"
            );
            let mut key = BsonDocument::new();
            key.insert(self.partition_key.clone(), "hashed");
            self.db
                .run_command(doc! { "shardCollection": self.namespace.clone(), "key": key })
                .await
                .map_err(map_error)?;
        } else {
            tracing::info!(namespace = %self.namespace, "creating collection");
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), StoreError> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}

fn map_error(err: MongoError) -> StoreError {
    match err.kind.as_ref() {
        ErrorKind::Command(cmd) => StoreError::Command {
            code: cmd.code,
            message: cmd.message.clone(),
        },
        ErrorKind::InsertMany(failure) => match failure
            .write_errors
            .as_ref()
            .and_then(|w| w.first())
        {
            Some(we) => StoreError::Command {
                code: we.code,
                message: we.message.clone(),
            },
            None => StoreError::Other(err.to_string()),
        },
        ErrorKind::Io(_)
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::ServerSelection { .. } => StoreError::Transient(err.to_string()),
        _ => StoreError::Other(err.to_string()),
    }
}
