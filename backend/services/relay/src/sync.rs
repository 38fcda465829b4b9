use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use serde_json::Value;

use crate::connector::{Collection, SyncResult, SyncRunner};
use crate::datasystem::client::{AuthError, DataSystemClient, FetchError};
use crate::datasystem::models::{display_id, ClientRecord, ProductRecord};
use crate::datasystem::query::SyncWindow;
use crate::relay::client::RelayClient;
use crate::relay::payload::RelayRecord;

#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("{collection} fetch failed: {source}")]
    Fetch {
        collection: Collection,
        #[source]
        source: FetchError,
    },
}

/// Counts for both collections of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub clients: SyncResult,
    pub products: SyncResult,
}

/// What one collection achieved, even when its fetch aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionReport {
    pub collection: Collection,
    pub result: SyncResult,
    pub error: Option<String>,
}

/// Everything a run produced. `collections` is empty when the run never got
/// past authentication.
#[derive(Debug)]
pub struct RunOutcome {
    pub collections: Vec<CollectionReport>,
    pub result: Result<RunSummary, OrchestrationError>,
}

impl RunOutcome {
    fn auth_failed(error: AuthError) -> Self {
        Self {
            collections: Vec::new(),
            result: Err(OrchestrationError::Auth(error)),
        }
    }
}

/// Authenticates once, then syncs clients and products concurrently.
pub struct SyncOrchestrator {
    datasystem: DataSystemClient,
    relay: RelayClient,
    offset: FixedOffset,
}

impl SyncOrchestrator {
    pub fn new(datasystem: DataSystemClient, relay: RelayClient, offset: FixedOffset) -> Self {
        Self {
            datasystem,
            relay,
            offset,
        }
    }

    async fn run_with_window(&self, window: SyncWindow) -> RunOutcome {
        tracing::info!(
            start = %window.start_param(),
            end = %window.end_param(),
            "starting sync run"
        );

        let token = match self.datasystem.authenticate().await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(error = %e, "datasystem authentication failed");
                return RunOutcome::auth_failed(e);
            }
        };

        // join!, not try_join!: a failing collection must not cancel its sibling.
        let (clients, products) = tokio::join!(
            self.sync_collection::<ClientRecord>(&token, window),
            self.sync_collection::<ProductRecord>(&token, window),
        );

        let collections = vec![
            CollectionReport {
                collection: Collection::Clients,
                result: clients.0,
                error: clients.1.as_ref().map(ToString::to_string),
            },
            CollectionReport {
                collection: Collection::Products,
                result: products.0,
                error: products.1.as_ref().map(ToString::to_string),
            },
        ];

        let result = match (clients.1, products.1) {
            (Some(source), _) => Err(OrchestrationError::Fetch {
                collection: Collection::Clients,
                source,
            }),
            (None, Some(source)) => Err(OrchestrationError::Fetch {
                collection: Collection::Products,
                source,
            }),
            (None, None) => Ok(RunSummary {
                clients: clients.0,
                products: products.0,
            }),
        };

        RunOutcome {
            collections,
            result,
        }
    }

    /// Fetch every page of one collection and relay each record in order.
    ///
    /// Relay failures only lower `synced`. A fetch failure stops the walk and
    /// is returned next to the counts reached so far.
    async fn sync_collection<R: RelayRecord>(
        &self,
        token: &str,
        window: SyncWindow,
    ) -> (SyncResult, Option<FetchError>) {
        let collection = R::COLLECTION;
        let mut cursor = self.datasystem.pages(token, collection, window);
        let mut synced = 0u64;

        loop {
            let page = match cursor.next_page().await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(%collection, error = %e, "page fetch failed, aborting collection");
                    let result = SyncResult {
                        total: cursor.total(),
                        synced,
                    };
                    return (result, Some(e));
                }
            };

            tracing::debug!(%collection, page = page.number, records = page.records.len(), "relaying page");

            for raw in page.records {
                if self.relay_record::<R>(raw).await {
                    synced += 1;
                }
            }
        }

        let result = SyncResult {
            total: cursor.total(),
            synced,
        };
        tracing::info!(%collection, total = result.total, synced = result.synced, "collection sync completed");
        (result, None)
    }

    /// Convert one raw record and make one delivery attempt. Both kinds of
    /// failure are logged here and never propagate.
    async fn relay_record<R: RelayRecord>(&self, raw: Value) -> bool {
        let collection = R::COLLECTION;
        let raw_id = display_id(raw.get("id").unwrap_or(&Value::Null));
        let record = match serde_json::from_value::<R>(raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(%collection, record_id = %raw_id, error = %e, "skipping malformed record");
                return false;
            }
        };
        let payload = record.to_payload(Utc::now());
        match self.relay.deliver(collection, &payload).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    %collection,
                    record_id = %record.record_id(),
                    error = %e,
                    "failed to relay record"
                );
                false
            }
        }
    }
}

#[async_trait]
impl SyncRunner for SyncOrchestrator {
    async fn run_once(&self) -> RunOutcome {
        let window = SyncWindow::at(Utc::now(), self.offset);
        self.run_with_window(window).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasystem::client::DataSystemClientConfig;
    use crate::relay::client::RelayClientConfig;
    use chrono::NaiveDate;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn window() -> SyncWindow {
        SyncWindow::ending_on(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap())
    }

    fn orchestrator(api: &MockServer, sink: &MockServer) -> SyncOrchestrator {
        let datasystem = DataSystemClient::new(DataSystemClientConfig {
            base_url: api.uri(),
            cnpj: "00.000.000/0001-00".to_string(),
            hash: "secret-hash".to_string(),
            max_retries: 0,
            timeout_secs: 5,
        })
        .unwrap();
        let relay = RelayClient::new(RelayClientConfig {
            clients_url: format!("{}/hooks/clients", sink.uri()),
            products_url: format!("{}/hooks/products", sink.uri()),
            timeout_secs: 5,
        })
        .unwrap();
        SyncOrchestrator::new(datasystem, relay, FixedOffset::west_opt(3 * 3600).unwrap())
    }

    async fn mount_auth(api: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/autenticar"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "tok" })))
            .mount(api)
            .await;
    }

    async fn mount_page(api: &MockServer, collection_path: &str, page: u64, ids: std::ops::Range<u64>, total: u64) {
        let dados: Vec<serde_json::Value> = ids.map(|id| serde_json::json!({ "id": id })).collect();
        Mock::given(method("GET"))
            .and(path(collection_path))
            .and(query_param("pagina", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "dados": dados,
                "totalRegistros": total
            })))
            .expect(1)
            .mount(api)
            .await;
    }

    async fn mount_sink(sink: &MockServer, hook: &str) {
        Mock::given(method("POST"))
            .and(path(hook))
            .respond_with(ResponseTemplate::new(200))
            .mount(sink)
            .await;
    }

    #[tokio::test]
    async fn syncs_both_collections() {
        let api = MockServer::start().await;
        let sink = MockServer::start().await;
        mount_auth(&api).await;
        mount_page(&api, "/clientes", 1, 0..3, 3).await;
        mount_page(&api, "/produtos", 1, 0..2, 2).await;
        mount_sink(&sink, "/hooks/clients").await;
        mount_sink(&sink, "/hooks/products").await;

        let outcome = orchestrator(&api, &sink).run_with_window(window()).await;
        let summary = outcome.result.expect("run should succeed");
        assert_eq!(summary.clients, SyncResult { total: 3, synced: 3 });
        assert_eq!(summary.products, SyncResult { total: 2, synced: 2 });
        assert_eq!(outcome.collections.len(), 2);
        assert!(outcome.collections.iter().all(|r| r.error.is_none()));
    }

    #[tokio::test]
    async fn relay_failure_does_not_stop_later_records_or_pages() {
        let api = MockServer::start().await;
        let sink = MockServer::start().await;
        mount_auth(&api).await;
        mount_page(&api, "/clientes", 1, 0..100, 150).await;
        mount_page(&api, "/clientes", 2, 100..150, 150).await;
        mount_page(&api, "/produtos", 1, 0..0, 0).await;

        // Record 5 is rejected by the sink.
        Mock::given(method("POST"))
            .and(path("/hooks/clients"))
            .and(body_partial_json(serde_json::json!({ "id": 5 })))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&sink)
            .await;
        mount_sink(&sink, "/hooks/clients").await;

        let outcome = orchestrator(&api, &sink).run_with_window(window()).await;
        let summary = outcome.result.expect("relay failures are absorbed");
        assert_eq!(summary.clients, SyncResult { total: 150, synced: 149 });

        let relayed = sink.received_requests().await.unwrap();
        assert_eq!(relayed.len(), 150);
    }

    #[tokio::test]
    async fn empty_window_makes_no_relay_calls() {
        let api = MockServer::start().await;
        let sink = MockServer::start().await;
        mount_auth(&api).await;
        mount_page(&api, "/clientes", 1, 0..0, 0).await;
        mount_page(&api, "/produtos", 1, 0..0, 0).await;

        let outcome = orchestrator(&api, &sink).run_with_window(window()).await;
        let summary = outcome.result.expect("empty run still succeeds");
        assert_eq!(summary.clients, SyncResult::default());
        assert_eq!(summary.products, SyncResult::default());
        assert!(sink.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn auth_failure_skips_all_collection_work() {
        let api = MockServer::start().await;
        let sink = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/autenticar"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .expect(1)
            .mount(&api)
            .await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&api)
            .await;

        let outcome = orchestrator(&api, &sink).run_with_window(window()).await;
        assert!(outcome.collections.is_empty());
        assert!(matches!(outcome.result, Err(OrchestrationError::Auth(_))));
        assert!(sink.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn client_fetch_failure_does_not_block_products() {
        let api = MockServer::start().await;
        let sink = MockServer::start().await;
        mount_auth(&api).await;

        Mock::given(method("GET"))
            .and(path("/clientes"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad window"))
            .mount(&api)
            .await;
        mount_page(&api, "/produtos", 1, 0..4, 4).await;
        mount_sink(&sink, "/hooks/products").await;

        let outcome = orchestrator(&api, &sink).run_with_window(window()).await;

        let products = &outcome.collections[1];
        assert_eq!(products.collection, Collection::Products);
        assert_eq!(products.result, SyncResult { total: 4, synced: 4 });
        assert!(products.error.is_none());

        let clients = &outcome.collections[0];
        assert!(clients.error.as_deref().unwrap().contains("bad window"));

        match outcome.result {
            Err(OrchestrationError::Fetch { collection, .. }) => assert_eq!(collection, Collection::Clients),
            other => panic!("expected fetch failure, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_failure_mid_walk_keeps_relayed_count() {
        let api = MockServer::start().await;
        let sink = MockServer::start().await;
        mount_auth(&api).await;
        mount_page(&api, "/produtos", 1, 0..100, 250).await;

        Mock::given(method("GET"))
            .and(path("/produtos"))
            .and(query_param("pagina", "2"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .expect(1)
            .mount(&api)
            .await;
        mount_page(&api, "/clientes", 1, 0..0, 0).await;
        mount_sink(&sink, "/hooks/products").await;

        let outcome = orchestrator(&api, &sink).run_with_window(window()).await;
        let products = &outcome.collections[1];
        assert_eq!(products.result, SyncResult { total: 250, synced: 100 });
        assert!(matches!(
            outcome.result,
            Err(OrchestrationError::Fetch { collection: Collection::Products, .. })
        ));
    }

    #[tokio::test]
    async fn malformed_record_is_skipped_and_siblings_still_relay() {
        let api = MockServer::start().await;
        let sink = MockServer::start().await;
        mount_auth(&api).await;

        Mock::given(method("GET"))
            .and(path("/clientes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "dados": [{ "id": 1 }, null, { "id": 3 }],
                "totalRegistros": "3"
            })))
            .expect(1)
            .mount(&api)
            .await;
        mount_page(&api, "/produtos", 1, 0..0, 0).await;
        mount_sink(&sink, "/hooks/clients").await;

        let outcome = orchestrator(&api, &sink).run_with_window(window()).await;
        let summary = outcome.result.expect("a malformed record does not fail the run");
        assert_eq!(summary.clients, SyncResult { total: 3, synced: 2 });

        let relayed = sink.received_requests().await.unwrap();
        assert_eq!(relayed.len(), 2);
    }
}
