use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::connector::Collection;
use crate::datasystem::models::{display_id, ClientRecord, ProductRecord};

/// A DataSystem record that knows its sink payload shape.
pub trait RelayRecord: DeserializeOwned + Send + Sync {
    type Payload: Serialize + Send + Sync;

    const COLLECTION: Collection;

    /// Identifier used when logging a failed relay.
    fn record_id(&self) -> String;

    fn to_payload(&self, synced_at: DateTime<Utc>) -> Self::Payload;
}

/// Body POSTed to the clients webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientPayload {
    pub id: Value,
    pub nome: Value,
    #[serde(rename = "dataCadastro")]
    pub data_cadastro: Value,
    #[serde(rename = "ultimaCompra")]
    pub ultima_compra: Value,
    pub email: Value,
    pub telefone: Value,
    pub sync_date: String,
}

/// Body POSTed to the products webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPayload {
    pub id: Value,
    pub codigo: Value,
    pub descricao: Value,
    pub preco: Value,
    pub estoque: Value,
    pub ultima_compra: Value,
    pub sync_date: String,
}

/// ISO-8601 UTC with millisecond precision, e.g. `2024-05-02T12:00:00.000Z`.
pub fn sync_date(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl RelayRecord for ClientRecord {
    type Payload = ClientPayload;

    const COLLECTION: Collection = Collection::Clients;

    fn record_id(&self) -> String {
        display_id(&self.id)
    }

    fn to_payload(&self, synced_at: DateTime<Utc>) -> ClientPayload {
        ClientPayload {
            id: self.id.clone(),
            nome: self.nome.clone(),
            data_cadastro: self.data_cadastro.clone(),
            ultima_compra: self.ultima_compra.clone(),
            email: self.email.clone(),
            telefone: self.telefone.clone(),
            sync_date: sync_date(synced_at),
        }
    }
}

impl RelayRecord for ProductRecord {
    type Payload = ProductPayload;

    const COLLECTION: Collection = Collection::Products;

    fn record_id(&self) -> String {
        display_id(&self.id)
    }

    fn to_payload(&self, synced_at: DateTime<Utc>) -> ProductPayload {
        ProductPayload {
            id: self.id.clone(),
            codigo: self.codigo.clone(),
            descricao: self.descricao.clone(),
            preco: self.preco.clone(),
            estoque: self.estoque.clone(),
            ultima_compra: self.data_ultima_compra.clone(),
            sync_date: sync_date(synced_at),
        }
    }
}
