use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::state::LogCategory;
use crate::sync::RunOutcome;

/// The two record sets relayed from DataSystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Clients,
    Products,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Clients => "clients",
            Collection::Products => "products",
        }
    }

    /// List endpoint path, relative to the DataSystem base URL.
    pub fn path(&self) -> &'static str {
        match self {
            Collection::Clients => "/clientes",
            Collection::Products => "/produtos",
        }
    }

    /// Query keys for the window's start and end dates.
    pub fn window_params(&self) -> (&'static str, &'static str) {
        match self {
            Collection::Clients => ("dataCadInicio", "dataCadFim"),
            Collection::Products => ("dataUltimaCompraInicio", "dataUltimaCompraFim"),
        }
    }

    /// `campoOrdem` and `ordem` values.
    pub fn sort(&self) -> (&'static str, &'static str) {
        match self {
            Collection::Clients => ("ultCompra", "DESC"),
            Collection::Products => ("PRODUTODES", "ASC"),
        }
    }

    pub fn log_category(&self) -> LogCategory {
        match self {
            Collection::Clients => LogCategory::Client,
            Collection::Products => LogCategory::Product,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-collection counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    /// Count reported by DataSystem for the window.
    pub total: u64,
    /// Records the sink acknowledged with a 2xx.
    pub synced: u64,
}

/// Anything that can execute one full sync run.
#[async_trait]
pub trait SyncRunner: Send + Sync {
    async fn run_once(&self) -> RunOutcome;
}
