use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};

use crate::connector::Collection;

/// Fixed page size for every list endpoint (`itensPorPagina`).
pub const PAGE_SIZE: u64 = 100;

/// Date window for one run: yesterday through today in the sync offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SyncWindow {
    /// Window ending on `today`.
    pub fn ending_on(today: NaiveDate) -> Self {
        Self {
            start: today.pred_opt().unwrap_or(today),
            end: today,
        }
    }

    /// Window for the calendar day `now` falls on in `offset`.
    pub fn at<Tz: TimeZone>(now: DateTime<Tz>, offset: FixedOffset) -> Self {
        Self::ending_on(now.with_timezone(&offset).date_naive())
    }

    pub fn start_param(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

/// Query string for one page of a collection's list endpoint.
pub fn list_query(collection: Collection, window: &SyncWindow, page: u64) -> Vec<(&'static str, String)> {
    let (start_key, end_key) = collection.window_params();
    let (sort_field, sort_order) = collection.sort();

    vec![
        (start_key, window.start_param()),
        (end_key, window.end_param()),
        ("campoOrdem", sort_field.to_string()),
        ("ordem", sort_order.to_string()),
        ("itensPorPagina", PAGE_SIZE.to_string()),
        ("pagina", page.to_string()),
    ]
}

/// Number of pages to request, fixed from the first response.
///
/// A positive `totalPaginas` wins; otherwise it is derived from the total,
/// with a floor of one page.
pub fn page_count(total_pages: Option<u64>, total: u64) -> u64 {
    match total_pages {
        Some(pages) if pages > 0 => pages,
        _ => total.div_ceil(PAGE_SIZE).max(1),
    }
}
