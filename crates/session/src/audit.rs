//! Admin audit log reader

use tether_http::AuthClient;
use tether_http::types::{AuditPage, AuditQuery};

use crate::error::SessionResult;

#[derive(Debug, Clone)]
pub struct AuditLog {
    client: AuthClient,
}

impl AuditLog {
    pub const fn new(client: AuthClient) -> Self {
        Self { client }
    }

    /// Fetch one page of audit entries
    pub async fn fetch(&self, query: &AuditQuery) -> SessionResult<AuditPage> {
        let page = self.client.audit_logs(query).await?;
        let suspicious = page.suspicious().count();
        tracing::debug!(
            page = query.page,
            total = page.total_count,
            pages = page.total_pages(query.limit),
            suspicious,
            "audit page fetched"
        );
        Ok(page)
    }

    /// Fetch every page for `query`, starting at its page
    pub async fn fetch_all(&self, query: &AuditQuery) -> SessionResult<Vec<AuditPage>> {
        let mut query = query.clone();
        let mut pages = Vec::new();
        loop {
            let page = self.fetch(&query).await?;
            let total_pages = page.total_pages(query.limit);
            let empty = page.logs.is_empty();
            pages.push(page);
            if empty || u64::from(query.page) >= total_pages {
                break;
            }
            query.page += 1;
        }
        Ok(pages)
    }
}
