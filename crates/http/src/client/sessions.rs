//! Session registry and audit API client methods

use super::{AuthClient, ClientError, Method, RequestOptions};
use crate::types::{
    ActiveSessions, ActiveSessionsRequest, AuditPage, AuditQuery, MessageResponse, RevokeRequest,
};

impl AuthClient {
    /// List device sessions, optionally filtered by status
    pub async fn list_active(&self, status: Option<&str>) -> Result<ActiveSessions, ClientError> {
        let path = self.endpoints().sessions_active.clone();
        let request = ActiveSessionsRequest {
            status: status.map(str::to_string),
        };
        self.send_json(Method::Post, &path, Some(&request), RequestOptions::default())
            .await
    }

    /// Revoke one device session
    pub async fn revoke_session(
        &self,
        request: &RevokeRequest,
        options: RequestOptions,
    ) -> Result<MessageResponse, ClientError> {
        let path = self.endpoints().sessions_revoke.clone();
        self.send_json(Method::Post, &path, Some(request), options)
            .await
    }

    /// Fetch one page of the audit log
    pub async fn audit_logs(&self, query: &AuditQuery) -> Result<AuditPage, ClientError> {
        let path = self.endpoints().audit.clone();
        self.send_json(Method::Post, &path, Some(query), RequestOptions::default())
            .await
    }
}
