//! Authentication API client methods

use super::{AuthClient, ClientError, Credential, Method, RequestOptions, TokenKind};
use crate::types::{
    DashboardResponse, LoginRequest, LoginResponse, LogoutRequest, MessageResponse,
    RefreshRequest, TokenSet,
};
use tether_core::Role;

impl AuthClient {
    /// Authenticate against the login endpoint of `request.role`
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ClientError> {
        let path = self.endpoints().login_for(request.role).to_string();
        self.send_json(Method::Post, &path, Some(request), RequestOptions::default())
            .await
    }

    /// Probe the dashboard of `role` with the stored access token
    pub async fn dashboard(&self, role: Role) -> Result<DashboardResponse, ClientError> {
        let path = self.endpoints().dashboard_for(role).to_string();
        self.send_json::<(), _>(Method::Get, &path, None, RequestOptions::default())
            .await
    }

    /// Probe the dashboard with a token that is not stored yet
    pub async fn dashboard_with_token(
        &self,
        role: Role,
        access_token: &str,
    ) -> Result<DashboardResponse, ClientError> {
        let path = self.endpoints().dashboard_for(role).to_string();
        let options = RequestOptions::default().with_credential(Credential::Explicit {
            token: access_token.to_string(),
            kind: TokenKind::Access,
        });
        self.send_json::<(), _>(Method::Get, &path, None, options)
            .await
    }

    /// Exchange the refresh token for a new token set. Single attempt,
    /// no authorization header, failures go back to the caller only.
    pub async fn refresh(&self, request: &RefreshRequest) -> Result<TokenSet, ClientError> {
        let path = self.endpoints().refresh.clone();
        let options = RequestOptions::single_shot().with_credential(Credential::None);
        self.send_json(Method::Post, &path, Some(request), options)
            .await
    }

    /// Tell the server the session ended, authenticated by the refresh token
    pub async fn logout(&self, request: &LogoutRequest) -> Result<MessageResponse, ClientError> {
        let path = self.endpoints().logout.clone();
        let credential = request
            .refresh_token
            .clone()
            .map_or(Credential::None, |token| Credential::Explicit {
                token,
                kind: TokenKind::Refresh,
            });
        let options = RequestOptions::single_shot().with_credential(credential);
        self.send_json(Method::Post, &path, Some(request), options)
            .await
    }
}
