use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::fetcher::{Page, PageRequest, PageSource};
use crate::http_client::RateLimitedTransport;
use crate::session::SessionStore;

/// A [`PageSource`] bound to the session of one account.
pub trait AccountSource: PageSource {
    /// Normalized account identifier, used as the session key
    fn account(&self) -> &str;

    fn session(&self) -> &SessionStore;
}

/// One logical portal client: a shared transport, the session of one
/// account, and that account's identifier.
///
/// The account is fixed at construction, so it can never change while
/// requests are in flight. Requests themselves may run concurrently.
pub struct EaClient {
    transport: Arc<RateLimitedTransport>,
    session: SessionStore,
    account: String,
}

impl EaClient {
    pub fn new(transport: Arc<RateLimitedTransport>, account: &str) -> Self {
        Self {
            transport,
            session: SessionStore::new(),
            account: account.trim().to_lowercase(),
        }
    }
}

impl AccountSource for EaClient {
    fn account(&self) -> &str {
        &self.account
    }

    fn session(&self) -> &SessionStore {
        &self.session
    }
}

#[async_trait]
impl PageSource for EaClient {
    async fn request(&self, request: PageRequest) -> Result<Page> {
        let cookie = self.session.header_value();
        self.transport.send(&request, cookie.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::Cookie;

    #[tokio::test]
    async fn test_account_is_normalized() {
        let transport = Arc::new(RateLimitedTransport::new().unwrap());
        let client = EaClient::new(transport, "  Dancer01 ");
        assert_eq!(client.account(), "dancer01");
        assert!(client.session().cookie().is_none());
        client.session().set_cookie(Cookie::new("M573SSID", "x"));
        assert_eq!(client.session().cookie().unwrap().value, "x");
    }
}
