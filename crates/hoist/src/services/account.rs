use hoist_api::Account;
use hoist_http::{Method, Request};

use crate::client::Hoist;
use crate::error::Result;

pub struct AccountClient<'a> {
    pub(crate) hoist: &'a Hoist,
}

impl AccountClient<'_> {
    /// The account behind the active token.
    ///
    /// Cached for a few minutes, keyed by the token itself, so a session
    /// reconfigured with a different credential never sees a stale
    /// identity.
    pub async fn whoami(&self) -> Result<Account> {
        let token = self.hoist.config().user_token.clone();
        if let Some(account) = self.hoist.account_cache().get(&token) {
            return Ok(account);
        }
        let account: Account = self
            .hoist
            .transport()
            .send(Request::new(Method::Get, "user"))
            .await?
            .json()
            .await?;
        self.hoist.account_cache().put(token, account.clone());
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::*;

    #[tokio::test]
    async fn whoami_is_cached_per_token() {
        let client = MockClient::new(|_request| MockResponse::json(account_json()));
        let hoist = hoist_with(client.clone());

        let first = hoist.account().whoami().await.unwrap();
        let second = hoist.account().whoami().await.unwrap();
        assert_eq!(first.name, "petra");
        assert_eq!(second.name, "petra");
        assert_eq!(client.requests().len(), 1);
    }
}
