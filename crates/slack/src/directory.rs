use std::{sync::Arc, time::Duration};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, warn};

use crate::{
    actions::{ensure_ok, PlatformError},
    transport::SlackTransport,
};

const PAGE_LIMIT: u32 = 200;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_private: bool,
}

struct Cached<T> {
    fetched_at: Instant,
    items: Vec<T>,
}

type Slot<T> = Mutex<Option<Cached<T>>>;

/// User and channel lookups. Every lookup fetches the full list and filters it
/// locally; with a non-zero `cache_ttl` the list is reused until it is older
/// than the TTL.
pub struct Directory {
    transport: Arc<dyn SlackTransport>,
    cache_ttl: Duration,
    users: Slot<UserProfile>,
    public_channels: Slot<ChannelInfo>,
    private_channels: Slot<ChannelInfo>,
}

impl Directory {
    pub fn new(transport: Arc<dyn SlackTransport>, cache_ttl: Duration) -> Self {
        Self {
            transport,
            cache_ttl,
            users: Mutex::new(None),
            public_channels: Mutex::new(None),
            private_channels: Mutex::new(None),
        }
    }

    pub async fn all_users(&self) -> Result<Vec<UserProfile>, PlatformError> {
        self.cached(&self.users, "users.list", "members", json!({})).await
    }

    pub async fn user_by_id(&self, user_id: &str) -> Result<Option<UserProfile>, PlatformError> {
        Ok(self.all_users().await?.into_iter().find(|user| user.id == user_id))
    }

    pub async fn user_by_name(&self, name: &str) -> Result<Option<UserProfile>, PlatformError> {
        Ok(self.all_users().await?.into_iter().find(|user| user.name == name))
    }

    /// Lookup failures are logged and read as an unknown user.
    pub async fn username_by_id(&self, user_id: &str) -> Option<String> {
        match self.user_by_id(user_id).await {
            Ok(user) => user.map(|user| user.name),
            Err(error) => {
                warn!(user = %user_id, error = %error, "user lookup failed");
                None
            }
        }
    }

    pub async fn all_public_channels(&self) -> Result<Vec<ChannelInfo>, PlatformError> {
        self.cached(
            &self.public_channels,
            "conversations.list",
            "channels",
            json!({ "types": "public_channel", "exclude_archived": true }),
        )
        .await
    }

    pub async fn channel_by_name(&self, name: &str) -> Result<Option<ChannelInfo>, PlatformError> {
        let name = name.trim_start_matches('#');
        Ok(self.all_public_channels().await?.into_iter().find(|channel| channel.name == name))
    }

    pub async fn channel_by_id(&self, channel_id: &str) -> Result<Option<ChannelInfo>, PlatformError> {
        Ok(self.all_public_channels().await?.into_iter().find(|channel| channel.id == channel_id))
    }

    pub async fn all_private_channels(&self) -> Result<Vec<ChannelInfo>, PlatformError> {
        self.cached(
            &self.private_channels,
            "conversations.list",
            "channels",
            json!({ "types": "private_channel", "exclude_archived": true }),
        )
        .await
    }

    pub async fn private_channel_by_name(
        &self,
        name: &str,
    ) -> Result<Option<ChannelInfo>, PlatformError> {
        let name = name.trim_start_matches('#');
        Ok(self.all_private_channels().await?.into_iter().find(|channel| channel.name == name))
    }

    pub async fn private_channel_by_id(
        &self,
        channel_id: &str,
    ) -> Result<Option<ChannelInfo>, PlatformError> {
        Ok(self.all_private_channels().await?.into_iter().find(|channel| channel.id == channel_id))
    }

    async fn cached<T>(
        &self,
        slot: &Slot<T>,
        method: &str,
        field: &str,
        params: Value,
    ) -> Result<Vec<T>, PlatformError>
    where
        T: DeserializeOwned + Clone,
    {
        if self.cache_ttl.is_zero() {
            return fetch_all(self.transport.as_ref(), method, field, params).await;
        }

        let mut slot = slot.lock().await;
        if let Some(cached) = slot.as_ref().filter(|cached| cached.fetched_at.elapsed() < self.cache_ttl)
        {
            debug!(method, "directory cache hit");
            return Ok(cached.items.clone());
        }

        let items = fetch_all(self.transport.as_ref(), method, field, params).await?;
        *slot = Some(Cached { fetched_at: Instant::now(), items: items.clone() });
        Ok(items)
    }
}

/// Follows `response_metadata.next_cursor` until the platform reports no more
/// pages.
async fn fetch_all<T>(
    transport: &dyn SlackTransport,
    method: &str,
    field: &str,
    params: Value,
) -> Result<Vec<T>, PlatformError>
where
    T: DeserializeOwned,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let mut page_params = params.clone();
        if let Some(object) = page_params.as_object_mut() {
            object.insert("limit".to_owned(), json!(PAGE_LIMIT));
            if let Some(cursor) = cursor.take() {
                object.insert("cursor".to_owned(), Value::String(cursor));
            }
        }

        let reply = transport.call(method, page_params).await?;
        ensure_ok(method, &reply)?;

        let page = reply.get(field).cloned().unwrap_or_else(|| Value::Array(Vec::new()));
        let page: Vec<T> = serde_json::from_value(page).map_err(|error| PlatformError::Decode {
            method: method.to_owned(),
            reason: format!("`{field}`: {error}"),
        })?;
        items.extend(page);

        match reply
            .pointer("/response_metadata/next_cursor")
            .and_then(Value::as_str)
            .filter(|next| !next.is_empty())
        {
            Some(next) => cursor = Some(next.to_owned()),
            None => return Ok(items),
        }
    }
}
