//! Server URL lookup
//!
//! The agent-upgrade predicate compares a workload's `CATTLE_SERVER` env var
//! against the URL agents are expected to dial. The value either comes from a
//! static override or from the `server-url` Setting, kept fresh by a
//! reflector so lookups never block.

use std::future::Future;
use std::pin::Pin;

use futures::StreamExt;
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::crd::{Setting, SERVER_URL_SETTING};
use crate::Error;

/// Read-only accessor for the currently configured server URL
#[cfg_attr(test, automock)]
pub trait ServerUrlSource: Send + Sync {
    /// The current server URL, or an empty string when none is configured
    fn current_server_url(&self) -> String;
}

/// Server URL fixed at startup
#[derive(Clone, Debug)]
pub struct StaticServerUrl {
    url: String,
}

impl StaticServerUrl {
    /// Create a source that always answers `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl ServerUrlSource for StaticServerUrl {
    fn current_server_url(&self) -> String {
        self.url.clone()
    }
}

/// Server URL read from the cached `server-url` Setting
#[derive(Clone)]
pub struct SettingServerUrl {
    store: Store<Setting>,
}

impl SettingServerUrl {
    /// Wrap an existing reflector store of Settings
    pub fn from_store(store: Store<Setting>) -> Self {
        Self { store }
    }

    /// Start watching the `server-url` Setting.
    ///
    /// Returns the source together with the reflector future that keeps it
    /// populated; the caller must drive the future alongside the controllers.
    pub fn watch(
        client: Client,
        watch_timeout_secs: u32,
    ) -> (Self, Pin<Box<dyn Future<Output = ()> + Send>>) {
        let settings: Api<Setting> = Api::all(client);
        let (store, writer) = reflector::store();

        let config = watcher::Config::default()
            .fields(&format!("metadata.name={SERVER_URL_SETTING}"))
            .timeout(watch_timeout_secs);

        let reflector_future = reflector::reflector(writer, watcher(settings, config))
            .default_backoff()
            .for_each(|event| {
                match event {
                    Ok(_) => debug!(setting = SERVER_URL_SETTING, "setting cache updated"),
                    Err(e) => warn!(error = %e, setting = SERVER_URL_SETTING, "setting watch error"),
                }
                std::future::ready(())
            });

        (Self::from_store(store), Box::pin(reflector_future))
    }

    /// Wait until the first list of Settings has been cached.
    ///
    /// Before that the store is empty and every lookup answers "", which is
    /// indistinguishable from a cluster without the setting.
    pub async fn wait_until_ready(&self) -> Result<(), Error> {
        self.store.wait_until_ready().await.map_err(|e| {
            Error::config(format!("{SERVER_URL_SETTING} setting cache closed: {e}"))
        })
    }
}

impl ServerUrlSource for SettingServerUrl {
    fn current_server_url(&self) -> String {
        self.store
            .get(&ObjectRef::new(SERVER_URL_SETTING))
            .map(|setting| setting.effective_value().to_string())
            .unwrap_or_default()
    }
}
