//! Resource identity lookup

use crate::cluster::ResourceStore;
use crate::error::ApiFailure;
use tracing::debug;

/// What the cluster currently holds under a name
#[derive(Debug)]
pub enum Identity<K> {
    Present(K),
    Absent,
    QueryFailed(ApiFailure),
}

/// Look up `name` once and classify the answer
///
/// Only a not-found status means absence; any other failure is reported
/// as such and must not be mistaken for a missing object.
pub async fn resolve<K>(store: &dyn ResourceStore<K>, name: &str) -> Identity<K> {
    match store.get(name).await {
        Ok(live) => Identity::Present(live),
        Err(failure) if failure.is_not_found() => {
            debug!(name = %name, "Resource not found");
            Identity::Absent
        }
        Err(failure) => Identity::QueryFailed(failure),
    }
}
