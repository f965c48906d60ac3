//! Preview links, logged the first time each extension is built.

use std::sync::Arc;

use extdev_core::StoreEvent;
use extdev_specs::{PreviewContext, SpecificationRegistry};
use extdev_store::StoreSubscription;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Preview message for a newly created extension, if its specification has one.
pub fn preview_for(
    event: &StoreEvent,
    specifications: &SpecificationRegistry,
    host: &str,
    store_fqdn: &str,
) -> Option<String> {
    let StoreEvent::Update {
        uuid,
        payload,
        is_full_snapshot: true,
        ..
    } = event
    else {
        return None;
    };
    let Some(spec) = specifications.spec_for_type(&payload.extension_type) else {
        warn!(%uuid, extension_type = %payload.extension_type, "no specification for extension type");
        return None;
    };
    spec.preview_message(&PreviewContext {
        host,
        uuid,
        config: &payload.config,
        store_fqdn,
    })
}

/// Log a preview link for every extension the store creates, until `cancel`.
pub async fn announce_previews(
    mut subscription: StoreSubscription,
    specifications: Arc<SpecificationRegistry>,
    host: String,
    store_fqdn: String,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => event,
                None => break,
            },
            () = cancel.cancelled() => break,
        };
        if let Some(message) = preview_for(&event, &specifications, &host, &store_fqdn) {
            info!(uuid = %event.uuid(), "{message}");
        }
    }
    debug!("preview announcer stopped");
}
