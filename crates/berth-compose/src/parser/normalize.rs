//! Post-parse normalization passes.
//!
//! Implicit defaults are applied here, as explicit steps over an already
//! extracted [`Document`], never while extracting it.

use berth_common::constants::{DEFAULT_NETWORK_DRIVER, DEFAULT_NETWORK_NAME};
use serde_yaml::{Mapping, Value};

use super::model::{Document, Network};

/// Synthesizes the default bridge network when it is needed.
///
/// It is needed when the document declares no network at all but has at
/// least one service, or when some service attaches to it implicitly and
/// it is not declared. Returns `true` if the network was added.
pub fn ensure_default_network(document: &mut Document) -> bool {
    if document.services.is_empty() || document.networks.contains_key(DEFAULT_NETWORK_NAME) {
        return false;
    }
    let implicitly_used = document
        .services
        .values()
        .any(|s| s.networks.is_empty() && s.network_mode.is_none());
    if !document.networks.is_empty() && !implicitly_used {
        return false;
    }

    let mut raw = Mapping::new();
    let _ = raw.insert(
        Value::String("driver".into()),
        Value::String(DEFAULT_NETWORK_DRIVER.into()),
    );
    let network = Network {
        driver: Some(DEFAULT_NETWORK_DRIVER.to_owned()),
        raw,
        ..Network::default()
    };
    let _ = document
        .networks
        .insert(DEFAULT_NETWORK_NAME.to_owned(), network);
    true
}

/// Writes networks present in `document` but missing from the raw tree
/// back into it, so the rendered configuration shows synthesized defaults.
pub fn sync_networks(raw: &mut Value, document: &Document) {
    let Value::Mapping(top) = raw else {
        return;
    };
    let networks_key = Value::String("networks".into());
    if !matches!(top.get(&networks_key), Some(Value::Mapping(_))) {
        let _ = top.insert(networks_key.clone(), Value::Mapping(Mapping::new()));
    }
    let Some(Value::Mapping(networks)) = top.get_mut(&networks_key) else {
        return;
    };
    for (name, network) in &document.networks {
        let key = Value::String(name.clone());
        if !networks.contains_key(&key) {
            let _ = networks.insert(key, Value::Mapping(network.raw.clone()));
        }
    }
}
