#![forbid(unsafe_code)]

//! JSON snapshot/restore helpers (feature `state-persistence`).
//!
//! Thin codec layer built purely on the store's public contract: `with` for
//! pull, `set` for restore, `watch` for push-on-change. The store itself
//! never serializes anything and never catches a decode failure —
//! `serde_json::Error` values propagate to the caller untouched.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::registry::Subscription;
use crate::store::Store;

/// Encode the current state as a JSON string.
pub fn to_json<T: Serialize + 'static>(store: &Store<T>) -> serde_json::Result<String> {
    store.with(|value| serde_json::to_string(value))
}

/// Decode a value from a JSON string.
pub fn from_json<T: DeserializeOwned>(encoded: &str) -> serde_json::Result<T> {
    serde_json::from_str(encoded)
}

/// Decode `encoded` and commit it as one mutation.
///
/// On decode failure the store is untouched and nothing is notified.
pub fn restore_json<T: DeserializeOwned + 'static>(
    store: &Store<T>,
    encoded: &str,
) -> serde_json::Result<()> {
    let value = serde_json::from_str(encoded)?;
    store.set(value);
    Ok(())
}

/// Feed every committed state to `sink` as JSON, starting with the next
/// mutation. Encoding results are passed through as-is; the sink decides the
/// failure policy.
///
/// Drop the returned [`Subscription`] to stop autosaving.
pub fn autosave<T>(
    store: &Store<T>,
    sink: impl Fn(serde_json::Result<String>) + 'static,
) -> Subscription
where
    T: Clone + PartialEq + Serialize + 'static,
{
    store.watch(move |value| sink(serde_json::to_string(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Prefs {
        theme: String,
        font_size: u8,
    }

    fn prefs() -> Prefs {
        Prefs {
            theme: "dark".into(),
            font_size: 14,
        }
    }

    #[test]
    fn round_trip() {
        let store = Store::new(prefs());
        let encoded = to_json(&store).unwrap();

        let restored = Store::new(Prefs {
            theme: "light".into(),
            font_size: 10,
        });
        restore_json(&restored, &encoded).unwrap();
        assert_eq!(restored.get(), prefs());
        assert_eq!(restored.version(), 1, "restore is one mutation");
    }

    #[test]
    fn restore_notifies_watchers() {
        let store = Store::new(prefs());
        let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let _sub = store.watch(move |p: &Prefs| log.borrow_mut().push(p.theme.clone()));

        restore_json(&store, r#"{"theme":"sepia","font_size":12}"#).unwrap();
        assert_eq!(*seen.borrow(), vec!["sepia"]);
    }

    #[test]
    fn decode_failure_propagates_and_leaves_store() {
        let store = Store::new(prefs());
        let err = restore_json(&store, "{not json").unwrap_err();
        assert!(err.is_syntax());
        assert_eq!(store.get(), prefs());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn from_json_decodes_standalone_values() {
        let decoded: Prefs = from_json(r#"{"theme":"dark","font_size":14}"#).unwrap();
        assert_eq!(decoded, prefs());
    }

    #[test]
    fn autosave_streams_committed_states() {
        let store = Store::new(prefs());
        let saved: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&saved);
        let sub = autosave(&store, move |encoded| log.borrow_mut().push(encoded.unwrap()));

        store.compute(|p| Prefs {
            font_size: p.font_size + 2,
            ..p.clone()
        });
        assert_eq!(saved.borrow().len(), 1);
        assert!(saved.borrow()[0].contains("\"font_size\":16"));

        drop(sub);
        store.compute(|p| Prefs {
            font_size: p.font_size + 1,
            ..p.clone()
        });
        assert_eq!(saved.borrow().len(), 1, "dropped autosave stops streaming");
    }
}
