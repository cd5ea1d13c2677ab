//! Live class capability
//!
//! Types opt into reloading by implementing [`LiveClass`]. Every hook has a
//! no-op default, so a type only implements what it needs.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A type whose live instances can be migrated to freshly built code.
///
/// # Safety
/// Implementors guarantee that
/// - the first machine word of every value is its vtable pointer into the
///   module that built it (single inheritance, no virtual bases), and
/// - the allocation of a registered value is large enough for whatever a
///   rebuilt module's placement constructor writes into it.
pub unsafe trait LiveClass: 'static {
    /// Called before the instance is migrated
    fn pre_reload(&mut self) {}

    /// Called after the instance runs on the new code
    fn post_reload(&mut self) {}

    /// Capture state to carry across the migration
    fn save_state(&self) -> Option<Vec<u8>> {
        None
    }

    /// Restore state captured by [`save_state`](Self::save_state)
    fn load_state(&mut self, _state: &[u8]) {}
}

/// Encode a state value for [`LiveClass::save_state`]
pub fn encode_state<S: Serialize>(state: &S) -> Option<Vec<u8>> {
    match bincode::serialize(state) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            log::warn!("Failed to capture state of {}: {}", std::any::type_name::<S>(), e);
            None
        }
    }
}

/// Decode a state value in [`LiveClass::load_state`]
pub fn decode_state<S: DeserializeOwned>(bytes: &[u8]) -> Option<S> {
    match bincode::deserialize(bytes) {
        Ok(state) => Some(state),
        Err(e) => {
            log::warn!("Failed to restore state of {}: {}", std::any::type_name::<S>(), e);
            None
        }
    }
}
