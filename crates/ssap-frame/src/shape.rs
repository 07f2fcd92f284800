use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;

/// A decode target for a `response` payload.
///
/// The wire format reuses the `response` type for every remote operation,
/// so the payload schema is known only to the caller that sent the request.
pub trait PayloadShape {
    /// The decoded value.
    type Output;

    /// Decode the payload JSON text.
    fn decode(&self, json: &str) -> serde_json::Result<Self::Output>;
}

/// Shape that decodes into any `DeserializeOwned` type.
pub struct Typed<T>(PhantomData<fn() -> T>);

impl<T> Typed<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Typed<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Typed<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> Copy for Typed<T> {}

impl<T> fmt::Debug for Typed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Typed<{}>", std::any::type_name::<T>())
    }
}

impl<T: DeserializeOwned> PayloadShape for Typed<T> {
    type Output = T;

    fn decode(&self, json: &str) -> serde_json::Result<T> {
        serde_json::from_str(json)
    }
}
