//!
//! Secrets are read from configuration but never written back out, so only
//! [`Deserialize`] is provided.
//!

use serde::{de, Deserialize};

use crate::{Secret, Strategy};

impl<'de, T, I> Deserialize<'de> for Secret<T, I>
where
    T: de::DeserializeOwned,
    I: Strategy<T>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        T::deserialize(deserializer).map(Self::new)
    }
}
