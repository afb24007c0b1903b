// SPDX-License-Identifier: GPL-3.0-only

use std::{any::Any, collections::HashMap};

/// Named, typed APIs a backend publishes to other in-process components.
#[derive(Default)]
pub struct ApiRegistry {
    apis: HashMap<&'static str, Box<dyn Any>>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("API {0} is already registered")]
pub struct AlreadyRegistered(pub &'static str);

impl ApiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Any>(&mut self, name: &'static str, api: T) -> Result<(), AlreadyRegistered> {
        if self.apis.contains_key(name) {
            return Err(AlreadyRegistered(name));
        }
        self.apis.insert(name, Box::new(api));
        Ok(())
    }

    /// Looks up `name`, `None` if it is missing or was registered with another type.
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.apis.get(name).and_then(|api| api.downcast_ref::<T>())
    }
}

impl std::fmt::Debug for ApiRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRegistry")
            .field("apis", &self.apis.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn typed_lookup() {
        let mut registry = ApiRegistry::new();
        registry.register("answer_v1", 42u32).unwrap();
        assert_eq!(registry.get::<u32>("answer_v1"), Some(&42));
        assert_eq!(registry.get::<u64>("answer_v1"), None);
        assert_eq!(registry.get::<u32>("answer_v2"), None);
        assert_eq!(
            registry.register("answer_v1", 7u32),
            Err(AlreadyRegistered("answer_v1"))
        );
    }
}
