//! Creation of BPF modules from object bytes

use crate::{
    module::{AyaModule, Module},
    object::ObjectSource,
};
use anyhow::{Context, Result};
use aya::Bpf;
use log::info;

/// Builds modules from a BPF ELF object
pub trait ModuleFactory: Send {
    /// Create a module known to the kernel as `name`
    fn create_module(&self, name: &str) -> Result<Box<dyn Module>>;
}

/// Creates aya-backed modules from the bytes of an [`ObjectSource`]
pub struct AyaModuleFactory {
    source: Box<dyn ObjectSource>,
}

impl AyaModuleFactory {
    /// # Arguments
    ///
    /// * `source` - Supplies the ELF object each time a module is created
    ///
    /// # Returns
    ///
    /// AyaModuleFactory loading modules from `source`
    pub fn new(source: Box<dyn ObjectSource>) -> Self {
        Self { source }
    }
}

impl ModuleFactory for AyaModuleFactory {
    fn create_module(&self, name: &str) -> Result<Box<dyn Module>> {
        let object = self.source.load().context("loading BPF object")?;

        let bpf = Bpf::load(&object).context("loading module")?;
        info!("BPF module {} created ({} bytes)", name, object.len());

        Ok(Box::new(AyaModule::new(name, bpf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use std::borrow::Cow;

    struct MockObjectSource {
        object: Option<Vec<u8>>,
    }

    impl ObjectSource for MockObjectSource {
        fn load(&self) -> Result<Cow<'_, [u8]>> {
            match &self.object {
                Some(object) => Ok(Cow::Borrowed(object)),
                None => Err(LoadError::NoObjectAvailable.into()),
            }
        }
    }

    #[test]
    fn test_object_source_error() {
        let factory = AyaModuleFactory::new(Box::new(MockObjectSource { object: None }));

        let err = factory.create_module("mock-module").err().unwrap();

        assert_eq!(
            err.downcast_ref::<LoadError>(),
            Some(&LoadError::NoObjectAvailable)
        );
        assert!(format!("{:#}", err).starts_with("loading BPF object"));
    }

    #[test]
    fn test_invalid_object_error() {
        let factory = AyaModuleFactory::new(Box::new(MockObjectSource {
            object: Some(b"not an ELF object".to_vec()),
        }));

        let err = factory.create_module("mock-module").err().unwrap();

        assert!(format!("{:#}", err).starts_with("loading module"));
    }
}
