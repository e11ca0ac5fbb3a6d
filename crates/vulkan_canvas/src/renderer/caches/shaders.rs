//! Shader modules loaded once per device

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use crate::vulkan::{DeviceRef, ShaderModule, VulkanError, VulkanResult};

/// Compiled shader modules by name
///
/// A name `quad` resolves to `<directory>/quad.spv` on first use. Modules
/// can also be registered up front, which is how embedded shaders and tests
/// supply them.
pub struct ShaderCache {
    device: DeviceRef,
    directory: Option<PathBuf>,
    modules: RefCell<HashMap<String, Rc<ShaderModule>>>,
}

impl ShaderCache {
    /// Empty cache reading from `directory` when set
    pub fn new(device: DeviceRef, directory: Option<PathBuf>) -> Self {
        Self {
            device,
            directory,
            modules: RefCell::new(HashMap::new()),
        }
    }

    /// Register SPIR-V bytes under `name`, replacing any earlier module
    pub fn insert_bytes(&self, name: &str, bytes: &[u8]) -> VulkanResult<()> {
        let module = ShaderModule::from_bytes(self.device.clone(), bytes)?;
        self.modules.borrow_mut().insert(name.to_owned(), Rc::new(module));
        Ok(())
    }

    /// Register SPIR-V words under `name`, replacing any earlier module
    pub fn insert_spirv(&self, name: &str, words: &[u32]) -> VulkanResult<()> {
        let module = ShaderModule::from_words(self.device.clone(), words)?;
        self.modules.borrow_mut().insert(name.to_owned(), Rc::new(module));
        Ok(())
    }

    /// Module for `name`, loading it from the shader directory if needed
    pub fn get(&self, name: &str) -> VulkanResult<Rc<ShaderModule>> {
        if let Some(module) = self.modules.borrow().get(name) {
            return Ok(module.clone());
        }

        let path = self
            .directory
            .as_ref()
            .map(|dir| dir.join(format!("{name}.spv")))
            .filter(|path| path.is_file())
            .ok_or_else(|| VulkanError::ShaderNotFound(name.to_owned()))?;

        let module = Rc::new(ShaderModule::from_file(self.device.clone(), &path)?);
        log::debug!("Loaded shader '{name}' from {}", path.display());

        self.modules.borrow_mut().insert(name.to_owned(), module.clone());
        Ok(module)
    }

    /// Number of loaded modules
    pub fn len(&self) -> usize {
        self.modules.borrow().len()
    }

    /// True when nothing is loaded
    pub fn is_empty(&self) -> bool {
        self.modules.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockDevice};
    use crate::vulkan::SPIRV_MAGIC;

    #[test]
    fn test_missing_shader_is_reported_by_name() {
        let mock = MockDevice::new();
        let cache = ShaderCache::new(mock.device(), None);

        match cache.get("quad") {
            Err(VulkanError::ShaderNotFound(name)) => assert_eq!(name, "quad"),
            other => panic!("unexpected result: {:?}", other.map(|m| m.handle())),
        }
    }

    #[test]
    fn test_registered_module_is_shared() {
        let mock = MockDevice::new();
        let cache = ShaderCache::new(mock.device(), None);
        cache.insert_spirv("quad", &[SPIRV_MAGIC, 0]).unwrap();

        let a = cache.get("quad").unwrap();
        let b = cache.get("quad").unwrap();
        assert_eq!(a.handle(), b.handle());
        assert_eq!(mock.count(|c| matches!(c, Call::CreateShaderModule(_))), 1);
    }

    #[test]
    fn test_loads_from_directory() {
        let dir = std::env::temp_dir().join(format!("vulkan_canvas_shaders_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let bytes: Vec<u8> = [SPIRV_MAGIC, 0x0001_0000].iter().flat_map(|w| w.to_le_bytes()).collect();
        std::fs::write(dir.join("overlay.spv"), bytes).unwrap();

        let mock = MockDevice::new();
        let cache = ShaderCache::new(mock.device(), Some(dir.clone()));
        assert!(cache.get("overlay").is_ok());
        assert!(cache.get("missing").is_err());
        assert_eq!(cache.len(), 1);

        std::fs::remove_dir_all(dir).unwrap();
    }
}
