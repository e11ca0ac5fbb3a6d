//! Images uploaded to the device and kept while in use
//!
//! The cache holds one [`Texture`] per [`ImageId`]. Frames borrow textures as
//! `Rc` clones for as long as their GPU work may read them, so a texture with
//! a single strong reference is idle and safe to release.

use ash::vk;
use std::cell::Cell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{CachedMemory, ResamplingQuality, Samplers};
use crate::foundation::math::PixelArgb;
use crate::foundation::time::Clock;
use crate::vulkan::{
    DescriptorPool, DeviceRef, ImageCreateInfo, ImageDescriptor, ImageTransfer, MemoryImage, VulkanError,
    VulkanResult,
};

static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a [`PixelImage`] in the texture cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(pub u64);

/// Premultiplied BGRA8 pixels in host memory
///
/// Every mutation bumps the image's generation, which makes the texture
/// cache upload it again on next use.
#[derive(Debug)]
pub struct PixelImage {
    id: ImageId,
    generation: Cell<u64>,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl PixelImage {
    /// Transparent image
    pub fn new(width: u32, height: u32) -> VulkanResult<Self> {
        Self::with_pixels(width, height, vec![0; width as usize * height as usize * 4])
    }

    /// Wrap tightly packed premultiplied BGRA8 rows
    pub fn from_bgra(width: u32, height: u32, pixels: Vec<u8>) -> VulkanResult<Self> {
        if pixels.len() != width as usize * height as usize * 4 {
            return Err(VulkanError::invalid(format!(
                "{} bytes cannot hold a {width}x{height} BGRA8 image",
                pixels.len()
            )));
        }
        Self::with_pixels(width, height, pixels)
    }

    /// Convert straight-alpha RGBA pixels
    pub fn from_rgba(image: &image::RgbaImage) -> VulkanResult<Self> {
        let pixels = image
            .pixels()
            .flat_map(|p| {
                let [r, g, b, a] = p.0;
                PixelArgb::from_straight(a, r, g, b).to_bgra()
            })
            .collect();
        Self::with_pixels(image.width(), image.height(), pixels)
    }

    /// Decode an image file
    pub fn load(path: impl AsRef<Path>) -> VulkanResult<Self> {
        let path = path.as_ref();
        let decoded = image::open(path).map_err(|e| VulkanError::Io(format!("Failed to load {}: {e}", path.display())))?;
        Self::from_rgba(&decoded.to_rgba8())
    }

    fn with_pixels(width: u32, height: u32, pixels: Vec<u8>) -> VulkanResult<Self> {
        if width == 0 || height == 0 {
            return Err(VulkanError::invalid(format!("Images need at least one pixel, got {width}x{height}")));
        }

        Ok(Self {
            id: ImageId(NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed)),
            generation: Cell::new(0),
            width,
            height,
            pixels,
        })
    }

    /// Cache identity
    pub fn id(&self) -> ImageId {
        self.id
    }

    /// Incremented by every mutation
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Size as a Vulkan extent
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    /// Tightly packed BGRA8 rows
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Set one pixel; out-of-range coordinates are ignored
    pub fn set_pixel(&mut self, x: u32, y: u32, colour: PixelArgb) {
        if x < self.width && y < self.height {
            let offset = (y as usize * self.width as usize + x as usize) * 4;
            self.pixels[offset..offset + 4].copy_from_slice(&colour.to_bgra());
            self.generation.set(self.generation.get() + 1);
        }
    }

    /// Set every pixel
    pub fn fill(&mut self, colour: PixelArgb) {
        let texel = colour.to_bgra();
        for chunk in self.pixels.chunks_exact_mut(4) {
            chunk.copy_from_slice(&texel);
        }
        self.generation.set(self.generation.get() + 1);
    }
}

impl Clone for PixelImage {
    fn clone(&self) -> Self {
        Self {
            id: ImageId(NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed)),
            generation: Cell::new(0),
            width: self.width,
            height: self.height,
            pixels: self.pixels.clone(),
        }
    }
}

/// An uploaded image with one descriptor per resampling quality
pub struct Texture {
    descriptors: Vec<ImageDescriptor>,
    image: MemoryImage,
}

impl Texture {
    /// Descriptor sampling the texture at `quality`
    pub fn descriptor(&self, quality: ResamplingQuality) -> vk::DescriptorSet {
        self.descriptors[quality.index()].handle()
    }

    /// Texture size
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}

struct CacheEntry {
    texture: Rc<Texture>,
    generation: u64,
    last_used: Duration,
}

/// Uploaded textures by image identity
pub struct TextureCache {
    device: DeviceRef,
    clock: Rc<dyn Clock>,
    eviction_age: Duration,
    entries: slotmap::SlotMap<slotmap::DefaultKey, CacheEntry>,
    handle_map: HashMap<ImageId, slotmap::DefaultKey>,
    retired: Vec<Rc<Texture>>,
    uploads: Vec<(ImageTransfer, Rc<Texture>)>,
}

impl TextureCache {
    /// Empty cache evicting textures idle for longer than `eviction_age`
    pub fn new(device: DeviceRef, clock: Rc<dyn Clock>, eviction_age: Duration) -> Self {
        Self {
            device,
            clock,
            eviction_age,
            entries: slotmap::SlotMap::new(),
            handle_map: HashMap::new(),
            retired: Vec::new(),
            uploads: Vec::new(),
        }
    }

    /// Texture for `image`, uploading it when missing or changed
    pub fn get(
        &mut self,
        image: &PixelImage,
        memory: &CachedMemory,
        descriptor_pool: &Rc<DescriptorPool>,
        samplers: &Samplers,
    ) -> VulkanResult<Rc<Texture>> {
        let now = self.clock.now();

        if let Some(&key) = self.handle_map.get(&image.id()) {
            if let Some(entry) = self.entries.get_mut(key) {
                if entry.generation == image.generation() {
                    entry.last_used = now;
                    return Ok(entry.texture.clone());
                }
            }
            self.image_changed(image.id());
        }

        let (texture, transfer) = self.upload(image, memory, descriptor_pool, samplers)?;
        let texture = Rc::new(texture);
        self.uploads.push((transfer, texture.clone()));

        let key = self.entries.insert(CacheEntry {
            texture: texture.clone(),
            generation: image.generation(),
            last_used: now,
        });
        self.handle_map.insert(image.id(), key);
        Ok(texture)
    }

    fn upload(
        &mut self,
        image: &PixelImage,
        memory: &CachedMemory,
        descriptor_pool: &Rc<DescriptorPool>,
        samplers: &Samplers,
    ) -> VulkanResult<(Texture, ImageTransfer)> {
        let extent = image.extent();
        let info = ImageCreateInfo::new(extent.width, extent.height, vk::Format::B8G8R8A8_UNORM)
            .sampled()
            .transfer_dst()
            .device_local();
        let gpu_image = MemoryImage::new(memory.texture_pool(extent.width, extent.height), &info)?;

        let mut transfer = ImageTransfer::new(self.device.clone(), memory.staging(), extent)?;
        transfer.write_pixels(image.pixels())?;
        transfer.copy_buffer_to_image(&gpu_image)?;

        let descriptors = ResamplingQuality::ALL
            .iter()
            .map(|&quality| ImageDescriptor::new(descriptor_pool, gpu_image.view(), samplers.for_quality(quality)))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::trace!("Uploaded texture {:?}: {}x{}", image.id(), extent.width, extent.height);

        let texture = Texture {
            descriptors,
            image: gpu_image,
        };
        Ok((texture, transfer))
    }

    /// Drop the texture of a changed image; the next use uploads it again
    pub fn image_changed(&mut self, id: ImageId) -> bool {
        self.retire(id)
    }

    /// Drop the texture of a deleted image
    pub fn image_deleted(&mut self, id: ImageId) -> bool {
        self.retire(id)
    }

    fn retire(&mut self, id: ImageId) -> bool {
        let Some(key) = self.handle_map.remove(&id) else {
            return false;
        };
        match self.entries.remove(key) {
            Some(entry) => {
                self.retired.push(entry.texture);
                true
            }
            None => false,
        }
    }

    /// Release finished uploads, idle retired textures and textures unused
    /// for longer than the eviction age; returns the number of textures freed
    pub fn sweep(&mut self) -> usize {
        let mut uploads = std::mem::take(&mut self.uploads);
        uploads.retain(|(transfer, _)| match transfer.is_complete() {
            Ok(done) => !done,
            Err(err) => {
                log::warn!("Texture upload state unknown, keeping staging buffer: {err}");
                true
            }
        });
        self.uploads = uploads;

        let retired_before = self.retired.len();
        self.retired.retain(|texture| Rc::strong_count(texture) > 1);
        let mut released = retired_before - self.retired.len();

        let now = self.clock.now();
        let eviction_age = self.eviction_age;
        let stale: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| Rc::strong_count(&entry.texture) == 1 && now.saturating_sub(entry.last_used) > eviction_age)
            .map(|(key, _)| key)
            .collect();

        for key in stale {
            self.entries.remove(key);
            released += 1;
        }
        self.handle_map.retain(|_, key| self.entries.contains_key(*key));

        if released > 0 {
            log::debug!("Released {released} textures, {} cached", self.entries.len());
        }
        released
    }

    /// Number of cached textures
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if `id` has a cached texture
    pub fn contains(&self, id: ImageId) -> bool {
        self.handle_map.contains_key(&id)
    }

    /// Drop everything; only call once the device is idle
    pub fn clear(&mut self) {
        self.uploads.clear();
        self.retired.clear();
        self.handle_map.clear();
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::foundation::time::ManualClock;
    use crate::testing::{Call, MockDevice};

    struct Fixture {
        mock: Rc<MockDevice>,
        clock: Rc<ManualClock>,
        memory: CachedMemory,
        pool: Rc<DescriptorPool>,
        samplers: Samplers,
        cache: TextureCache,
    }

    impl Fixture {
        fn new() -> Self {
            let mock = MockDevice::new();
            let clock = Rc::new(ManualClock::new());
            let device = mock.device();
            Self {
                memory: CachedMemory::new(device.clone(), &MemoryConfig::default()).unwrap(),
                pool: Rc::new(DescriptorPool::new(device.clone(), 16).unwrap()),
                samplers: Samplers::new(&device).unwrap(),
                cache: TextureCache::new(device, clock.clone(), Duration::from_secs(1)),
                mock,
                clock,
            }
        }

        fn get(&mut self, image: &PixelImage) -> Rc<Texture> {
            self.cache.get(image, &self.memory, &self.pool, &self.samplers).unwrap()
        }
    }

    #[test]
    fn test_same_image_uploads_once() {
        let mut f = Fixture::new();
        let image = PixelImage::new(8, 8).unwrap();

        let a = f.get(&image);
        let b = f.get(&image);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(f.mock.count(|c| matches!(c, Call::CopyBufferToImage { .. })), 1);
        assert_eq!(f.mock.count(|c| matches!(c, Call::AllocateDescriptorSet(_))), 3);
    }

    #[test]
    fn test_mutation_triggers_reupload() {
        let mut f = Fixture::new();
        let mut image = PixelImage::new(4, 4).unwrap();
        let first = f.get(&image);

        image.fill(PixelArgb::new(255, 255, 0, 0));
        let second = f.get(&image);
        assert!(!Rc::ptr_eq(&first, &second));
        assert_eq!(f.cache.len(), 1);

        // The old texture is still borrowed, so it survives the sweep.
        f.cache.sweep();
        assert_eq!(f.mock.count(|c| matches!(c, Call::DestroyImage(_))), 0);
        drop(first);
        assert_eq!(f.cache.sweep(), 1);
        assert_eq!(f.mock.count(|c| matches!(c, Call::DestroyImage(_))), 1);
    }

    #[test]
    fn test_idle_textures_are_evicted_after_age() {
        let mut f = Fixture::new();
        let image = PixelImage::new(4, 4).unwrap();
        let busy_image = PixelImage::new(4, 4).unwrap();
        drop(f.get(&image));
        let busy = f.get(&busy_image);

        f.clock.advance(Duration::from_millis(500));
        assert_eq!(f.cache.sweep(), 0);

        f.clock.advance(Duration::from_millis(600));
        assert_eq!(f.cache.sweep(), 1);
        assert!(!f.cache.contains(image.id()));
        assert!(f.cache.contains(busy_image.id()));
        drop(busy);
    }

    #[test]
    fn test_deleted_image_is_forgotten() {
        let mut f = Fixture::new();
        let image = PixelImage::new(2, 2).unwrap();
        drop(f.get(&image));

        assert!(f.cache.image_deleted(image.id()));
        assert!(!f.cache.image_deleted(image.id()));
        assert!(f.cache.is_empty());
        assert_eq!(f.cache.sweep(), 1);
    }

    #[test]
    fn test_empty_images_are_rejected() {
        assert!(PixelImage::new(0, 0).is_err());
        assert!(PixelImage::new(4, 0).is_err());
        assert!(PixelImage::from_bgra(0, 3, Vec::new()).is_err());
        assert!(PixelImage::from_rgba(&image::RgbaImage::new(0, 0)).is_err());
    }

    #[test]
    fn test_pixel_image_validation() {
        assert!(PixelImage::from_bgra(2, 2, vec![0; 15]).is_err());
        let mut image = PixelImage::from_bgra(2, 1, vec![0; 8]).unwrap();
        image.set_pixel(1, 0, PixelArgb::new(255, 1, 2, 3));
        image.set_pixel(5, 5, PixelArgb::new(255, 1, 2, 3));
        assert_eq!(image.pixels(), &[0, 0, 0, 0, 3, 2, 1, 255]);
        assert_eq!(image.generation(), 1);
        assert_ne!(image.clone().id(), image.id());
    }
}
