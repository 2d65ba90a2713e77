//! Handle to tracked-object storage.

mod objects;

pub use objects::*;

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use thiserror::Error;

use crate::handle::{Handle, ObjectKey, ObjectType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{0} was never created")]
    UnknownHandle(ObjectKey),
    #[error("{0} was already destroyed")]
    UseAfterFree(ObjectKey),
    #[error("{0} is already live")]
    DuplicateHandle(ObjectKey),
}

impl RegistryError {
    pub fn key(&self) -> ObjectKey {
        match *self {
            RegistryError::UnknownHandle(key)
            | RegistryError::UseAfterFree(key)
            | RegistryError::DuplicateHandle(key) => key,
        }
    }
}

/// An object type the registry stores.
pub trait Tracked: Sized + Send + Sync + 'static {
    const TYPE: ObjectType;

    fn storage(registry: &ObjectRegistry) -> &Storage<Self>;

    fn wrap(object: Arc<Self>) -> TrackedObject;
}

struct Entry<T> {
    object: Arc<T>,
    destroyed: bool,
}

/// The shard holding every object of one type.
///
/// Destroyed entries stay behind as tombstones so later use of the handle is
/// detected, until the driver hands the same value out again.
pub struct Storage<T> {
    entries: RwLock<HashMap<Handle, Entry<T>>>,
}

impl<T> Default for Storage<T> {
    #[inline]
    fn default() -> Self {
        Self {
            entries: Default::default(),
        }
    }
}

impl<T: Tracked> Storage<T> {
    fn insert(&self, handle: Handle, object: T) -> Result<Arc<T>, RegistryError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.get(&handle).is_some_and(|entry| !entry.destroyed) {
            return Err(RegistryError::DuplicateHandle(ObjectKey::new(T::TYPE, handle)));
        }

        let object = Arc::new(object);
        entries.insert(
            handle,
            Entry {
                object: object.clone(),
                destroyed: false,
            },
        );

        Ok(object)
    }

    fn get(&self, handle: Handle) -> Result<Arc<T>, RegistryError> {
        let key = ObjectKey::new(T::TYPE, handle);
        match self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
        {
            None => Err(RegistryError::UnknownHandle(key)),
            Some(entry) if entry.destroyed => Err(RegistryError::UseAfterFree(key)),
            Some(entry) => Ok(entry.object.clone()),
        }
    }

    fn tombstone(&self, handle: Handle) -> Result<Arc<T>, RegistryError> {
        let key = ObjectKey::new(T::TYPE, handle);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(&handle) {
            None => Err(RegistryError::UnknownHandle(key)),
            Some(entry) if entry.destroyed => Err(RegistryError::UseAfterFree(key)),
            Some(entry) => {
                entry.destroyed = true;
                Ok(entry.object.clone())
            }
        }
    }

    fn live_count(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|entry| !entry.destroyed)
            .count()
    }
}

/// A live object of any type.
#[derive(Debug, Clone)]
pub enum TrackedObject {
    Image(Arc<Image>),
    Buffer(Arc<Buffer>),
    CommandPool(Arc<CommandPool>),
    CommandBuffer(Arc<CommandBuffer>),
    Pipeline(Arc<Pipeline>),
    RenderPass(Arc<RenderPass>),
    Framebuffer(Arc<Framebuffer>),
    DescriptorSet(Arc<DescriptorSet>),
    SyncPrimitive(Arc<SyncPrimitive>),
}

impl TrackedObject {
    pub fn ty(&self) -> ObjectType {
        match self {
            TrackedObject::Image(_) => ObjectType::Image,
            TrackedObject::Buffer(_) => ObjectType::Buffer,
            TrackedObject::CommandPool(_) => ObjectType::CommandPool,
            TrackedObject::CommandBuffer(_) => ObjectType::CommandBuffer,
            TrackedObject::Pipeline(_) => ObjectType::Pipeline,
            TrackedObject::RenderPass(_) => ObjectType::RenderPass,
            TrackedObject::Framebuffer(_) => ObjectType::Framebuffer,
            TrackedObject::DescriptorSet(_) => ObjectType::DescriptorSet,
            TrackedObject::SyncPrimitive(_) => ObjectType::SyncPrimitive,
        }
    }
}

macro_rules! tracked {
    ($($ty:ident => $field:ident,)*) => {
        /// Every tracked object, sharded by type.
        #[derive(Default)]
        pub struct ObjectRegistry {
            $($field: Storage<$ty>,)*
        }

        $(
            impl Tracked for $ty {
                const TYPE: ObjectType = ObjectType::$ty;

                #[inline]
                fn storage(registry: &ObjectRegistry) -> &Storage<Self> {
                    &registry.$field
                }

                #[inline]
                fn wrap(object: Arc<Self>) -> TrackedObject {
                    TrackedObject::$ty(object)
                }
            }
        )*

        impl ObjectRegistry {
            /// Looks up a handle of any type.
            pub fn lookup_any(&self, key: ObjectKey) -> Result<TrackedObject, RegistryError> {
                match key.ty {
                    $(ObjectType::$ty => self.lookup::<$ty>(key.handle).map(<$ty>::wrap),)*
                }
            }
        }
    };
}

tracked! {
    Image => images,
    Buffer => buffers,
    CommandPool => command_pools,
    CommandBuffer => command_buffers,
    Pipeline => pipelines,
    RenderPass => render_passes,
    Framebuffer => framebuffers,
    DescriptorSet => descriptor_sets,
    SyncPrimitive => sync_primitives,
}

static_assertions::assert_impl_all!(ObjectRegistry: Send, Sync);

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly created object.
    pub fn create<T: Tracked>(&self, handle: Handle, object: T) -> Result<Arc<T>, RegistryError> {
        let object = T::storage(self).insert(handle, object)?;
        log::debug!("registered {:?}", ObjectKey::new(T::TYPE, handle));
        Ok(object)
    }

    /// Looks up a live object.
    pub fn lookup<T: Tracked>(&self, handle: Handle) -> Result<Arc<T>, RegistryError> {
        T::storage(self).get(handle)
    }

    /// Tombstones an object and returns it.
    pub fn destroy<T: Tracked>(&self, handle: Handle) -> Result<Arc<T>, RegistryError> {
        let object = T::storage(self).tombstone(handle)?;
        log::debug!("tombstoned {:?}", ObjectKey::new(T::TYPE, handle));
        Ok(object)
    }

    pub fn is_live(&self, key: ObjectKey) -> bool {
        self.lookup_any(key).is_ok()
    }

    /// The number of live objects of a type.
    pub fn live_count<T: Tracked>(&self) -> usize {
        T::storage(self).live_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> Buffer {
        Buffer::new(BufferCreateInfo {
            size: 64,
            usage: ash::vk::BufferUsageFlags::TRANSFER_SRC,
        })
    }

    #[test]
    fn test_create_lookup_destroy() {
        let registry = ObjectRegistry::new();
        let handle = Handle::from_raw(1);

        registry.create(handle, buffer()).unwrap();
        assert_eq!(registry.lookup::<Buffer>(handle).unwrap().size(), 64);
        assert_eq!(registry.live_count::<Buffer>(), 1);

        registry.destroy::<Buffer>(handle).unwrap();
        assert_eq!(
            registry.lookup::<Buffer>(handle).unwrap_err(),
            RegistryError::UseAfterFree(ObjectKey::buffer(handle))
        );
        assert_eq!(
            registry.destroy::<Buffer>(handle).unwrap_err(),
            RegistryError::UseAfterFree(ObjectKey::buffer(handle))
        );
        assert_eq!(registry.live_count::<Buffer>(), 0);
    }

    #[test]
    fn test_unknown_handle() {
        let registry = ObjectRegistry::new();
        let handle = Handle::from_raw(9);
        assert_eq!(
            registry.lookup::<Image>(handle).unwrap_err(),
            RegistryError::UnknownHandle(ObjectKey::image(handle))
        );
        assert!(registry.destroy::<Image>(handle).is_err());
    }

    #[test]
    fn test_duplicate_and_recycled_handles() {
        let registry = ObjectRegistry::new();
        let handle = Handle::from_raw(2);

        registry.create(handle, buffer()).unwrap();
        assert_eq!(
            registry.create(handle, buffer()).unwrap_err(),
            RegistryError::DuplicateHandle(ObjectKey::buffer(handle))
        );

        registry.destroy::<Buffer>(handle).unwrap();
        registry.create(handle, buffer()).unwrap();
        assert!(registry.is_live(ObjectKey::buffer(handle)));
    }

    #[test]
    fn test_types_are_sharded() {
        let registry = ObjectRegistry::new();
        let handle = Handle::from_raw(5);

        registry.create(handle, buffer()).unwrap();
        registry.create(handle, Image::new(ImageCreateInfo::default())).unwrap();

        let object = registry.lookup_any(ObjectKey::image(handle)).unwrap();
        assert_eq!(object.ty(), ObjectType::Image);
        assert!(!registry.is_live(ObjectKey::new(ObjectType::Pipeline, handle)));
    }
}
