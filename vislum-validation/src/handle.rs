use ash::vk;

/// An opaque driver handle.
///
/// Only ever used as a lookup key; the validator never dereferences it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default)]
pub struct Handle(u64);

impl Handle {
    /// The null handle (`VK_NULL_HANDLE`).
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Wraps any Vulkan handle, dispatchable or not.
    #[inline]
    pub fn from_vk<H: vk::Handle>(handle: H) -> Self {
        Self(handle.as_raw())
    }

    #[inline]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// The kinds of objects the validator tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum ObjectType {
    Image,
    Buffer,
    CommandPool,
    CommandBuffer,
    Pipeline,
    RenderPass,
    Framebuffer,
    DescriptorSet,
    SyncPrimitive,
}

impl ObjectType {
    pub const fn name(self) -> &'static str {
        match self {
            ObjectType::Image => "Image",
            ObjectType::Buffer => "Buffer",
            ObjectType::CommandPool => "CommandPool",
            ObjectType::CommandBuffer => "CommandBuffer",
            ObjectType::Pipeline => "Pipeline",
            ObjectType::RenderPass => "RenderPass",
            ObjectType::Framebuffer => "Framebuffer",
            ObjectType::DescriptorSet => "DescriptorSet",
            ObjectType::SyncPrimitive => "SyncPrimitive",
        }
    }
}

/// A handle qualified by its object type.
///
/// Non-dispatchable handles are only unique per type, so everything that
/// mixes object types (reference edges, findings) keys on this instead of
/// the raw [`Handle`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct ObjectKey {
    pub ty: ObjectType,
    pub handle: Handle,
}

impl ObjectKey {
    #[inline]
    pub const fn new(ty: ObjectType, handle: Handle) -> Self {
        Self { ty, handle }
    }

    #[inline]
    pub const fn image(handle: Handle) -> Self {
        Self::new(ObjectType::Image, handle)
    }

    #[inline]
    pub const fn buffer(handle: Handle) -> Self {
        Self::new(ObjectType::Buffer, handle)
    }

    #[inline]
    pub const fn command_buffer(handle: Handle) -> Self {
        Self::new(ObjectType::CommandBuffer, handle)
    }
}

impl std::fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:?})", self.ty.name(), self.handle)
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
