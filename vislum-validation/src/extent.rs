use ash::vk;

/// The size of an image or one of its mip levels.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent3D {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Extent3D {
    #[inline]
    pub const fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    #[inline]
    pub const fn from_vk(extent: vk::Extent3D) -> Self {
        Self {
            width: extent.width,
            height: extent.height,
            depth: extent.depth,
        }
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0 || self.depth == 0
    }

    /// The extent of the given mip level, never smaller than one texel per axis.
    pub const fn mip_level(self, level: u32) -> Self {
        const fn shrink(value: u32, level: u32) -> u32 {
            if level >= 32 {
                return 1;
            }
            let value = value >> level;
            if value == 0 { 1 } else { value }
        }

        Self {
            width: shrink(self.width, level),
            height: shrink(self.height, level),
            depth: shrink(self.depth, level),
        }
    }

    /// Whether a box at `offset` with `extent` lies within this extent.
    ///
    /// Negative offsets never fit.
    pub fn contains_box(self, offset: vk::Offset3D, extent: vk::Extent3D) -> bool {
        fn axis(offset: i32, len: u32, limit: u32) -> bool {
            offset >= 0 && (offset as u64) + (len as u64) <= limit as u64
        }

        axis(offset.x, extent.width, self.width)
            && axis(offset.y, extent.height, self.height)
            && axis(offset.z, extent.depth, self.depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_extent() {
        let extent = Extent3D::new(256, 64, 1);
        assert_eq!(extent.mip_level(0), extent);
        assert_eq!(extent.mip_level(3), Extent3D::new(32, 8, 1));
        assert_eq!(extent.mip_level(8), Extent3D::new(1, 1, 1));
        assert_eq!(extent.mip_level(40), Extent3D::new(1, 1, 1));
    }

    #[test]
    fn test_contains_box() {
        let extent = Extent3D::new(16, 16, 1);
        let size = vk::Extent3D { width: 8, height: 8, depth: 1 };
        assert!(extent.contains_box(vk::Offset3D { x: 8, y: 8, z: 0 }, size));
        assert!(!extent.contains_box(vk::Offset3D { x: 9, y: 8, z: 0 }, size));
        assert!(!extent.contains_box(vk::Offset3D { x: -1, y: 0, z: 0 }, size));
    }
}
