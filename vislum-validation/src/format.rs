use ash::vk;

use crate::extent::Extent3D;

/// The numeric interpretation of a color format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericType {
    Unorm,
    Snorm,
    Uint,
    Sint,
    Ufloat,
    Sfloat,
    Srgb,
}

/// The aspect class of a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatClass {
    Color(NumericType),
    Depth,
    Stencil,
    DepthStencil,
}

/// Static properties of a format needed by the transfer rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatInfo {
    pub format: vk::Format,
    pub class: FormatClass,
    /// Size in bytes of one texel block.
    pub block_size: u32,
    /// Texel dimensions of one block; `1x1x1` for uncompressed formats.
    pub block_extent: Extent3D,
}

macro_rules! format_table {
    (
        $(
            $vk_format:ident => $class:expr, $size:expr, [$bw:expr, $bh:expr];
        )*
    ) => {
        impl FormatInfo {
            /// Looks up a format. Returns `None` for formats outside the table.
            pub const fn of(format: vk::Format) -> Option<Self> {
                match format {
                    $(
                        vk::Format::$vk_format => Some(Self {
                            format: vk::Format::$vk_format,
                            class: $class,
                            block_size: $size,
                            block_extent: Extent3D::new($bw, $bh, 1),
                        }),
                    )*
                    _ => None,
                }
            }
        }
    };
}

use FormatClass::{Color, Depth, DepthStencil, Stencil};
use NumericType::{Sfloat, Sint, Snorm, Srgb, Ufloat, Uint, Unorm};

format_table! {
    // 8-bit formats
    R8_UNORM => Color(Unorm), 1, [1, 1];
    R8_SNORM => Color(Snorm), 1, [1, 1];
    R8_UINT => Color(Uint), 1, [1, 1];
    R8_SINT => Color(Sint), 1, [1, 1];
    R8_SRGB => Color(Srgb), 1, [1, 1];

    // 16-bit formats
    R16_UNORM => Color(Unorm), 2, [1, 1];
    R16_SNORM => Color(Snorm), 2, [1, 1];
    R16_UINT => Color(Uint), 2, [1, 1];
    R16_SINT => Color(Sint), 2, [1, 1];
    R16_SFLOAT => Color(Sfloat), 2, [1, 1];
    R8G8_UNORM => Color(Unorm), 2, [1, 1];
    R8G8_SNORM => Color(Snorm), 2, [1, 1];
    R8G8_UINT => Color(Uint), 2, [1, 1];
    R8G8_SINT => Color(Sint), 2, [1, 1];
    R8G8_SRGB => Color(Srgb), 2, [1, 1];

    // 32-bit formats
    R32_UINT => Color(Uint), 4, [1, 1];
    R32_SINT => Color(Sint), 4, [1, 1];
    R32_SFLOAT => Color(Sfloat), 4, [1, 1];
    R16G16_UNORM => Color(Unorm), 4, [1, 1];
    R16G16_SNORM => Color(Snorm), 4, [1, 1];
    R16G16_UINT => Color(Uint), 4, [1, 1];
    R16G16_SINT => Color(Sint), 4, [1, 1];
    R16G16_SFLOAT => Color(Sfloat), 4, [1, 1];
    R8G8B8A8_UNORM => Color(Unorm), 4, [1, 1];
    R8G8B8A8_SNORM => Color(Snorm), 4, [1, 1];
    R8G8B8A8_UINT => Color(Uint), 4, [1, 1];
    R8G8B8A8_SINT => Color(Sint), 4, [1, 1];
    R8G8B8A8_SRGB => Color(Srgb), 4, [1, 1];
    B8G8R8A8_UNORM => Color(Unorm), 4, [1, 1];
    B8G8R8A8_SNORM => Color(Snorm), 4, [1, 1];
    B8G8R8A8_UINT => Color(Uint), 4, [1, 1];
    B8G8R8A8_SINT => Color(Sint), 4, [1, 1];
    B8G8R8A8_SRGB => Color(Srgb), 4, [1, 1];
    A2R10G10B10_UNORM_PACK32 => Color(Unorm), 4, [1, 1];
    A2R10G10B10_UINT_PACK32 => Color(Uint), 4, [1, 1];
    B10G11R11_UFLOAT_PACK32 => Color(Ufloat), 4, [1, 1];

    // 64-bit formats
    R32G32_UINT => Color(Uint), 8, [1, 1];
    R32G32_SINT => Color(Sint), 8, [1, 1];
    R32G32_SFLOAT => Color(Sfloat), 8, [1, 1];
    R16G16B16A16_UNORM => Color(Unorm), 8, [1, 1];
    R16G16B16A16_SNORM => Color(Snorm), 8, [1, 1];
    R16G16B16A16_UINT => Color(Uint), 8, [1, 1];
    R16G16B16A16_SINT => Color(Sint), 8, [1, 1];
    R16G16B16A16_SFLOAT => Color(Sfloat), 8, [1, 1];

    // 96/128-bit formats
    R32G32B32_UINT => Color(Uint), 12, [1, 1];
    R32G32B32_SINT => Color(Sint), 12, [1, 1];
    R32G32B32_SFLOAT => Color(Sfloat), 12, [1, 1];
    R32G32B32A32_UINT => Color(Uint), 16, [1, 1];
    R32G32B32A32_SINT => Color(Sint), 16, [1, 1];
    R32G32B32A32_SFLOAT => Color(Sfloat), 16, [1, 1];

    // Depth/Stencil formats
    D16_UNORM => Depth, 2, [1, 1];
    X8_D24_UNORM_PACK32 => Depth, 4, [1, 1];
    D32_SFLOAT => Depth, 4, [1, 1];
    S8_UINT => Stencil, 1, [1, 1];
    D16_UNORM_S8_UINT => DepthStencil, 3, [1, 1];
    D24_UNORM_S8_UINT => DepthStencil, 4, [1, 1];
    D32_SFLOAT_S8_UINT => DepthStencil, 5, [1, 1];

    // Compressed formats
    BC1_RGB_UNORM_BLOCK => Color(Unorm), 8, [4, 4];
    BC1_RGB_SRGB_BLOCK => Color(Srgb), 8, [4, 4];
    BC1_RGBA_UNORM_BLOCK => Color(Unorm), 8, [4, 4];
    BC1_RGBA_SRGB_BLOCK => Color(Srgb), 8, [4, 4];
    BC2_UNORM_BLOCK => Color(Unorm), 16, [4, 4];
    BC2_SRGB_BLOCK => Color(Srgb), 16, [4, 4];
    BC3_UNORM_BLOCK => Color(Unorm), 16, [4, 4];
    BC3_SRGB_BLOCK => Color(Srgb), 16, [4, 4];
    BC4_UNORM_BLOCK => Color(Unorm), 8, [4, 4];
    BC4_SNORM_BLOCK => Color(Snorm), 8, [4, 4];
    BC5_UNORM_BLOCK => Color(Unorm), 16, [4, 4];
    BC5_SNORM_BLOCK => Color(Snorm), 16, [4, 4];
    BC6H_UFLOAT_BLOCK => Color(Ufloat), 16, [4, 4];
    BC6H_SFLOAT_BLOCK => Color(Sfloat), 16, [4, 4];
    BC7_UNORM_BLOCK => Color(Unorm), 16, [4, 4];
    BC7_SRGB_BLOCK => Color(Srgb), 16, [4, 4];
}

impl FormatInfo {
    /// The aspects an image of this format has.
    pub const fn aspects(&self) -> vk::ImageAspectFlags {
        match self.class {
            Color(_) => vk::ImageAspectFlags::COLOR,
            Depth => vk::ImageAspectFlags::DEPTH,
            Stencil => vk::ImageAspectFlags::STENCIL,
            DepthStencil => vk::ImageAspectFlags::from_raw(
                vk::ImageAspectFlags::DEPTH.as_raw() | vk::ImageAspectFlags::STENCIL.as_raw(),
            ),
        }
    }

    #[inline]
    pub const fn is_color(&self) -> bool {
        matches!(self.class, Color(_))
    }

    #[inline]
    pub const fn is_depth_or_stencil(&self) -> bool {
        !self.is_color()
    }

    #[inline]
    pub const fn is_compressed(&self) -> bool {
        self.block_extent.width > 1 || self.block_extent.height > 1
    }

    #[inline]
    pub const fn is_integer(&self) -> bool {
        matches!(self.class, Color(Uint) | Color(Sint))
    }

    /// Whether `mask` is a non-empty subset of this format's aspects.
    pub fn accepts_aspects(&self, mask: vk::ImageAspectFlags) -> bool {
        !mask.is_empty() && self.aspects().contains(mask)
    }

    /// Bytes per texel block when a single aspect is copied to or from a buffer.
    pub fn copy_block_size(&self, aspect: vk::ImageAspectFlags) -> u32 {
        if aspect == vk::ImageAspectFlags::STENCIL {
            return 1;
        }

        match (self.class, self.format) {
            (Depth | DepthStencil, vk::Format::D16_UNORM | vk::Format::D16_UNORM_S8_UINT) => 2,
            (Depth | DepthStencil, _) => 4,
            _ => self.block_size,
        }
    }

    /// The alignment a buffer offset must honor for copies of `aspect`.
    pub fn buffer_offset_alignment(&self, aspect: vk::ImageAspectFlags) -> u64 {
        if self.is_depth_or_stencil() {
            4
        } else {
            self.copy_block_size(aspect) as u64
        }
    }

    /// Whether two formats may be copied between without conversion.
    pub fn is_size_compatible(&self, other: &FormatInfo) -> bool {
        if self.is_depth_or_stencil() || other.is_depth_or_stencil() {
            return self.format == other.format;
        }

        self.block_size == other.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_format() {
        let info = FormatInfo::of(vk::Format::R8G8B8A8_UNORM).unwrap();
        assert!(info.is_color());
        assert!(!info.is_compressed());
        assert_eq!(info.aspects(), vk::ImageAspectFlags::COLOR);
        assert!(info.accepts_aspects(vk::ImageAspectFlags::COLOR));
        assert!(!info.accepts_aspects(vk::ImageAspectFlags::DEPTH));
        assert!(!info.accepts_aspects(vk::ImageAspectFlags::empty()));
    }

    #[test]
    fn test_depth_stencil_format() {
        let info = FormatInfo::of(vk::Format::D24_UNORM_S8_UINT).unwrap();
        assert!(info.accepts_aspects(vk::ImageAspectFlags::DEPTH));
        assert!(info.accepts_aspects(vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL));
        assert!(!info.accepts_aspects(vk::ImageAspectFlags::COLOR));
        assert_eq!(info.copy_block_size(vk::ImageAspectFlags::STENCIL), 1);
        assert_eq!(info.copy_block_size(vk::ImageAspectFlags::DEPTH), 4);
    }

    #[test]
    fn test_compressed_format() {
        let info = FormatInfo::of(vk::Format::BC1_RGBA_UNORM_BLOCK).unwrap();
        assert!(info.is_compressed());
        assert_eq!(info.block_extent, Extent3D::new(4, 4, 1));

        let rg32 = FormatInfo::of(vk::Format::R32G32_UINT).unwrap();
        assert!(info.is_size_compatible(&rg32));
    }

    #[test]
    fn test_unknown_format() {
        assert!(FormatInfo::of(vk::Format::UNDEFINED).is_none());
    }
}
