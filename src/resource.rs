//! Reference-counted resource handles and the view objects built over them.
//!
//! Handles compare by identity, not by content: a binding category that
//! needs to know whether it references "the same" resource as an
//! invalidation notice compares allocations, never descriptors. Dropping a
//! handle clone releases that slot's reference; there is no manual teardown
//! pass.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::format::{mip_dim, Format};

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

fn next_resource_id() -> u64 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

/// What kind of backing storage a resource has.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture1D,
    Texture2D,
    Texture3D,
    TextureCube,
}

impl ResourceKind {
    pub fn is_buffer(self) -> bool {
        matches!(self, ResourceKind::Buffer)
    }
}

/// Immutable creation-time description of a resource.
#[derive(Debug, Clone)]
pub struct ResourceDesc {
    pub kind: ResourceKind,
    pub format: Format,
    /// Byte size for buffers, texel width for textures.
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub nr_samples: u32,
}

struct ResourceInner {
    id: u64,
    desc: ResourceDesc,
}

/// A reference-counted handle to a device resource.
///
/// Cloning is cheap and shares the underlying allocation; equality is
/// allocation identity.
#[derive(Clone)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

impl Resource {
    pub fn new(desc: ResourceDesc) -> Self {
        Self {
            inner: Arc::new(ResourceInner {
                id: next_resource_id(),
                desc,
            }),
        }
    }

    pub fn new_buffer(size: u64) -> Self {
        Self::new(ResourceDesc {
            kind: ResourceKind::Buffer,
            format: Format::None,
            width: u32::try_from(size).unwrap_or(u32::MAX),
            height: 1,
            depth: 1,
            mip_levels: 1,
            nr_samples: 1,
        })
    }

    pub fn new_texture2d(format: Format, width: u32, height: u32, mip_levels: u32, nr_samples: u32) -> Self {
        Self::new(ResourceDesc {
            kind: ResourceKind::Texture2D,
            format,
            width,
            height,
            depth: 1,
            mip_levels,
            nr_samples,
        })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn desc(&self) -> &ResourceDesc {
        &self.inner.desc
    }

    pub fn kind(&self) -> ResourceKind {
        self.inner.desc.kind
    }

    pub fn is_buffer(&self) -> bool {
        self.inner.desc.kind.is_buffer()
    }

    /// Byte size of a buffer resource.
    pub fn buffer_size(&self) -> u64 {
        debug_assert!(self.is_buffer());
        u64::from(self.inner.desc.width)
    }

    /// Whether two handles refer to the same allocation.
    pub fn same_as(&self, other: &Resource) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Eq for Resource {}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.desc.kind)
            .finish()
    }
}

/// Byte or subresource range a sampler view covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewRange {
    Buffer {
        offset: u64,
        size: u64,
    },
    Texture {
        first_level: u32,
        last_level: u32,
        first_layer: u32,
        last_layer: u32,
    },
}

struct SamplerViewInner {
    resource: Resource,
    format: Format,
    range: ViewRange,
}

/// A shader-visible view over a resource, bound into per-stage view slots.
///
/// Invalidation matches views by their underlying resource, never by view
/// identity.
#[derive(Clone)]
pub struct SamplerView {
    inner: Arc<SamplerViewInner>,
}

impl SamplerView {
    /// View over a range of buffer elements. The byte window is derived from
    /// the element range and the format blocksize.
    pub fn for_buffer(resource: Resource, format: Format, first_element: u32, last_element: u32) -> Self {
        assert!(resource.is_buffer(), "buffer view over a non-buffer resource");
        assert!(first_element <= last_element);

        let elem_size = u64::from(format.blocksize());
        let offset = u64::from(first_element) * elem_size;
        let size = u64::from(last_element - first_element + 1) * elem_size;

        Self {
            inner: Arc::new(SamplerViewInner {
                resource,
                format,
                range: ViewRange::Buffer { offset, size },
            }),
        }
    }

    /// View over a mip level/array layer range of a texture.
    pub fn for_texture(
        resource: Resource,
        format: Format,
        first_level: u32,
        last_level: u32,
        first_layer: u32,
        last_layer: u32,
    ) -> Self {
        assert!(!resource.is_buffer(), "texture view over a buffer resource");
        assert!(first_level <= last_level);
        assert!(first_layer <= last_layer);

        Self {
            inner: Arc::new(SamplerViewInner {
                resource,
                format,
                range: ViewRange::Texture {
                    first_level,
                    last_level,
                    first_layer,
                    last_layer,
                },
            }),
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.inner.resource
    }

    pub fn format(&self) -> Format {
        self.inner.format
    }

    pub fn range(&self) -> &ViewRange {
        &self.inner.range
    }
}

impl fmt::Debug for SamplerView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplerView")
            .field("resource", &self.inner.resource)
            .field("format", &self.inner.format)
            .finish()
    }
}

struct SurfaceInner {
    resource: Resource,
    format: Format,
    level: u32,
    first_layer: u32,
    last_layer: u32,
    width: u32,
    height: u32,
    is_render_target: bool,
}

/// One mip level / layer range of a texture, usable as a framebuffer
/// attachment or a shader image resource.
#[derive(Clone)]
pub struct Surface {
    inner: Arc<SurfaceInner>,
}

impl Surface {
    pub fn new(resource: Resource, format: Format, level: u32, first_layer: u32, last_layer: u32) -> Self {
        // Buffers cannot back render targets or depth-stencil attachments.
        assert!(!resource.is_buffer(), "surface over a buffer resource");
        assert!(first_layer <= last_layer);

        let width = mip_dim(resource.desc().width, level);
        let height = mip_dim(resource.desc().height, level);
        let is_render_target = !format.is_depth_or_stencil();

        Self {
            inner: Arc::new(SurfaceInner {
                resource,
                format,
                level,
                first_layer,
                last_layer,
                width,
                height,
                is_render_target,
            }),
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.inner.resource
    }

    pub fn format(&self) -> Format {
        self.inner.format
    }

    pub fn level(&self) -> u32 {
        self.inner.level
    }

    pub fn layers(&self) -> (u32, u32) {
        (self.inner.first_layer, self.inner.last_layer)
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn is_render_target(&self) -> bool {
        self.inner.is_render_target
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("resource", &self.inner.resource)
            .field("format", &self.inner.format)
            .field("level", &self.inner.level)
            .finish()
    }
}

struct SoTargetInner {
    buffer: Resource,
    offset: u32,
    size: u32,
}

/// A stream-output target: a byte range of a buffer that transform feedback
/// writes into.
#[derive(Clone)]
pub struct SoTarget {
    inner: Arc<SoTargetInner>,
}

impl SoTarget {
    pub fn new(buffer: Resource, offset: u32, size: u32) -> Self {
        assert!(buffer.is_buffer(), "stream-output target over a non-buffer resource");
        Self {
            inner: Arc::new(SoTargetInner { buffer, offset, size }),
        }
    }

    pub fn buffer(&self) -> &Resource {
        &self.inner.buffer
    }

    pub fn offset(&self) -> u32 {
        self.inner.offset
    }

    pub fn size(&self) -> u32 {
        self.inner.size
    }
}

impl fmt::Debug for SoTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoTarget")
            .field("buffer", &self.inner.buffer)
            .field("offset", &self.inner.offset)
            .field("size", &self.inner.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_clones_share_identity() {
        let a = Resource::new_buffer(64);
        let b = a.clone();
        let c = Resource::new_buffer(64);

        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn buffer_view_range_uses_format_blocksize() {
        let buf = Resource::new_buffer(4096);
        let view = SamplerView::for_buffer(buf, Format::R32G32B32A32Float, 2, 5);

        match view.range() {
            ViewRange::Buffer { offset, size } => {
                assert_eq!(*offset, 32);
                assert_eq!(*size, 64);
            }
            other => panic!("unexpected range {other:?}"),
        }
    }

    #[test]
    fn surface_dimensions_are_minified() {
        let tex = Resource::new_texture2d(Format::B8G8R8A8Unorm, 256, 128, 8, 1);
        let surf = Surface::new(tex, Format::B8G8R8A8Unorm, 3, 0, 0);

        assert_eq!(surf.width(), 32);
        assert_eq!(surf.height(), 16);
        assert!(surf.is_render_target());
    }

    #[test]
    fn depth_surface_is_not_a_render_target() {
        let tex = Resource::new_texture2d(Format::D24UnormS8Uint, 64, 64, 1, 1);
        let surf = Surface::new(tex, Format::D24UnormS8Uint, 0, 0, 0);
        assert!(!surf.is_render_target());
    }
}
