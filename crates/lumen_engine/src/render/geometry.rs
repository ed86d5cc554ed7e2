//! Geometry: named vertex streams and an index buffer
//!
//! Geometry arrives fully formed from the asset pipeline; the engine treats
//! its layout (streams, attributes, index count) as immutable shape and only
//! its provider-visible summary as scene data. Each declared attribute is
//! mirrored as an integer property (its component count) in the geometry's
//! provider, so effects can gate shader variants on attribute presence
//! (e.g. a `HAS_NORMALS` macro bound to `geometry.normal`).

use std::cell::RefCell;
use std::rc::Rc;

use super::backend::{BufferHandle, RenderBackend};
use super::RenderError;
use crate::data::Provider;

/// One attribute within an interleaved vertex stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Attribute name (`position`, `normal`, `uv`, ...)
    pub name: String,
    /// Number of f32 components
    pub size: usize,
    /// Offset within one vertex, in f32 components
    pub offset: usize,
}

/// An interleaved vertex buffer with declared attributes
#[derive(Debug, Clone)]
pub struct VertexStream {
    /// Packed vertex data
    pub data: Vec<f32>,
    /// Vertex stride, in f32 components
    pub stride: usize,
    /// Attributes laid out within one vertex
    pub attributes: Vec<VertexAttribute>,
}

impl VertexStream {
    /// Number of vertices in the stream
    pub fn vertex_count(&self) -> usize {
        if self.stride == 0 {
            0
        } else {
            self.data.len() / self.stride
        }
    }
}

struct GeometryShared {
    name: String,
    provider: Provider,
    streams: Vec<VertexStream>,
    indices: Vec<u32>,
    // GPU handles are created lazily, once, at first resolution.
    stream_buffers: RefCell<Vec<Option<BufferHandle>>>,
    index_buffer: RefCell<Option<BufferHandle>>,
}

/// Shared handle to an immutable-shape geometry
#[derive(Clone)]
pub struct Geometry {
    inner: Rc<GeometryShared>,
}

impl std::fmt::Debug for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Geometry")
            .field("name", &self.inner.name)
            .field("streams", &self.inner.streams.len())
            .field("indices", &self.inner.indices.len())
            .finish()
    }
}

impl Geometry {
    /// Create a geometry from streams and indices
    pub fn new(name: impl Into<String>, streams: Vec<VertexStream>, indices: Vec<u32>) -> Self {
        let provider = Provider::new();
        for stream in &streams {
            for attribute in &stream.attributes {
                provider.set(attribute.name.clone(), attribute.size as i32);
            }
        }
        provider.set("indices.length", indices.len() as i32);

        let stream_count = streams.len();
        Self {
            inner: Rc::new(GeometryShared {
                name: name.into(),
                provider,
                streams,
                indices,
                stream_buffers: RefCell::new(vec![None; stream_count]),
                index_buffer: RefCell::new(None),
            }),
        }
    }

    /// Geometry name (debugging)
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Scene-data provider summarizing the layout
    pub fn provider(&self) -> Provider {
        self.inner.provider.clone()
    }

    /// Number of indices
    pub fn index_count(&self) -> usize {
        self.inner.indices.len()
    }

    /// Find the stream and attribute for `attribute_name`
    pub fn attribute(&self, attribute_name: &str) -> Option<(usize, &VertexAttribute)> {
        for (stream_index, stream) in self.inner.streams.iter().enumerate() {
            if let Some(attribute) = stream.attributes.iter().find(|a| a.name == attribute_name) {
                return Some((stream_index, attribute));
            }
        }
        None
    }

    /// Stride of stream `index`, in f32 components
    pub fn stream_stride(&self, index: usize) -> usize {
        self.inner.streams[index].stride
    }

    /// GPU buffer for stream `index`, creating it on first use
    pub fn stream_buffer(
        &self,
        index: usize,
        backend: &mut dyn RenderBackend,
    ) -> Result<BufferHandle, RenderError> {
        if let Some(handle) = self.inner.stream_buffers.borrow()[index] {
            return Ok(handle);
        }
        let handle = backend.create_vertex_buffer(&self.inner.streams[index].data)?;
        self.inner.stream_buffers.borrow_mut()[index] = Some(handle);
        Ok(handle)
    }

    /// GPU index buffer, creating it on first use
    pub fn index_buffer(
        &self,
        backend: &mut dyn RenderBackend,
    ) -> Result<BufferHandle, RenderError> {
        if let Some(handle) = *self.inner.index_buffer.borrow() {
            return Ok(handle);
        }
        let handle = backend.create_index_buffer(&self.inner.indices)?;
        *self.inner.index_buffer.borrow_mut() = Some(handle);
        Ok(handle)
    }

    /// Unit cube centered at the origin, with positions and normals
    pub fn cube() -> Self {
        let mut data = Vec::new();
        let mut indices = Vec::new();
        // One face per axis direction; 4 vertices and 2 triangles each.
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];
        for (face, (normal, right, up)) in faces.iter().enumerate() {
            let base = (face * 4) as u32;
            for (sx, sy) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                for i in 0..3 {
                    data.push(normal[i] * 0.5 + right[i] * sx + up[i] * sy);
                }
                data.extend_from_slice(normal);
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::new(
            "cube",
            vec![VertexStream {
                data,
                stride: 6,
                attributes: vec![
                    VertexAttribute {
                        name: "position".into(),
                        size: 3,
                        offset: 0,
                    },
                    VertexAttribute {
                        name: "normal".into(),
                        size: 3,
                        offset: 3,
                    },
                ],
            }],
            indices,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_layout() {
        let cube = Geometry::cube();
        assert_eq!(cube.index_count(), 36);

        let (stream, position) = cube.attribute("position").unwrap();
        assert_eq!(stream, 0);
        assert_eq!(position.size, 3);
        assert_eq!(position.offset, 0);

        let (_, normal) = cube.attribute("normal").unwrap();
        assert_eq!(normal.offset, 3);
        assert!(cube.attribute("uv").is_none());
    }

    #[test]
    fn test_provider_mirrors_attributes() {
        let cube = Geometry::cube();
        let provider = cube.provider();
        assert_eq!(provider.get::<i32>("position"), Ok(3));
        assert_eq!(provider.get::<i32>("normal"), Ok(3));
        assert_eq!(provider.get::<i32>("indices.length"), Ok(36));
    }
}
