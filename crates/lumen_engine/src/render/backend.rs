//! GPU abstraction boundary
//!
//! [`RenderBackend`] is the only trait the engine draws through. Resolution
//! code compiles program variants and creates buffers up front; per frame,
//! the renderer clears and submits fully resolved [`DrawSubmission`]s. The
//! [`HeadlessBackend`] implements the trait with counters and a recorded
//! submission log, which is what the test suite asserts against.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bitflags::bitflags;

use super::pass::PassStates;
use super::program::{MacroSet, ProgramTemplate};
use super::RenderError;
use crate::data::PropertyValue;
use crate::foundation::math::Vec4;

/// Result alias for backend operations
pub type BackendResult<T> = Result<T, RenderError>;

/// Opaque handle to a compiled program variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

/// Opaque handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

bitflags! {
    /// Frame buffer aspects cleared at the start of a frame
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClearFlags: u32 {
        /// Color attachment
        const COLOR = 1;
        /// Depth attachment
        const DEPTH = 1 << 1;
    }
}

/// A fully resolved draw call, ready for the GPU
#[derive(Debug, Clone)]
pub struct DrawSubmission {
    /// Compiled program variant
    pub program: ProgramHandle,
    /// Vertex buffers bound for this draw, in attribute-stream order
    pub vertex_buffers: Vec<BufferHandle>,
    /// Index buffer
    pub index_buffer: BufferHandle,
    /// Number of indices to draw
    pub index_count: usize,
    /// Uniform name and value pairs, read live at submission time
    pub uniforms: Vec<(String, PropertyValue)>,
    /// Fixed-function state for this draw
    pub states: PassStates,
}

/// The engine's sole GPU egress point
pub trait RenderBackend {
    /// Compile one variant of `template` under `macros`
    fn compile_program(
        &mut self,
        template: &ProgramTemplate,
        macros: &MacroSet,
    ) -> BackendResult<ProgramHandle>;

    /// Upload an immutable vertex buffer
    fn create_vertex_buffer(&mut self, data: &[f32]) -> BackendResult<BufferHandle>;

    /// Upload an immutable index buffer
    fn create_index_buffer(&mut self, data: &[u32]) -> BackendResult<BufferHandle>;

    /// Clear the frame buffer
    fn clear(&mut self, flags: ClearFlags, color: Vec4);

    /// Draw one resolved submission
    fn submit(&mut self, submission: &DrawSubmission) -> BackendResult<()>;
}

/// Shared, single-threaded backend handle
pub type SharedBackend = Rc<RefCell<dyn RenderBackend>>;

/// Recording backend with no GPU behind it
///
/// Compilation and buffer creation hand out monotonically increasing
/// handles; clears and submissions are counted and logged so tests can
/// assert on exactly what a frame produced.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_program: u64,
    next_buffer: u64,
    buffer_bytes: HashMap<BufferHandle, usize>,
    compiled: Vec<(String, String)>,
    clear_count: usize,
    submissions: Vec<DrawSubmission>,
    reject_define: Option<String>,
}

impl HeadlessBackend {
    /// Create an empty recording backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Make compilation fail for any variant defining `name`
    pub fn reject_define(&mut self, name: impl Into<String>) {
        self.reject_define = Some(name.into());
    }

    /// Template name and defines string of every compile, in order
    pub fn compiled(&self) -> &[(String, String)] {
        &self.compiled
    }

    /// Number of successful program compilations
    pub fn programs_compiled(&self) -> usize {
        self.compiled.len()
    }

    /// Number of buffers created
    pub fn buffers_created(&self) -> usize {
        self.buffer_bytes.len()
    }

    /// Number of clears issued
    pub fn clear_count(&self) -> usize {
        self.clear_count
    }

    /// Submissions recorded since the last take
    pub fn take_submissions(&mut self) -> Vec<DrawSubmission> {
        std::mem::take(&mut self.submissions)
    }

    /// Wrap into the shared handle form the renderer consumes
    pub fn into_shared(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }
}

impl RenderBackend for HeadlessBackend {
    fn compile_program(
        &mut self,
        template: &ProgramTemplate,
        macros: &MacroSet,
    ) -> BackendResult<ProgramHandle> {
        if let Some(rejected) = &self.reject_define {
            if macros.is_defined(rejected) {
                return Err(RenderError::ProgramCompilation {
                    template: template.name.clone(),
                    defines: macros.defines_string(),
                    reason: format!("unsupported define '{rejected}'"),
                });
            }
        }
        self.compiled
            .push((template.name.clone(), macros.defines_string()));
        self.next_program += 1;
        Ok(ProgramHandle(self.next_program))
    }

    fn create_vertex_buffer(&mut self, data: &[f32]) -> BackendResult<BufferHandle> {
        self.next_buffer += 1;
        let handle = BufferHandle(self.next_buffer);
        self.buffer_bytes
            .insert(handle, bytemuck::cast_slice::<f32, u8>(data).len());
        Ok(handle)
    }

    fn create_index_buffer(&mut self, data: &[u32]) -> BackendResult<BufferHandle> {
        self.next_buffer += 1;
        let handle = BufferHandle(self.next_buffer);
        self.buffer_bytes
            .insert(handle, bytemuck::cast_slice::<u32, u8>(data).len());
        Ok(handle)
    }

    fn clear(&mut self, _flags: ClearFlags, _color: Vec4) {
        self.clear_count += 1;
    }

    fn submit(&mut self, submission: &DrawSubmission) -> BackendResult<()> {
        self.submissions.push(submission.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_monotonic() {
        let mut backend = HeadlessBackend::new();
        let a = backend.create_vertex_buffer(&[0.0; 6]).unwrap();
        let b = backend.create_index_buffer(&[0, 1, 2]).unwrap();
        assert_ne!(a, b);
        assert_eq!(backend.buffers_created(), 2);
    }

    #[test]
    fn test_reject_define_fails_compilation() {
        let mut backend = HeadlessBackend::new();
        backend.reject_define("HAS_SHADOWS");

        let template = ProgramTemplate::new("phong", "vs", "fs");
        let mut macros = MacroSet::new();
        macros.define("HAS_SHADOWS");

        assert!(backend.compile_program(&template, &macros).is_err());
        assert_eq!(backend.programs_compiled(), 0);

        let plain = MacroSet::new();
        assert!(backend.compile_program(&template, &plain).is_ok());
        assert_eq!(backend.programs_compiled(), 1);
    }
}
