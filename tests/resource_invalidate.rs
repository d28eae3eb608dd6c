//! Resource-change propagation: a resource whose backing storage is about
//! to change identity must mark every binding category that references it.

use pretty_assertions::assert_eq;

use aero_pipe_state::{
    ConstantBufferInput, DirtyState, Format, IndexBufferInput, Resource, SamplerView, Sampler,
    SamplerDesc, ShaderStage, SoTarget, StateTracker, Surface, VertexBuffer,
};

fn clean_tracker() -> StateTracker {
    let mut tracker = StateTracker::new();
    tracker.clear_dirty_for_encoder(DirtyState::all());
    tracker
}

fn texture() -> Resource {
    Resource::new_texture2d(Format::B8G8R8A8Unorm, 64, 64, 1, 1)
}

#[test]
fn unreferenced_resources_mark_nothing() {
    let mut tracker = clean_tracker();
    tracker.set_vertex_buffers(
        0,
        1,
        Some(&[Some(VertexBuffer {
            buffer: Resource::new_buffer(256),
            offset: 0,
            stride: 16,
        })]),
    );
    tracker.clear_dirty_for_encoder(DirtyState::all());

    tracker.mark_states_with_resource_dirty(&Resource::new_buffer(256));
    assert_eq!(tracker.dirty(), DirtyState::empty());
}

#[test]
fn vertex_buffer_bit_requires_an_enabled_matching_slot() {
    let mut tracker = clean_tracker();
    let buf = Resource::new_buffer(256);

    tracker.set_vertex_buffers(
        2,
        1,
        Some(&[Some(VertexBuffer {
            buffer: buf.clone(),
            offset: 0,
            stride: 16,
        })]),
    );
    tracker.clear_dirty_for_encoder(DirtyState::all());

    tracker.mark_states_with_resource_dirty(&buf);
    assert_eq!(tracker.dirty(), DirtyState::VERTEX_BUFFERS);

    // Unbinding the slot removes it from the scan.
    tracker.set_vertex_buffers(2, 1, None);
    tracker.clear_dirty_for_encoder(DirtyState::all());
    tracker.mark_states_with_resource_dirty(&buf);
    assert_eq!(tracker.dirty(), DirtyState::empty());
}

#[test]
fn index_buffer_matches_the_persistent_binding() {
    let mut tracker = clean_tracker();
    let buf = Resource::new_buffer(1024);
    tracker.set_index_buffer(Some(IndexBufferInput::Buffer {
        buffer: buf.clone(),
        offset: 0,
        index_size: 2,
    }));
    tracker.clear_dirty_for_encoder(DirtyState::all());

    tracker.mark_states_with_resource_dirty(&buf);
    assert_eq!(tracker.dirty(), DirtyState::INDEX_BUFFER);
}

#[test]
fn stream_output_targets_match_by_buffer() {
    let mut tracker = clean_tracker();
    let buf = Resource::new_buffer(4096);
    let target = SoTarget::new(buf.clone(), 0, 4096);
    tracker.set_stream_output_targets(Some(std::slice::from_ref(&target)), 0);
    tracker.clear_dirty_for_encoder(DirtyState::all());

    tracker.mark_states_with_resource_dirty(&buf);
    assert_eq!(tracker.dirty(), DirtyState::STREAM_OUTPUT_TARGETS);
}

#[test]
fn sampler_views_match_on_the_underlying_resource() {
    let mut tracker = clean_tracker();
    let tex = texture();
    let view = SamplerView::for_texture(tex.clone(), Format::B8G8R8A8Unorm, 0, 0, 0, 0);
    tracker.set_fragment_sampler_views(Some(std::slice::from_ref(&view)));
    tracker.clear_dirty_for_encoder(DirtyState::all());

    tracker.mark_states_with_resource_dirty(&tex);
    assert_eq!(tracker.dirty(), DirtyState::FRAGMENT_SAMPLER_VIEWS);
}

#[test]
fn each_stage_reports_its_own_view_bit() {
    let mut tracker = clean_tracker();
    let tex = texture();
    let view = SamplerView::for_texture(tex.clone(), Format::B8G8R8A8Unorm, 0, 0, 0, 0);

    tracker.set_vertex_sampler_views(Some(std::slice::from_ref(&view)));
    tracker.set_compute_sampler_views(0, 1, Some(std::slice::from_ref(&view)));
    tracker.clear_dirty_for_encoder(DirtyState::all());

    tracker.mark_states_with_resource_dirty(&tex);
    assert_eq!(
        tracker.dirty(),
        DirtyState::VERTEX_SAMPLER_VIEWS | DirtyState::COMPUTE_SAMPLER_VIEWS
    );
}

#[test]
fn constant_buffer_resources_are_scanned_per_stage() {
    let mut tracker = clean_tracker();
    let buf = Resource::new_buffer(256);
    tracker.set_constant_buffer(
        ShaderStage::Geometry,
        1,
        Some(ConstantBufferInput::Buffer {
            buffer: buf.clone(),
            offset: 0,
            size: 256,
        }),
    );
    tracker.clear_dirty_for_encoder(DirtyState::all());

    tracker.mark_states_with_resource_dirty(&buf);
    assert_eq!(tracker.dirty(), DirtyState::CONSTANT_BUFFER);
}

#[test]
fn framebuffer_attachments_match_textures_only() {
    let mut tracker = clean_tracker();
    let color_tex = texture();
    let depth_tex = Resource::new_texture2d(Format::D24UnormS8Uint, 64, 64, 1, 1);
    let color = Surface::new(color_tex.clone(), Format::B8G8R8A8Unorm, 0, 0, 0);
    let depth = Surface::new(depth_tex.clone(), Format::D24UnormS8Uint, 0, 0, 0);

    tracker.set_framebuffer(&[color], Some(&depth));
    tracker.clear_dirty_for_encoder(DirtyState::all());

    tracker.mark_states_with_resource_dirty(&color_tex);
    assert_eq!(tracker.dirty(), DirtyState::FRAMEBUFFER);

    tracker.clear_dirty_for_encoder(DirtyState::all());
    tracker.mark_states_with_resource_dirty(&depth_tex);
    assert_eq!(tracker.dirty(), DirtyState::FRAMEBUFFER);
}

#[test]
fn shader_resources_match_by_surface_resource() {
    let mut tracker = clean_tracker();
    let tex = texture();
    let surface = Surface::new(tex.clone(), Format::B8G8R8A8Unorm, 0, 0, 0);
    tracker.set_shader_resources(0, 1, Some(std::slice::from_ref(&surface)));
    tracker.clear_dirty_for_encoder(DirtyState::all());

    tracker.mark_states_with_resource_dirty(&tex);
    assert_eq!(tracker.dirty(), DirtyState::SHADER_RESOURCES);
}

#[test]
fn compute_resource_slots_survive_the_scan() {
    let mut tracker = clean_tracker();
    let tex = texture();
    let surface = Surface::new(tex.clone(), Format::B8G8R8A8Unorm, 0, 0, 0);
    tracker.set_compute_resources(1, 1, Some(std::slice::from_ref(&surface)));
    tracker.clear_dirty_for_encoder(DirtyState::all());

    tracker.mark_states_with_resource_dirty(&tex);

    // The scan compares the slot; it must not release the binding.
    assert_eq!(tracker.dirty(), DirtyState::COMPUTE_RESOURCES);
    assert!(tracker.compute_resources().get(1).is_some());
    assert_eq!(tracker.compute_resources().count(), 2);
}

#[test]
fn global_bindings_match_by_direct_identity() {
    let mut tracker = clean_tracker();
    let buf = Resource::new_buffer(128);
    tracker.set_global_bindings(0, 1, Some(std::slice::from_ref(&buf)));
    tracker.clear_dirty_for_encoder(DirtyState::all());

    tracker.mark_states_with_resource_dirty(&buf);
    assert_eq!(tracker.dirty(), DirtyState::GLOBAL_BINDING);
}

#[test]
fn one_resource_can_mark_many_categories() {
    let mut tracker = clean_tracker();
    let buf = Resource::new_buffer(1024);

    tracker.set_vertex_buffers(
        0,
        1,
        Some(&[Some(VertexBuffer {
            buffer: buf.clone(),
            offset: 0,
            stride: 4,
        })]),
    );
    tracker.set_index_buffer(Some(IndexBufferInput::Buffer {
        buffer: buf.clone(),
        offset: 0,
        index_size: 4,
    }));
    tracker.set_constant_buffer(
        ShaderStage::Vertex,
        0,
        Some(ConstantBufferInput::Buffer {
            buffer: buf.clone(),
            offset: 0,
            size: 1024,
        }),
    );
    tracker.clear_dirty_for_encoder(DirtyState::all());

    tracker.mark_states_with_resource_dirty(&buf);
    assert_eq!(
        tracker.dirty(),
        DirtyState::VERTEX_BUFFERS | DirtyState::INDEX_BUFFER | DirtyState::CONSTANT_BUFFER
    );
}

#[test]
fn matching_many_slots_raises_the_bit_once() {
    let mut tracker = clean_tracker();
    let buf = Resource::new_buffer(1024);
    let vb = VertexBuffer {
        buffer: buf.clone(),
        offset: 0,
        stride: 4,
    };

    tracker.set_vertex_buffers(0, 3, Some(&[Some(vb.clone()), Some(vb.clone()), Some(vb)]));
    tracker.clear_dirty_for_encoder(DirtyState::all());

    tracker.mark_states_with_resource_dirty(&buf);
    assert_eq!(tracker.dirty(), DirtyState::VERTEX_BUFFERS);
}

#[test]
fn samplers_do_not_participate_in_resource_tracking() {
    let mut tracker = clean_tracker();
    let sampler = Sampler::new(SamplerDesc::default());
    tracker.bind_fragment_samplers(Some(std::slice::from_ref(&sampler)));
    tracker.clear_dirty_for_encoder(DirtyState::all());

    // Samplers reference no resource; an invalidation never touches them.
    tracker.mark_states_with_resource_dirty(&Resource::new_buffer(64));
    assert_eq!(tracker.dirty(), DirtyState::empty());
}
