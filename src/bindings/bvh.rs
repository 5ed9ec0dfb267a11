use wgpu::util::DeviceExt;

use crate::bvh::Bvh;

use super::Bindable;

/// Storage-buffer view of a built hierarchy for device-side traversal.
///
/// Two read-only storage buffers: the compact node records, and the
/// Morton-ordered leaf indices for consumers that walk leaves by sorted
/// position instead of decoding the record's link field.
pub struct BvhGpu {
    pub node_buffer: wgpu::Buffer,
    pub leaf_order_buffer: wgpu::Buffer,
    node_count: u32,
}

impl Bindable for BvhGpu {
    fn get_layout_entries(&self) -> Vec<wgpu::BindGroupLayoutEntry> {
        vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ]
    }

    fn get_bind_group_entries(&self) -> Vec<wgpu::BindGroupEntry> {
        vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: self.node_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: self.leaf_order_buffer.as_entire_binding(),
            },
        ]
    }
}

impl BvhGpu {
    pub fn new(device: &wgpu::Device, bvh: &Bvh) -> Self {
        let node_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("BVH node buffer"),
            contents: bytemuck::cast_slice(bvh.nodes()),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::STORAGE,
        });

        let leaf_order_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("BVH leaf order buffer"),
            contents: bytemuck::cast_slice(bvh.leaf_order()),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::STORAGE,
        });

        BvhGpu {
            node_buffer,
            leaf_order_buffer,
            node_count: bvh.node_count() as u32,
        }
    }

    /// Push refitted records into the existing node buffer. The node count
    /// cannot change without a rebuild, so the buffer is reused.
    pub fn update(&self, queue: &wgpu::Queue, bvh: &Bvh) {
        assert_eq!(
            bvh.node_count() as u32,
            self.node_count,
            "node count changed; recreate the buffers with BvhGpu::new"
        );
        queue.write_buffer(&self.node_buffer, 0, bytemuck::cast_slice(bvh.nodes()));
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    /// WGSL definition of the node record for consuming shaders. A negative
    /// `link` marks a leaf (`-link - 1` is the original leaf id); `escape`
    /// is the stackless-traversal skip target, -1 at the end of the walk.
    pub fn wgsl_struct_def() -> &'static str {
        "struct BvhNode {
    lower: vec3f,
    link: i32,
    upper: vec3f,
    escape: i32,
};"
    }
}
