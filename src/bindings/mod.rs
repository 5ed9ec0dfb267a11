pub mod bvh;

/// Something that can describe its own bind group.
pub trait Bindable {
    fn get_layout_entries(&self) -> Vec<wgpu::BindGroupLayoutEntry>;
    fn get_bind_group_entries(&self) -> Vec<wgpu::BindGroupEntry>;
}

pub fn create_bind_group_layout(
    device: &wgpu::Device,
    entries: &[wgpu::BindGroupLayoutEntry],
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries,
        label: None,
    })
}

pub fn create_bind_group(
    device: &wgpu::Device,
    entries: &[wgpu::BindGroupEntry],
    layout: &wgpu::BindGroupLayout,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries,
        label: None,
    })
}
