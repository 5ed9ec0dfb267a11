use anyhow::Context;
use wgpu::{Adapter, AdapterInfo, Device, Instance, Queue};

// A convenience wrapper for interfacing with the GPU.
pub struct GpuHandles {
    pub queue: Queue,
    pub adapter: Adapter,
    pub instance: Instance,
    pub device: Device,
}

impl GpuHandles {
    /// Acquire an adapter and a logical device. Fails on hosts without a
    /// usable GPU; callers that can run without one should treat the error
    /// as "stay on the host side".
    pub fn new() -> anyhow::Result<Self> {
        let instance: Instance = get_instance();

        // You might want to change this to prefer a certain backend or a high power GPU.
        let adapter: Adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: false,
                ..Default::default()
            }))
            .context("Failed to find an appropriate adapter")?;

        let (device, queue): (Device, Queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                features: wgpu::Features::empty(),
                limits: wgpu::Limits::default(),
                label: None,
            },
            None,
        ))
        .context("Failed to create device")?;

        Ok(GpuHandles {
            queue,
            adapter,
            instance,
            device,
        })
    }
}

pub fn get_instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        dx12_shader_compiler: Default::default(),
    })
}

// Checks whether the system has a findable adapter (GPU).
// Returns false if no adapter is found.
pub fn self_test() -> bool {
    eprintln!("Performing self test to check system for compatibility.");
    let instance: Instance = get_instance();

    // `request_adapter` instantiates the general connection to the GPU
    let adapter_option: Option<Adapter> =
        pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()));

    // Handle whether we find a GPU or not.
    match adapter_option {
        Some(adapter) => {
            let info: AdapterInfo = adapter.get_info();
            println!("Found GPU: {:?}", info);
            true
        }
        None => {
            println!("Failed to find a usable GPU. Hierarchies stay host-side.");
            false
        }
    }
}
