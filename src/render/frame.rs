use anyhow::{Context, Result};

use super::gpu::GpuContext;
use super::pipeline::{ScenePipeline, SceneUniforms, SAMPLE_COUNT, TEXTURE_FORMAT};
use super::scene::{Scene, Vertex};
use super::surface::Surface;

/// Turns a frame's scene into pixels.
pub trait Rasterizer {
    fn name(&self) -> &'static str;

    /// Draw `scene` into `surface`. Both must have the same size.
    fn rasterize(&mut self, scene: &Scene, surface: &mut Surface) -> Result<()>;
}

/// Offscreen multisampled target plus the buffer it is copied back through.
pub struct FrameRenderer {
    pub render_texture: wgpu::Texture,
    pub render_texture_view: wgpu::TextureView,
    pub msaa_view: wgpu::TextureView,
    pub output_buffer: wgpu::Buffer,
    pub width: u32,
    pub height: u32,
    pub padded_bytes_per_row: u32,
    pub unpadded_bytes_per_row: u32,
}

impl FrameRenderer {
    pub fn new(gpu: &GpuContext, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let render_texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("render_target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let render_texture_view = render_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let msaa_texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("msaa_target"),
            size,
            mip_level_count: 1,
            sample_count: SAMPLE_COUNT,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let msaa_view = msaa_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let unpadded_bytes_per_row = width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let output_buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("output_buffer"),
            size: (padded_bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            render_texture,
            render_texture_view,
            msaa_view,
            output_buffer,
            width,
            height,
            padded_bytes_per_row,
            unpadded_bytes_per_row,
        }
    }

    /// Draw `vertex_count` vertices over `clear` and copy the resolved frame
    /// into `surface`.
    pub fn render_and_readback(
        &self,
        gpu: &GpuContext,
        pipeline: &ScenePipeline,
        vertices: &wgpu::Buffer,
        vertex_count: u32,
        clear: wgpu::Color,
        surface: &mut Surface,
    ) -> Result<()> {
        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.msaa_view,
                    resolve_target: Some(&self.render_texture_view),
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Discard,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if vertex_count > 0 {
                render_pass.set_pipeline(&pipeline.pipeline);
                render_pass.set_bind_group(0, &pipeline.bind_group, &[]);
                render_pass.set_vertex_buffer(0, vertices.slice(..));
                render_pass.draw(0..vertex_count, 0..1);
            }
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.render_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );

        gpu.queue.submit(std::iter::once(encoder.finish()));

        // Read back
        let buffer_slice = self.output_buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        receiver.recv()??;

        let data = buffer_slice.get_mapped_range();

        // Strip row padding
        let row = self.unpadded_bytes_per_row as usize;
        for (dst, src) in surface
            .pixels_mut()
            .chunks_exact_mut(row)
            .zip(data.chunks(self.padded_bytes_per_row as usize))
        {
            dst.copy_from_slice(&src[..row]);
        }

        drop(data);
        self.output_buffer.unmap();

        Ok(())
    }
}

/// Headless wgpu rasterizer. Targets and buffers follow the scene's size.
pub struct GpuRasterizer {
    gpu: GpuContext,
    pipeline: ScenePipeline,
    frame: Option<FrameRenderer>,
    vertex_buffer: wgpu::Buffer,
}

impl GpuRasterizer {
    pub fn new(gpu: GpuContext) -> Self {
        let pipeline = ScenePipeline::new(&gpu.device);
        let vertex_buffer = create_vertex_buffer(&gpu, 4096 * std::mem::size_of::<Vertex>() as u64);
        Self {
            gpu,
            pipeline,
            frame: None,
            vertex_buffer,
        }
    }

    fn upload(&mut self, vertices: &[Vertex]) {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        if bytes.is_empty() {
            return;
        }
        if bytes.len() as u64 > self.vertex_buffer.size() {
            let size = (bytes.len() as u64).next_power_of_two();
            log::debug!("Growing vertex buffer to {} bytes", size);
            self.vertex_buffer = create_vertex_buffer(&self.gpu, size);
        }
        self.gpu.queue.write_buffer(&self.vertex_buffer, 0, bytes);
    }
}

impl Rasterizer for GpuRasterizer {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn rasterize(&mut self, scene: &Scene, surface: &mut Surface) -> Result<()> {
        let (width, height) = (scene.width(), scene.height());
        if (surface.width(), surface.height()) != (width, height) {
            anyhow::bail!(
                "Scene is {}x{} but the surface is {}x{}",
                width,
                height,
                surface.width(),
                surface.height()
            );
        }

        let stale = self
            .frame
            .as_ref()
            .map_or(true, |f| (f.width, f.height) != (width, height));
        if stale {
            log::debug!("Allocating {}x{} render target", width, height);
            self.frame = Some(FrameRenderer::new(&self.gpu, width, height));
        }

        self.upload(scene.vertices());
        self.gpu.queue.write_buffer(
            &self.pipeline.uniform_buffer,
            0,
            bytemuck::cast_slice(&[SceneUniforms::new(width, height)]),
        );

        let [r, g, b, a] = scene.clear_color().to_array();
        let clear = wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        };
        let vertex_count =
            u32::try_from(scene.vertices().len()).context("Scene has too many vertices")?;
        let frame = self.frame.as_ref().context("Render target missing")?;
        frame.render_and_readback(
            &self.gpu,
            &self.pipeline,
            &self.vertex_buffer,
            vertex_count,
            clear,
            surface,
        )
    }
}

fn create_vertex_buffer(gpu: &GpuContext, size: u64) -> wgpu::Buffer {
    gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("scene_vertices"),
        size,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::render::color::Rgba;

    /// Paints only the clear colour; for tests that exercise frame flow
    /// rather than pixels.
    pub(crate) struct FlatRasterizer;

    impl Rasterizer for FlatRasterizer {
        fn name(&self) -> &'static str {
            "flat"
        }

        fn rasterize(&mut self, scene: &Scene, surface: &mut Surface) -> Result<()> {
            anyhow::ensure!(
                (surface.width(), surface.height()) == (scene.width(), scene.height()),
                "size mismatch"
            );
            let c = scene.clear_color();
            let px = [c.r, c.g, c.b, (c.a * 255.0).round() as u8];
            for p in surface.pixels_mut().chunks_exact_mut(4) {
                p.copy_from_slice(&px);
            }
            Ok(())
        }
    }

    /// `None` on machines without any usable adapter.
    fn gpu_rasterizer() -> Option<GpuRasterizer> {
        match GpuContext::new() {
            Ok(gpu) => Some(GpuRasterizer::new(gpu)),
            Err(err) => {
                eprintln!("skipping GPU test: {:#}", err);
                None
            }
        }
    }

    fn close(a: [u8; 4], b: [u8; 4]) -> bool {
        a.iter().zip(b).all(|(&x, y)| x.abs_diff(y) <= 2)
    }

    #[test]
    fn clear_and_rect_reach_the_surface() {
        let Some(mut raster) = gpu_rasterizer() else {
            return;
        };
        // 33 columns forces a padded readback row.
        let mut scene = Scene::new(33, 20);
        let mut surface = Surface::new(33, 20).unwrap();
        scene.clear(Rgba::opaque(0, 0, 0));
        scene.fill_rect(10.0, 5.0, 10.0, 10.0, Rgba::opaque(70, 24, 255));
        raster.rasterize(&scene, &mut surface).unwrap();

        assert_eq!(surface.pixel(15, 10), Some([70, 24, 255, 255]));
        assert_eq!(surface.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(surface.pixel(32, 19), Some([0, 0, 0, 255]));
    }

    #[test]
    fn translucent_shapes_blend_over_the_background() {
        let Some(mut raster) = gpu_rasterizer() else {
            return;
        };
        let mut scene = Scene::new(16, 16);
        let mut surface = Surface::new(16, 16).unwrap();
        scene.clear(Rgba::opaque(0, 0, 0));
        scene.fill_rect(0.0, 0.0, 16.0, 16.0, Rgba::new(200, 100, 0, 0.5));
        raster.rasterize(&scene, &mut surface).unwrap();

        let px = surface.pixel(8, 8).unwrap();
        assert!(close(px, [100, 50, 0, 255]), "{px:?}");
    }

    #[test]
    fn target_follows_scene_size() {
        let Some(mut raster) = gpu_rasterizer() else {
            return;
        };
        let mut scene = Scene::new(8, 8);
        let mut surface = Surface::new(8, 8).unwrap();
        scene.clear(Rgba::opaque(255, 0, 0));
        raster.rasterize(&scene, &mut surface).unwrap();

        scene.begin(40, 12);
        scene.clear(Rgba::opaque(0, 0, 255));
        surface.resize(40, 12).unwrap();
        raster.rasterize(&scene, &mut surface).unwrap();
        assert!(surface.pixels().chunks(4).all(|p| p == [0, 0, 255, 255]));

        surface.resize(8, 8).unwrap();
        assert!(raster.rasterize(&scene, &mut surface).is_err());
    }

    #[test]
    fn large_scenes_grow_the_vertex_buffer() {
        let Some(mut raster) = gpu_rasterizer() else {
            return;
        };
        let mut scene = Scene::new(64, 64);
        let mut surface = Surface::new(64, 64).unwrap();
        scene.clear(Rgba::opaque(0, 0, 0));
        for _ in 0..2000 {
            scene.fill_rect(0.0, 0.0, 1.0, 1.0, Rgba::new(0, 0, 0, 0.1));
        }
        scene.fill_rect(32.0, 32.0, 8.0, 8.0, Rgba::opaque(0, 255, 0));
        raster.rasterize(&scene, &mut surface).unwrap();
        assert_eq!(surface.pixel(36, 36), Some([0, 255, 0, 255]));
    }
}
