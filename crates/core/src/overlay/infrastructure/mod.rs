pub mod mesh_overlay_renderer;
