pub mod ffmpeg_camera;
pub mod jpeg_data_url_encoder;
