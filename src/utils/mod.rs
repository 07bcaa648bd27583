pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use image_ops::{crop_rgb, encode_png_async, load_image_async, mean_luminance, to_rgb};
pub use metrics::{Metrics, MetricsSnapshot, Stage};
